//! Background reclamation of idle identities.
//!
//! The sweeper wakes every [`SweepConfig::interval`] and evicts identities
//! whose last check is older than [`SweepConfig::idle_timeout`]. The first
//! pass runs one interval after [`Sweeper::spawn`]. A later request from an
//! evicted identity starts over with a full bucket.
//!
//! ```rust
//! use keygate::{InMemoryBucketRegistry, SweepConfig, Sweeper};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Arc::new(InMemoryBucketRegistry::new());
//! let handle = Sweeper::new(registry, SweepConfig::default()).spawn();
//! // ... serve traffic ...
//! handle.shutdown().await.unwrap();
//! # }
//! ```

use crate::config::SweepConfig;
use crate::registry::BucketRegistry;
use crate::telemetry::{emit_best_effort, AdmissionEvent, NullSink};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Errors from stopping the sweeper.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    /// The sweeper task panicked or was aborted.
    #[error("sweeper task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Periodic idle-identity eviction over a shared registry.
#[derive(Debug, Clone)]
pub struct Sweeper<S = NullSink> {
    registry: Arc<dyn BucketRegistry>,
    config: SweepConfig,
    sink: S,
}

impl Sweeper<NullSink> {
    pub fn new(registry: Arc<dyn BucketRegistry>, config: SweepConfig) -> Self {
        Self { registry, config, sink: NullSink }
    }
}

impl<S> Sweeper<S> {
    /// Report each pass as [`AdmissionEvent::Swept`].
    pub fn with_sink<T>(self, sink: T) -> Sweeper<T> {
        Sweeper { registry: self.registry, config: self.config, sink }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one pass now. Returns the number of identities evicted.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.sweep(self.config.idle_timeout());
        tracing::debug!(
            target: "keygate::sweeper",
            evicted,
            remaining = self.registry.len(),
            "swept idle identities"
        );
        evicted
    }
}

impl<S> Sweeper<S>
where
    S: tower::Service<AdmissionEvent, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    /// Start the loop on the current tokio runtime.
    ///
    /// The loop stops when [`SweeperHandle::shutdown`] is called or the handle
    /// is dropped; a pass already in progress finishes first.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.config.interval();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let evicted = self.sweep_once();
                        let remaining = self.registry.len();
                        emit_best_effort(self.sink.clone(), AdmissionEvent::Swept { evicted, remaining })
                            .await;
                    }
                }
            }
            tracing::debug!(target: "keygate::sweeper", "sweeper stopped");
        });

        SweeperHandle { stop: Some(stop_tx), task }
    }
}

/// Handle to a running sweeper. Dropping it stops the loop without waiting.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), SweeperError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await?;
        Ok(())
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
