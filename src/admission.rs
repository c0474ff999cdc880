//! Admission façade: one call per request.
//!
//! `AdmissionControl` ties a [`BucketRegistry`] to a telemetry sink. Each
//! check gets or creates the identity's bucket, refreshes its last-seen time,
//! makes the decision, and reports it. Telemetry is best-effort and never
//! changes the decision.
//!
//! ```rust
//! use keygate::{AdmissionControl, InMemoryBucketRegistry, Limits};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let control = AdmissionControl::new(Arc::new(InMemoryBucketRegistry::new()));
//! let limits = Limits::per_minute(5.0, 5.0).unwrap();
//! for _ in 0..5 {
//!     assert!(control.allow("/user/1/data", &limits).await);
//! }
//! assert!(!control.allow("/user/1/data", &limits).await);
//! # }
//! ```

use crate::bucket::Decision;
use crate::config::Limits;
use crate::registry::BucketRegistry;
use crate::telemetry::{emit_best_effort, AdmissionEvent, NullSink};
use std::sync::Arc;

/// Per-identity admission decisions with telemetry.
#[derive(Debug, Clone)]
pub struct AdmissionControl<S = NullSink> {
    registry: Arc<dyn BucketRegistry>,
    sink: S,
}

impl AdmissionControl<NullSink> {
    /// Façade over `registry` that discards telemetry.
    pub fn new(registry: Arc<dyn BucketRegistry>) -> Self {
        Self { registry, sink: NullSink }
    }
}

impl<S> AdmissionControl<S> {
    /// Replace the telemetry sink.
    pub fn with_sink<T>(self, sink: T) -> AdmissionControl<T> {
        AdmissionControl { registry: self.registry, sink }
    }

    /// The registry decisions are made against.
    pub fn registry(&self) -> &Arc<dyn BucketRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S> AdmissionControl<S>
where
    S: tower::Service<AdmissionEvent, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    /// Decide whether `identity` may proceed. `limits` only matter the first
    /// time an identity is seen; afterwards its bucket keeps its own
    /// configuration.
    pub async fn check(&self, identity: &str, limits: &Limits) -> Decision {
        let decision = self.registry.check(identity, limits);
        let event = match &decision {
            Decision::Allowed { remaining } => AdmissionEvent::admitted(identity, *remaining),
            Decision::Denied { retry_after, reason } => {
                tracing::debug!(
                    target: "keygate::admission",
                    identity,
                    reason = %reason,
                    retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                    "request denied"
                );
                AdmissionEvent::denied(identity, *retry_after, *reason)
            }
        };
        emit_best_effort(self.sink.clone(), event).await;
        decision
    }

    /// Boolean form of [`check`](Self::check).
    pub async fn allow(&self, identity: &str, limits: &Limits) -> bool {
        self.check(identity, limits).await.is_allowed()
    }
}
