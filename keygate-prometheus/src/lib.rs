//! Prometheus metrics sink for `keygate`.
//! Bring your own `prometheus::Registry`; metrics are registered and updated
//! from admission events.
//!
//! | metric | type | labels |
//! |---|---|---|
//! | `keygate_decisions_total` | counter | `profile`, `outcome` (`admitted`/`denied`) |
//! | `keygate_evictions_total` | counter | |
//! | `keygate_tracked_identities` | gauge | |

use keygate::telemetry::{AdmissionEvent, TelemetrySink};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Registry};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    decisions: IntCounterVec,
    evictions: IntCounter,
    tracked: IntGauge,
}

impl PrometheusSink {
    /// Create a sink and register its metrics into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let decisions = IntCounterVec::new(
            prometheus::Opts::new("keygate_decisions_total", "Admission decisions"),
            &["profile", "outcome"],
        )?;
        let evictions =
            IntCounter::new("keygate_evictions_total", "Identities evicted by the sweeper")?;
        let tracked = IntGauge::new(
            "keygate_tracked_identities",
            "Identities tracked after the latest sweep",
        )?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(tracked.clone()))?;
        tracing::debug!(target: "keygate::prometheus", "registered keygate metrics");
        Ok(Self { registry, decisions, evictions, tracked })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl tower_service::Service<AdmissionEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        match &event {
            AdmissionEvent::Admitted { profile, .. } => {
                self.decisions.with_label_values(&[profile.as_str(), "admitted"]).inc();
            }
            AdmissionEvent::Denied { profile, .. } => {
                self.decisions.with_label_values(&[profile.as_str(), "denied"]).inc();
            }
            AdmissionEvent::Swept { evicted, remaining } => {
                self.evictions.inc_by(*evicted as u64);
                self.tracked.set(i64::try_from(*remaining).unwrap_or(i64::MAX));
            }
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}
