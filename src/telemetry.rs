//! Telemetry for admission decisions.
//!
//! Every decision made by [`AdmissionControl`](crate::admission::AdmissionControl)
//! is reported as an [`AdmissionEvent`] to a `TelemetrySink`. Sinks are
//! `tower::Service<AdmissionEvent>` so they compose with ordinary tower
//! combinators; the built-in ones live in [`sinks`].
//!
//! ```rust
//! use keygate::telemetry::{AdmissionEvent, MemorySink};
//! use tower::Service;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = MemorySink::new();
//! let event = AdmissionEvent::admitted("/user/1/data", 4.0);
//! sink.call(event.clone()).await.unwrap();
//! assert_eq!(sink.events(), vec![event]);
//! # }
//! ```

pub mod sinks;

pub use sinks::{
    ComposedSinkError, LogSink, MemorySink, MulticastSink, NullSink, OutcomeCounters,
    ProfileOutcomes,
};

use crate::bucket::DenyReason;
use crate::identity::profiling_key;
use std::fmt;
use std::time::Duration;

/// A telemetry sink that consumes admission events.
pub trait TelemetrySink:
    tower::Service<AdmissionEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// If a sink is not ready or returns an error, the event is dropped; the
/// admission decision has already been made.
pub async fn emit_best_effort<S>(sink: S, event: AdmissionEvent)
where
    S: tower::Service<AdmissionEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Events emitted by the admission path and the idle sweeper.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionEvent {
    /// A request was admitted.
    Admitted {
        /// Identity the decision was made for.
        identity: String,
        /// Coarse metrics key derived from the identity.
        profile: String,
        /// Tokens left in the identity's bucket.
        remaining: f64,
    },
    /// A request was rejected as over capacity.
    Denied {
        /// Identity the decision was made for.
        identity: String,
        /// Coarse metrics key derived from the identity.
        profile: String,
        /// When a token will next be available, if ever.
        retry_after: Option<Duration>,
        /// Why the bucket refused.
        reason: DenyReason,
    },
    /// The sweeper finished a pass.
    Swept {
        /// Identities evicted in this pass.
        evicted: usize,
        /// Identities still tracked.
        remaining: usize,
    },
}

impl AdmissionEvent {
    /// Admission event with the profile derived from `identity`.
    pub fn admitted(identity: impl Into<String>, remaining: f64) -> Self {
        let identity = identity.into();
        let profile = profiling_key(&identity).to_string();
        AdmissionEvent::Admitted { identity, profile, remaining }
    }

    /// Denial event with the profile derived from `identity`.
    pub fn denied(
        identity: impl Into<String>,
        retry_after: Option<Duration>,
        reason: DenyReason,
    ) -> Self {
        let identity = identity.into();
        let profile = profiling_key(&identity).to_string();
        AdmissionEvent::Denied { identity, profile, retry_after, reason }
    }

    /// Profile key for decision events.
    pub fn profile(&self) -> Option<&str> {
        match self {
            AdmissionEvent::Admitted { profile, .. } | AdmissionEvent::Denied { profile, .. } => {
                Some(profile)
            }
            AdmissionEvent::Swept { .. } => None,
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Admitted { identity, remaining, .. } => {
                write!(f, "Admitted({identity}, remaining={remaining:.2})")
            }
            AdmissionEvent::Denied { identity, retry_after: Some(wait), reason, .. } => {
                write!(f, "Denied({identity}, {reason}, retry_after={wait:?})")
            }
            AdmissionEvent::Denied { identity, retry_after: None, reason, .. } => {
                write!(f, "Denied({identity}, {reason})")
            }
            AdmissionEvent::Swept { evicted, remaining } => {
                write!(f, "Swept(evicted={evicted}, remaining={remaining})")
            }
        }
    }
}
