//! Convenient re-exports for common keygate types.
pub use crate::{
    adaptive::DynamicLimits,
    admission::AdmissionControl,
    bucket::{Decision, DenyReason},
    config::{Limits, SweepConfig},
    error::AdmissionError,
    identity::{KeyExtractor, PathKey},
    layer::AdmissionLayer,
    rate::Rate,
    registry::{BucketRegistry, InMemoryBucketRegistry},
    sweeper::{Sweeper, SweeperHandle},
    telemetry::{OutcomeCounters, TelemetrySink},
};
