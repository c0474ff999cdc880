#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # keygate
//!
//! Per-identity admission control for async Rust: every identity gets its own
//! token bucket, created on first sight and reclaimed once idle.
//!
//! ## Features
//!
//! - **Token buckets** with lazy accrual, saturating burst, and unlimited or
//!   zero-refill rates
//! - **Bucket registry** with get-or-create, last-seen tracking and live
//!   reconfiguration that keeps accrued credit
//! - **Idle sweeper** running as a cancellable tokio task
//! - **Tower middleware** keyed by path, route pattern or any closure
//! - **Telemetry sinks** as `tower::Service`s, including per-profile counters
//! - **Control plane** (feature `control`) for reconfiguration and inspection
//!
//! ## Quick Start
//!
//! ```rust
//! use keygate::{
//!     AdmissionControl, AdmissionLayer, DynamicLimits, InMemoryBucketRegistry, Limits, PathKey,
//!     SweepConfig, Sweeper,
//! };
//! use std::sync::Arc;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(InMemoryBucketRegistry::new());
//!     let sweeper = Sweeper::new(registry.clone(), SweepConfig::default()).spawn();
//!
//!     let user_limits = DynamicLimits::new(Limits::per_minute(5.0, 5.0).unwrap());
//!     let layer = AdmissionLayer::new(AdmissionControl::new(registry), PathKey, user_limits);
//!     let svc = layer.layer(service_fn(|path: String| async move {
//!         Ok::<_, std::convert::Infallible>(path)
//!     }));
//!
//!     for _ in 0..5 {
//!         assert!(svc.clone().oneshot("/user/1/data".to_string()).await.is_ok());
//!     }
//!     let err = svc.oneshot("/user/1/data".to_string()).await.unwrap_err();
//!     assert!(err.is_rejected());
//!
//!     sweeper.shutdown().await.unwrap();
//! }
//! ```

pub mod adaptive;
pub mod admission;
pub mod bucket;
pub mod clock;
pub mod config;
#[cfg(feature = "control")]
pub mod control;
pub mod error;
pub mod identity;
pub mod layer;
pub mod prelude;
pub mod rate;
pub mod registry;
pub mod sweeper;
pub mod telemetry;

// Re-exports
pub use adaptive::{DynamicConfig, DynamicLimits};
pub use admission::AdmissionControl;
pub use bucket::{BucketSnapshot, Decision, DenyReason, TokenBucket};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, Limits, SweepConfig};
pub use error::AdmissionError;
pub use identity::{profiling_key, route_param, KeyExtractor, PathKey, PatternKey, RequestPath};
pub use layer::{AdmissionLayer, AdmissionService};
pub use rate::{ParseRateError, Rate};
pub use registry::{BucketRegistry, DefaultBucketRegistry, InMemoryBucketRegistry, LimitsUpdate};
pub use sweeper::{Sweeper, SweeperError, SweeperHandle};
pub use telemetry::{
    AdmissionEvent, LogSink, MemorySink, MulticastSink, NullSink, OutcomeCounters, TelemetrySink,
};
