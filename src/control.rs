//! Control plane for live reconfiguration and inspection.
//!
//! Transports hand the router a [`CommandContext`] (label plus JSON
//! arguments). The router parses it into a [`LimitCommand`], rejecting
//! malformed input before anything is changed, runs it through a
//! [`CommandHandler`], then records history and audit entries.
//!
//! ```rust
//! use keygate::control::{CommandContext, CommandResult, CommandRouter, InMemoryHistory, LimitsHandler};
//! use keygate::{DynamicLimits, InMemoryBucketRegistry, Limits};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Arc::new(InMemoryBucketRegistry::new());
//! let user = DynamicLimits::new(Limits::per_minute(5.0, 5.0).unwrap());
//! let handler = LimitsHandler::new(registry).with_profile("user", user.clone());
//! let router = CommandRouter::new(Arc::new(handler), Arc::new(InMemoryHistory::default()));
//!
//! let ctx = CommandContext {
//!     id: "1".into(),
//!     label: "set_burst".into(),
//!     args: serde_json::json!({"burst": 10, "scope": "all"}),
//!     identity: None,
//! };
//! assert!(matches!(router.execute_context(ctx).await.unwrap(), CommandResult::Value(_)));
//! assert_eq!(user.get().burst(), 10.0);
//! # }
//! ```

pub mod command;
pub mod handler;
pub mod router;
pub mod types;

pub use command::{CommandLabel, LimitCommand, Scope};
pub use handler::{CommandHandler, LimitsHandler};
pub use router::{
    AuditSink, CommandHistory, CommandRouter, InMemoryHistory, MemoryAuditSink, TracingAuditSink,
};
pub use types::{
    AuditRecord, CommandContext, CommandEnvelope, CommandError, CommandFailure, CommandId,
    CommandMeta, CommandResult, HistoryRecord,
};
