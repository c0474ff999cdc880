use super::command::{CommandLabel, LimitCommand};
use super::handler::CommandHandler;
use super::types::*;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Audit sink interface.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    async fn record(&self, record: AuditRecord) -> Result<(), CommandError>;
}

/// Simple audit sink that logs via tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), CommandError> {
        info!(target: "keygate::audit", id=%record.id, label=%record.label, principal=%record.principal, status=%record.status, "audit");
        Ok(())
    }
}

/// In-memory audit sink (tests/diagnostics).
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    /// Create a new in-memory audit sink.
    pub fn new() -> Self {
        Self::default()
    }
    /// Retrieve recorded audit records.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), CommandError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Command history interface (pluggable storage).
#[async_trait]
pub trait CommandHistory: Send + Sync {
    /// Append a command execution record.
    async fn append(&self, record: HistoryRecord);
    /// List recent command history, oldest first.
    async fn list(&self) -> Vec<HistoryRecord>;
    /// Clear history.
    async fn clear(&self);
}

/// In-memory history that keeps the most recent `capacity` records.
#[derive(Clone)]
pub struct InMemoryHistory {
    entries: Arc<Mutex<VecDeque<HistoryRecord>>>,
    capacity: usize,
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::with_capacity(1_000)
    }
}

impl InMemoryHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Arc::new(Mutex::new(VecDeque::new())), capacity: capacity.max(1) }
    }
}

#[async_trait]
impl CommandHistory for InMemoryHistory {
    async fn append(&self, record: HistoryRecord) {
        let mut guard = self.entries.lock().await;
        guard.push_back(record);
        if guard.len() > self.capacity {
            guard.pop_front();
        }
    }

    async fn list(&self) -> Vec<HistoryRecord> {
        self.entries.lock().await.iter().cloned().collect()
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

/// In-process router: handler, then history, then audit.
pub struct CommandRouter {
    handler: Arc<dyn CommandHandler>,
    history: Arc<dyn CommandHistory>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl CommandRouter {
    /// Create a new command router.
    pub fn new(handler: Arc<dyn CommandHandler>, history: Arc<dyn CommandHistory>) -> Self {
        Self { handler, history, audit: None }
    }

    /// Attach an audit sink to the router.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Parse a wire command and execute it. Malformed arguments never reach
    /// the handler; they are answered with [`CommandFailure::InvalidArgs`]
    /// and still recorded.
    pub async fn execute_context(&self, ctx: CommandContext) -> Result<CommandResult, CommandError> {
        let principal = ctx.identity.clone();
        let meta = CommandMeta::stamped(ctx.id.clone());
        match LimitCommand::parse(&ctx.label, &ctx.args) {
            Ok(cmd) => self.execute(CommandEnvelope { cmd, principal, meta }).await,
            Err(failure) => {
                let res = CommandResult::Error(failure);
                self.record(&meta, &ctx.label, principal.as_deref(), &res).await?;
                Ok(res)
            }
        }
    }

    /// Execute a parsed command. The meta is stamped with the current time if
    /// the caller left it unset.
    pub async fn execute(&self, mut env: CommandEnvelope) -> Result<CommandResult, CommandError> {
        env.meta.stamp();
        let label = env.cmd.label().to_string();
        let meta = env.meta.clone();
        let principal = env.principal.clone();

        let res = self.handler.handle(env).await?;
        self.record(&meta, &label, principal.as_deref(), &res).await?;
        Ok(res)
    }

    async fn record(
        &self,
        meta: &CommandMeta,
        label: &str,
        principal: Option<&str>,
        res: &CommandResult,
    ) -> Result<(), CommandError> {
        self.history
            .append(HistoryRecord { meta: meta.clone(), label: label.to_string(), result: res.clone() })
            .await;

        if let Some(sink) = &self.audit {
            let status = match res {
                CommandResult::Error(e) => format!("error: {}", e),
                _ => "ok".into(),
            };
            let record = AuditRecord {
                id: meta.id.clone(),
                label: label.to_string(),
                principal: principal.unwrap_or("anonymous").to_string(),
                status,
            };
            sink.record(record).await?;
        }
        Ok(())
    }
}
