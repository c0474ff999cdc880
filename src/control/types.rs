use super::command::LimitCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque command identifier.
pub type CommandId = String;

/// Execution metadata attached to each command.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandMeta {
    /// Command identifier (unique per request).
    pub id: CommandId,
    /// When the router accepted the command, in milliseconds since the epoch.
    pub timestamp_millis: Option<u128>,
}

impl CommandMeta {
    /// Meta for `id` stamped with the current time.
    pub fn stamped(id: impl Into<CommandId>) -> Self {
        let mut meta = Self { id: id.into(), timestamp_millis: None };
        meta.stamp();
        meta
    }

    /// Set `timestamp_millis` to now unless it is already set.
    pub fn stamp(&mut self) {
        if self.timestamp_millis.is_none() {
            self.timestamp_millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis());
        }
    }
}

/// A parsed command with its metadata and caller.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandEnvelope {
    /// The command payload.
    pub cmd: LimitCommand,
    /// Who issued the command, if known.
    pub principal: Option<String>,
    /// Command metadata.
    pub meta: CommandMeta,
}

impl CommandEnvelope {
    /// Envelope with a fresh meta for `id` and no principal.
    pub fn new(id: impl Into<CommandId>, cmd: LimitCommand) -> Self {
        Self { cmd, principal: None, meta: CommandMeta { id: id.into(), ..CommandMeta::default() } }
    }
}

/// Wire form of a command, before parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Command ID.
    pub id: String,
    /// Command label, e.g. `set_limits`.
    pub label: String,
    /// Arguments for the command.
    #[serde(default)]
    pub args: JsonValue,
    /// Identity of the caller (if known/extracted).
    #[serde(default)]
    pub identity: Option<String>,
}

/// Errors returned by command handling.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// A result could not be rendered.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Structured command failure payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandFailure {
    /// Caller provided invalid arguments.
    InvalidArgs { msg: String },
    /// Requested resource was not found.
    NotFound { what: String },
}

impl CommandFailure {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CommandFailure::InvalidArgs { msg: msg.into() }
    }
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandFailure::InvalidArgs { msg } => write!(f, "{msg}"),
            CommandFailure::NotFound { what } => write!(f, "{what} not found"),
        }
    }
}

/// Command result type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum CommandResult {
    /// Command acknowledged (success).
    Ack,
    /// Command returned a value (JSON for structured results).
    Value(String),
    /// Command returned a list of values.
    List(Vec<String>),
    /// Error message.
    Error(CommandFailure),
}

/// Audit record emitted after command execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// Command ID.
    pub id: CommandId,
    /// Command label.
    pub label: String,
    /// Principal who executed the command.
    pub principal: String,
    /// Status/Result of execution.
    pub status: String,
}

/// Record of an executed command and its result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Command metadata.
    pub meta: CommandMeta,
    /// Command label.
    pub label: String,
    /// Execution result.
    pub result: CommandResult,
}
