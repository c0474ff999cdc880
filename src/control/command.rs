//! Typed control-plane commands and their JSON parsing.
//!
//! Every argument is validated here, so a command that reaches the handler
//! carries a usable rate and burst.

use super::types::CommandFailure;
use crate::config::{validate_burst, validate_rate};
use crate::rate::Rate;
use serde_json::Value as JsonValue;
use std::fmt;

/// Which limits a reconfiguration applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Scope {
    /// Buckets that already exist.
    #[default]
    Live,
    /// Defaults handed to identities seen from now on.
    Defaults,
    /// Both.
    All,
}

impl Scope {
    pub fn includes_live(self) -> bool {
        matches!(self, Scope::Live | Scope::All)
    }

    pub fn includes_defaults(self) -> bool {
        matches!(self, Scope::Defaults | Scope::All)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Live => "live",
            Scope::Defaults => "defaults",
            Scope::All => "all",
        })
    }
}

/// Commands understood by [`LimitsHandler`](super::LimitsHandler).
#[derive(Clone, Debug, PartialEq)]
pub enum LimitCommand {
    /// Replace rate and burst.
    SetLimits {
        scope: Scope,
        /// Restrict default updates to one profile.
        profile: Option<String>,
        rate: Rate,
        burst: f64,
    },
    /// Replace only the rate.
    SetRate { scope: Scope, profile: Option<String>, rate: Rate },
    /// Replace only the burst.
    SetBurst { scope: Scope, profile: Option<String>, burst: f64 },
    /// One number as both per-minute rate and burst, applied to live buckets.
    UpdateRates { limit: f64 },
    /// Default limits per profile.
    GetLimits { profile: Option<String> },
    /// Tracked identities, sorted.
    ListIdentities,
    /// Forget one identity.
    Evict { identity: String },
    /// Admitted/denied totals per profile.
    GetMetrics,
    /// Full snapshot: buckets, defaults, metrics.
    GetState,
    /// Health check probe.
    Health,
}

/// Trait for getting a string label for a command type.
pub trait CommandLabel {
    /// Returns the label for the command.
    fn label(&self) -> &str;
}

impl CommandLabel for LimitCommand {
    fn label(&self) -> &str {
        match self {
            LimitCommand::SetLimits { .. } => "set_limits",
            LimitCommand::SetRate { .. } => "set_rate",
            LimitCommand::SetBurst { .. } => "set_burst",
            LimitCommand::UpdateRates { .. } => "update_rates",
            LimitCommand::GetLimits { .. } => "get_limits",
            LimitCommand::ListIdentities => "list_identities",
            LimitCommand::Evict { .. } => "evict",
            LimitCommand::GetMetrics => "get_metrics",
            LimitCommand::GetState => "get_state",
            LimitCommand::Health => "health",
        }
    }
}

impl LimitCommand {
    /// Parse a command from its label and JSON arguments.
    pub fn parse(label: &str, args: &JsonValue) -> Result<Self, CommandFailure> {
        match label {
            "set_limits" => Ok(LimitCommand::SetLimits {
                scope: parse_scope(args)?,
                profile: parse_profile(args)?,
                rate: parse_rate(args, "rate")?,
                burst: parse_burst(args)?,
            }),
            "set_rate" => Ok(LimitCommand::SetRate {
                scope: parse_scope(args)?,
                profile: parse_profile(args)?,
                rate: parse_rate(args, "rate")?,
            }),
            "set_burst" => Ok(LimitCommand::SetBurst {
                scope: parse_scope(args)?,
                profile: parse_profile(args)?,
                burst: parse_burst(args)?,
            }),
            "update_rates" => {
                let limit = parse_number(args, "limit")?;
                if limit < 0.0 {
                    return Err(CommandFailure::invalid(format!("'limit' must be >= 0 (got {limit})")));
                }
                Ok(LimitCommand::UpdateRates { limit })
            }
            "get_limits" => Ok(LimitCommand::GetLimits { profile: parse_profile(args)? }),
            "list_identities" => Ok(LimitCommand::ListIdentities),
            "evict" => {
                let identity = args
                    .get("identity")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandFailure::invalid("missing 'identity' field"))?
                    .to_string();
                Ok(LimitCommand::Evict { identity })
            }
            "get_metrics" => Ok(LimitCommand::GetMetrics),
            "get_state" => Ok(LimitCommand::GetState),
            "health" => Ok(LimitCommand::Health),
            _ => Err(CommandFailure::invalid(format!("unknown command: {label}"))),
        }
    }
}

fn parse_scope(args: &JsonValue) -> Result<Scope, CommandFailure> {
    match args.get("scope") {
        None | Some(JsonValue::Null) => Ok(Scope::default()),
        Some(JsonValue::String(s)) => match s.as_str() {
            "live" => Ok(Scope::Live),
            "defaults" => Ok(Scope::Defaults),
            "all" => Ok(Scope::All),
            other => Err(CommandFailure::invalid(format!(
                "unknown scope '{other}' (expected live, defaults or all)"
            ))),
        },
        Some(_) => Err(CommandFailure::invalid("'scope' must be a string")),
    }
}

fn parse_profile(args: &JsonValue) -> Result<Option<String>, CommandFailure> {
    match args.get("profile") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CommandFailure::invalid("'profile' must be a string")),
    }
}

/// Numbers are taken as requests per minute; strings go through
/// [`Rate`]'s parser (`"5/min"`, `"2/s"`, `"inf"`).
fn parse_rate(args: &JsonValue, field: &str) -> Result<Rate, CommandFailure> {
    let rate = match args.get(field) {
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .map(Rate::per_minute)
            .ok_or_else(|| CommandFailure::invalid(format!("'{field}' is not a number")))?,
        Some(JsonValue::String(s)) => {
            s.parse::<Rate>().map_err(|e| CommandFailure::invalid(format!("'{field}': {e}")))?
        }
        Some(_) => return Err(CommandFailure::invalid(format!("'{field}' must be a number or string"))),
        None => return Err(CommandFailure::invalid(format!("missing '{field}' field"))),
    };
    validate_rate(rate).map_err(|e| CommandFailure::invalid(e.to_string()))?;
    Ok(rate)
}

fn parse_burst(args: &JsonValue) -> Result<f64, CommandFailure> {
    let burst = parse_number(args, "burst")?;
    validate_burst(burst).map_err(|e| CommandFailure::invalid(e.to_string()))?;
    Ok(burst)
}

/// A JSON number, or a string holding one (query-string style callers).
fn parse_number(args: &JsonValue, field: &str) -> Result<f64, CommandFailure> {
    let value = match args.get(field) {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(CommandFailure::invalid(format!("missing '{field}' field"))),
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(CommandFailure::invalid(format!("'{field}' must be a finite number"))),
    }
}
