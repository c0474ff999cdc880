use super::command::{CommandLabel, LimitCommand, Scope};
use super::types::*;
use crate::adaptive::DynamicLimits;
use crate::config::{ConfigError, Limits};
use crate::registry::{BucketRegistry, LimitsUpdate};
use crate::telemetry::OutcomeCounters;
use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Command handler trait.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a parsed command.
    async fn handle(&self, env: CommandEnvelope) -> Result<CommandResult, CommandError>;
}

/// Handler that reconfigures and inspects a bucket registry.
///
/// Profiles name the default [`Limits`] of one identity class, usually the
/// same handles given to each route's
/// [`AdmissionLayer`](crate::layer::AdmissionLayer).
#[derive(Clone, Debug)]
pub struct LimitsHandler {
    registry: Arc<dyn BucketRegistry>,
    profiles: BTreeMap<String, DynamicLimits>,
    counters: Option<OutcomeCounters>,
}

impl LimitsHandler {
    pub fn new(registry: Arc<dyn BucketRegistry>) -> Self {
        Self { registry, profiles: BTreeMap::new(), counters: None }
    }

    /// Register the defaults for a profile.
    pub fn with_profile(mut self, name: impl Into<String>, limits: DynamicLimits) -> Self {
        self.profiles.insert(name.into(), limits);
        self
    }

    /// Expose outcome counters through `get_metrics` and `get_state`.
    pub fn with_counters(mut self, counters: OutcomeCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    fn reconfigure(
        &self,
        scope: Scope,
        profile: Option<&str>,
        update: LimitsUpdate,
    ) -> Result<CommandResult, CommandError> {
        let targets: Vec<(&String, &DynamicLimits)> = if scope.includes_defaults() {
            match profile {
                Some(name) => match self.profiles.get_key_value(name) {
                    Some(entry) => vec![entry],
                    None => {
                        return Ok(CommandResult::Error(CommandFailure::NotFound {
                            what: format!("profile:{name}"),
                        }))
                    }
                },
                None => self.profiles.iter().collect(),
            }
        } else {
            Vec::new()
        };

        for (name, defaults) in &targets {
            if let Err(e) = apply_default(defaults, update) {
                return Ok(CommandResult::Error(CommandFailure::invalid(e.to_string())));
            }
            let current = defaults.get();
            tracing::info!(
                target: "keygate::control",
                profile = %name,
                rate = %current.rate(),
                burst = current.burst(),
                "updated default limits"
            );
        }

        let buckets = if scope.includes_live() { self.registry.reconfigure(&update) } else { 0 };

        Ok(CommandResult::Value(
            json!({ "scope": scope.to_string(), "buckets": buckets, "defaults": targets.len() })
                .to_string(),
        ))
    }

    fn reconfigure_or_reject(
        &self,
        scope: Scope,
        profile: Option<&str>,
        update: Result<LimitsUpdate, ConfigError>,
    ) -> Result<CommandResult, CommandError> {
        match update {
            Ok(update) => self.reconfigure(scope, profile, update),
            Err(e) => Ok(invalid(e)),
        }
    }

    fn limits_json(&self, profile: Option<&str>) -> Result<JsonValue, CommandFailure> {
        let mut out = Map::new();
        for (name, defaults) in &self.profiles {
            if profile.map_or(true, |p| p == name) {
                out.insert(name.clone(), limits_to_json(&defaults.get()));
            }
        }
        if let Some(p) = profile {
            if out.is_empty() {
                return Err(CommandFailure::NotFound { what: format!("profile:{p}") });
            }
        }
        Ok(JsonValue::Object(out))
    }

    fn identities_json(&self) -> JsonValue {
        let buckets: Map<String, JsonValue> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(identity, snap)| {
                (
                    identity,
                    json!({ "rate": snap.rate.to_string(), "burst": snap.burst, "tokens": snap.tokens }),
                )
            })
            .collect();
        JsonValue::Object(buckets)
    }

    fn metrics_json(&self) -> Result<Option<JsonValue>, CommandError> {
        self.counters
            .as_ref()
            .map(|c| serde_json::to_value(c.snapshot()))
            .transpose()
            .map_err(CommandError::from)
    }
}

fn apply_default(defaults: &DynamicLimits, update: LimitsUpdate) -> Result<(), ConfigError> {
    match update {
        LimitsUpdate::Rate(rate) => defaults.set_rate(rate),
        LimitsUpdate::Burst(burst) => defaults.set_burst(burst),
        LimitsUpdate::Both(limits) => {
            defaults.set(limits);
            Ok(())
        }
    }
}

fn limits_to_json(limits: &Limits) -> JsonValue {
    json!({ "rate": limits.rate().to_string(), "burst": limits.burst() })
}

fn invalid(e: ConfigError) -> CommandResult {
    CommandResult::Error(CommandFailure::invalid(e.to_string()))
}

#[async_trait]
impl CommandHandler for LimitsHandler {
    async fn handle(&self, env: CommandEnvelope) -> Result<CommandResult, CommandError> {
        tracing::debug!(target: "keygate::control", id = %env.meta.id, label = env.cmd.label(), "handling command");
        match env.cmd {
            LimitCommand::SetLimits { scope, profile, rate, burst } => self.reconfigure_or_reject(
                scope,
                profile.as_deref(),
                Limits::new(rate, burst).map(LimitsUpdate::Both),
            ),
            LimitCommand::SetRate { scope, profile, rate } => {
                self.reconfigure_or_reject(scope, profile.as_deref(), LimitsUpdate::rate(rate))
            }
            LimitCommand::SetBurst { scope, profile, burst } => {
                self.reconfigure_or_reject(scope, profile.as_deref(), LimitsUpdate::burst(burst))
            }
            LimitCommand::UpdateRates { limit } => match LimitsUpdate::coupled(limit) {
                Ok(update) => {
                    self.registry.reconfigure(&update);
                    Ok(CommandResult::Value(format!("Limiter updated to {limit}")))
                }
                Err(e) => Ok(invalid(e)),
            },
            LimitCommand::GetLimits { profile } => Ok(match self.limits_json(profile.as_deref()) {
                Ok(value) => CommandResult::Value(value.to_string()),
                Err(failure) => CommandResult::Error(failure),
            }),
            LimitCommand::ListIdentities => Ok(CommandResult::List(
                self.registry.snapshot().into_iter().map(|(identity, _)| identity).collect(),
            )),
            LimitCommand::Evict { identity } => Ok(if self.registry.remove(&identity) {
                CommandResult::Ack
            } else {
                CommandResult::Error(CommandFailure::NotFound { what: format!("identity:{identity}") })
            }),
            LimitCommand::GetMetrics => Ok(match self.metrics_json()? {
                Some(metrics) => CommandResult::Value(metrics.to_string()),
                None => CommandResult::Error(CommandFailure::NotFound {
                    what: "outcome counters".into(),
                }),
            }),
            LimitCommand::GetState => {
                let mut root = Map::new();
                root.insert("identities".into(), self.identities_json());
                root.insert("defaults".into(), self.limits_json(None).unwrap_or_default());
                if let Some(metrics) = self.metrics_json()? {
                    root.insert("metrics".into(), metrics);
                }
                Ok(CommandResult::Value(serde_json::to_string(&root)?))
            }
            LimitCommand::Health => Ok(CommandResult::Value(
                json!({
                    "status": "ok",
                    "version": env!("CARGO_PKG_VERSION"),
                    "identities": self.registry.len()
                })
                .to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate::Rate;
    use crate::registry::InMemoryBucketRegistry;
    use std::time::Duration;

    fn setup() -> (LimitsHandler, Arc<InMemoryBucketRegistry>, DynamicLimits, ManualClock) {
        let clock = ManualClock::new();
        let registry = Arc::new(InMemoryBucketRegistry::with_clock(Arc::new(clock.clone())));
        let user = DynamicLimits::new(Limits::per_minute(5.0, 5.0).unwrap());
        let handler = LimitsHandler::new(registry.clone())
            .with_profile("user", user.clone())
            .with_profile("admin", DynamicLimits::new(Limits::per_minute(2.0, 3.0).unwrap()));
        (handler, registry, user, clock)
    }

    async fn run(handler: &LimitsHandler, cmd: LimitCommand) -> CommandResult {
        handler.handle(CommandEnvelope::new("cmd-1", cmd)).await.unwrap()
    }

    fn value(res: CommandResult) -> JsonValue {
        match res {
            CommandResult::Value(v) => serde_json::from_str(&v).unwrap(),
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn live_scope_leaves_defaults_alone() {
        let (handler, registry, user, _clock) = setup();
        registry.check("/user/1", &user.get());

        let res = run(
            &handler,
            LimitCommand::SetBurst { scope: Scope::Live, profile: None, burst: 1.0 },
        )
        .await;
        assert_eq!(value(res), json!({"scope": "live", "buckets": 1, "defaults": 0}));
        assert_eq!(registry.snapshot()[0].1.burst, 1.0);
        assert_eq!(user.get().burst(), 5.0);
    }

    #[tokio::test]
    async fn all_scope_updates_buckets_and_named_profile() {
        let (handler, registry, user, _clock) = setup();
        registry.check("/user/1", &user.get());

        let res = run(
            &handler,
            LimitCommand::SetLimits {
                scope: Scope::All,
                profile: Some("user".into()),
                rate: Rate::per_minute(60.0),
                burst: 10.0,
            },
        )
        .await;
        assert_eq!(value(res), json!({"scope": "all", "buckets": 1, "defaults": 1}));
        assert_eq!(*user.get(), Limits::per_minute(60.0, 10.0).unwrap());
        assert_eq!(registry.snapshot()[0].1.rate, Rate::per_minute(60.0));
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let (handler, _registry, _user, _clock) = setup();
        let res = run(
            &handler,
            LimitCommand::SetRate {
                scope: Scope::Defaults,
                profile: Some("public".into()),
                rate: Rate::ZERO,
            },
        )
        .await;
        assert_eq!(
            res,
            CommandResult::Error(CommandFailure::NotFound { what: "profile:public".into() })
        );
    }

    #[tokio::test]
    async fn update_rates_couples_rate_and_burst() {
        let (handler, registry, user, clock) = setup();
        registry.check("/user/1", &user.get());
        clock.advance(Duration::from_secs(1));

        let res = run(&handler, LimitCommand::UpdateRates { limit: 2.0 }).await;
        assert_eq!(res, CommandResult::Value("Limiter updated to 2".into()));

        let snap = registry.snapshot()[0].1;
        assert_eq!(snap.rate, Rate::per_minute(2.0));
        assert_eq!(snap.burst, 2.0);
        assert_eq!(snap.tokens, 2.0);
        // defaults untouched, new identities keep the old limits
        assert_eq!(user.get().burst(), 5.0);
    }

    #[tokio::test]
    async fn get_limits_renders_profiles() {
        let (handler, _registry, _user, _clock) = setup();
        let res = run(&handler, LimitCommand::GetLimits { profile: None }).await;
        assert_eq!(
            value(res),
            json!({
                "admin": {"rate": "2/min", "burst": 3.0},
                "user": {"rate": "5/min", "burst": 5.0}
            })
        );

        let res = run(&handler, LimitCommand::GetLimits { profile: Some("nope".into()) }).await;
        assert!(matches!(res, CommandResult::Error(CommandFailure::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_and_evict_identities() {
        let (handler, registry, user, _clock) = setup();
        registry.check("/user/2", &user.get());
        registry.check("/user/1", &user.get());

        assert_eq!(
            run(&handler, LimitCommand::ListIdentities).await,
            CommandResult::List(vec!["/user/1".into(), "/user/2".into()])
        );
        assert_eq!(
            run(&handler, LimitCommand::Evict { identity: "/user/1".into() }).await,
            CommandResult::Ack
        );
        assert!(matches!(
            run(&handler, LimitCommand::Evict { identity: "/user/1".into() }).await,
            CommandResult::Error(CommandFailure::NotFound { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn metrics_require_counters() {
        let (handler, _registry, _user, _clock) = setup();
        assert!(matches!(
            run(&handler, LimitCommand::GetMetrics).await,
            CommandResult::Error(CommandFailure::NotFound { .. })
        ));

        let counters = OutcomeCounters::new();
        counters.record("user", true);
        counters.record("user", false);
        let handler = handler.with_counters(counters);
        assert_eq!(
            value(run(&handler, LimitCommand::GetMetrics).await),
            json!([{"endpoint": "user", "success_count": 1, "denied_count": 1}])
        );
    }

    #[tokio::test]
    async fn state_includes_buckets_and_defaults() {
        let (handler, registry, user, _clock) = setup();
        registry.check("/user/1", &user.get());

        let state = value(run(&handler, LimitCommand::GetState).await);
        assert_eq!(state["identities"]["/user/1"]["tokens"], json!(4.0));
        assert_eq!(state["defaults"]["admin"]["burst"], json!(3.0));
        assert!(state.get("metrics").is_none());
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (handler, _registry, _user, _clock) = setup();
        let health = value(run(&handler, LimitCommand::Health).await);
        assert_eq!(health["status"], "ok");
        assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    }
}
