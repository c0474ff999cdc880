//! Registry mapping identities to their token buckets.
//!
//! Buckets are created on first sight of an identity, touched on every check,
//! and evicted by the sweeper once idle. The map lock covers lookup, insert and
//! the heartbeat only; the token arithmetic runs under each bucket's own lock,
//! so unrelated identities never serialize behind one another's decisions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::bucket::{BucketSnapshot, Decision, TokenBucket};
use crate::clock::{elapsed_between, Clock, MonotonicClock};
use crate::config::{ConfigError, Limits};
use crate::rate::Rate;
use tracing::{info, trace};

/// A reconfiguration applied to every live bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitsUpdate {
    /// Replace the rate, keep each bucket's burst.
    Rate(Rate),
    /// Replace the burst, keep each bucket's rate.
    Burst(f64),
    /// Replace both in one step.
    Both(Limits),
}

impl LimitsUpdate {
    /// Validated rate update.
    pub fn rate(rate: Rate) -> Result<Self, ConfigError> {
        crate::config::validate_rate(rate)?;
        Ok(Self::Rate(rate))
    }

    /// Validated burst update.
    pub fn burst(burst: f64) -> Result<Self, ConfigError> {
        crate::config::validate_burst(burst)?;
        Ok(Self::Burst(burst))
    }

    /// The legacy admin update: one number used as both the per-minute rate
    /// and the burst (truncated to whole tokens).
    pub fn coupled(limit: f64) -> Result<Self, ConfigError> {
        Ok(Self::Both(Limits::per_minute(limit, limit.trunc())?))
    }

    fn apply(&self, bucket: &TokenBucket) {
        match self {
            LimitsUpdate::Rate(rate) => bucket.set_rate(*rate),
            LimitsUpdate::Burst(burst) => bucket.set_burst(*burst),
            LimitsUpdate::Both(limits) => bucket.set_limits(*limits),
        }
    }
}

/// Trait for bucket registries (injectable into the admission façade, the
/// sweeper and the control plane).
pub trait BucketRegistry: Send + Sync + std::fmt::Debug {
    /// Get or create the bucket for `identity`, refresh its last-seen time, and
    /// decide on one request. `limits` is only used when the bucket is created.
    fn check(&self, identity: &str, limits: &Limits) -> Decision;

    /// Boolean form of [`BucketRegistry::check`].
    fn allow(&self, identity: &str, limits: &Limits) -> bool {
        self.check(identity, limits).is_allowed()
    }

    /// Apply `update` to every bucket live at call time. Returns how many
    /// buckets were updated. Identities created later are unaffected.
    fn reconfigure(&self, update: &LimitsUpdate) -> usize;

    /// Evict identities idle for longer than `idle_timeout`. Returns how many
    /// were evicted.
    fn sweep(&self, idle_timeout: Duration) -> usize;

    /// Forget one identity. Returns whether it was tracked.
    fn remove(&self, identity: &str) -> bool;

    /// Whether `identity` is currently tracked.
    fn contains(&self, identity: &str) -> bool;

    /// Number of tracked identities.
    fn len(&self) -> usize;

    /// Whether no identity is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot bucket states sorted by identity.
    fn snapshot(&self) -> Vec<(String, BucketSnapshot)>;
}

#[derive(Debug)]
struct Entry {
    bucket: Arc<TokenBucket>,
    last_seen: AtomicU64,
}

impl Entry {
    fn touch(&self, now: u64) {
        self.last_seen.fetch_max(now, Ordering::AcqRel);
    }

    fn idle_for(&self, now: u64) -> Duration {
        elapsed_between(self.last_seen.load(Ordering::Acquire), now)
    }
}

/// In-memory implementation backed by an RwLock.
///
/// Clones share the same map.
#[derive(Clone, Debug)]
pub struct InMemoryBucketRegistry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

/// Default registry used when none is injected.
pub type DefaultBucketRegistry = InMemoryBucketRegistry;

impl Default for InMemoryBucketRegistry {
    fn default() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::default()))
    }
}

impl InMemoryBucketRegistry {
    /// Empty registry on the process monotonic clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry reading time from `clock`. Buckets it creates share the
    /// same clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), clock }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch or create the bucket for `identity` and touch it. The map lock is
    /// released before returning.
    fn bucket_for(&self, identity: &str, limits: &Limits) -> Arc<TokenBucket> {
        let now = self.clock.now_nanos();
        if let Some(entry) = self.read().get(identity) {
            entry.touch(now);
            return entry.bucket.clone();
        }

        let mut map = self.write();
        let entry = map.entry(identity.to_string()).or_insert_with(|| {
            trace!(target: "keygate::registry", identity, rate = %limits.rate(), burst = limits.burst(), "tracking new identity");
            Entry {
                bucket: Arc::new(TokenBucket::with_clock(*limits, self.clock.clone())),
                last_seen: AtomicU64::new(now),
            }
        });
        entry.touch(now);
        entry.bucket.clone()
    }
}

impl BucketRegistry for InMemoryBucketRegistry {
    fn check(&self, identity: &str, limits: &Limits) -> Decision {
        self.bucket_for(identity, limits).check()
    }

    fn reconfigure(&self, update: &LimitsUpdate) -> usize {
        let buckets: Vec<Arc<TokenBucket>> =
            self.read().values().map(|entry| entry.bucket.clone()).collect();
        for bucket in &buckets {
            update.apply(bucket);
        }
        info!(target: "keygate::registry", update = ?update, buckets = buckets.len(), "reconfigured live buckets");
        buckets.len()
    }

    fn sweep(&self, idle_timeout: Duration) -> usize {
        let mut map = self.write();
        let now = self.clock.now_nanos();
        let before = map.len();
        map.retain(|identity, entry| {
            let keep = entry.idle_for(now) <= idle_timeout;
            if !keep {
                trace!(target: "keygate::registry", identity = %identity, "evicting idle identity");
            }
            keep
        });
        before - map.len()
    }

    fn remove(&self, identity: &str) -> bool {
        self.write().remove(identity).is_some()
    }

    fn contains(&self, identity: &str) -> bool {
        self.read().contains_key(identity)
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn snapshot(&self) -> Vec<(String, BucketSnapshot)> {
        let mut entries: Vec<(String, BucketSnapshot)> =
            self.read().iter().map(|(k, v)| (k.clone(), v.bucket.snapshot())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
