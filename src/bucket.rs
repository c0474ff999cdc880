//! Token bucket admission for a single identity.
//!
//! Tokens accrue lazily: nothing runs between calls, each decision computes the
//! credit earned since the last committed update and saturates it at `burst`.
//! All four pieces of state (rate, burst, tokens, last update) sit behind one
//! mutex so a reconfiguration can never interleave with a refill-then-withdraw.

use crate::clock::{elapsed_between, Clock, MonotonicClock};
use crate::config::Limits;
use crate::rate::Rate;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The bucket is empty but refilling; retry after the hinted delay.
    Exhausted,
    /// The bucket can never hold a whole token again under the current
    /// configuration (zero rate, or burst below one).
    NoRefill,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Exhausted => write!(f, "token_bucket_empty"),
            DenyReason::NoRefill => write!(f, "token_bucket_no_refill"),
        }
    }
}

/// The decision returned by an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request may proceed.
    Allowed {
        /// Tokens left after this admission; infinite for an unlimited rate.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: f64,
    },
    /// The request is rejected as over capacity.
    Denied {
        /// Earliest time a single token will be available, if ever.
        /// Useful for `Retry-After` headers.
        retry_after: Option<Duration>,
        /// Reason for denial.
        reason: DenyReason,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Retry hint for denials.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Denied { retry_after, .. } => *retry_after,
            Decision::Allowed { .. } => None,
        }
    }
}

/// Point-in-time view of a bucket's committed state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Accrual rate.
    pub rate: Rate,
    /// Ceiling.
    pub burst: f64,
    /// Balance at the last commit; accrual since then is not included.
    pub tokens: f64,
}

#[derive(Debug)]
struct BucketState {
    rate: Rate,
    burst: f64,
    tokens: f64,
    last_update: u64,
}

impl BucketState {
    /// Balance at `now` under the current configuration, capped at `burst`.
    fn advance(&self, now: u64) -> f64 {
        if self.rate.is_unlimited() {
            return self.burst;
        }
        let delta = self.rate.tokens_for(elapsed_between(self.last_update, now));
        (self.tokens + delta).min(self.burst)
    }

    /// Commit accrual up to `now`.
    fn refresh(&mut self, now: u64) {
        self.tokens = self.advance(now);
        self.last_update = self.last_update.max(now);
    }

    fn apply_burst(&mut self, burst: f64) {
        // With no refill the burst is the whole remaining budget.
        self.tokens = if self.rate.is_zero() { burst } else { self.tokens.min(burst) };
        self.burst = burst;
    }
}

/// A token bucket owned by one identity.
///
/// Starts full. Each admitted request spends one token; denials leave the
/// committed state untouched.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Full bucket on the process monotonic clock.
    pub fn new(limits: Limits) -> Self {
        Self::with_clock(limits, Arc::new(MonotonicClock::default()))
    }

    /// Full bucket reading time from `clock`.
    pub fn with_clock(limits: Limits, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_nanos();
        Self {
            state: Mutex::new(BucketState {
                rate: limits.rate(),
                burst: limits.burst(),
                tokens: limits.burst(),
                last_update: now,
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // State is plain numbers that are consistent between statements, so a
        // panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report whether one request may be admitted now.
    pub fn allow(&self) -> bool {
        self.check().is_allowed()
    }

    /// Admit one request now or explain why not.
    pub fn check(&self) -> Decision {
        let mut state = self.lock();
        if state.rate.is_unlimited() {
            return Decision::Allowed { remaining: f64::INFINITY };
        }

        let now = self.clock.now_nanos();
        let refilled = state.advance(now);
        let after = refilled - 1.0;

        if after >= 0.0 {
            state.tokens = after;
            state.last_update = state.last_update.max(now);
            return Decision::Allowed { remaining: after };
        }

        if state.rate.is_zero() || state.burst < 1.0 {
            Decision::Denied { retry_after: None, reason: DenyReason::NoRefill }
        } else {
            Decision::Denied {
                retry_after: state.rate.time_for(1.0 - refilled),
                reason: DenyReason::Exhausted,
            }
        }
    }

    /// Change the accrual rate. Credit earned under the old rate is kept.
    pub fn set_rate(&self, rate: Rate) {
        let mut state = self.lock();
        let now = self.clock.now_nanos();
        state.refresh(now);
        state.rate = rate;
    }

    /// Change the ceiling. Credit earned under the old ceiling is kept and then
    /// clamped to the new one.
    pub fn set_burst(&self, burst: f64) {
        let mut state = self.lock();
        let now = self.clock.now_nanos();
        state.refresh(now);
        state.apply_burst(burst);
    }

    /// Change rate and burst in one step.
    pub fn set_limits(&self, limits: Limits) {
        let mut state = self.lock();
        let now = self.clock.now_nanos();
        state.refresh(now);
        state.rate = limits.rate();
        state.apply_burst(limits.burst());
    }

    /// Current configuration and committed balance.
    pub fn snapshot(&self) -> BucketSnapshot {
        let state = self.lock();
        BucketSnapshot { rate: state.rate, burst: state.burst, tokens: state.tokens }
    }
}
