//! Validated configuration for buckets and the idle sweeper.

use crate::rate::Rate;
use std::time::Duration;

/// Errors produced when validating limits or sweep settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Burst must be finite and >= 0.
    #[error("burst must be a finite value >= 0 (got {provided})")]
    InvalidBurst {
        /// Value provided by caller.
        provided: f64,
    },
    /// Rate must be >= 0 and not NaN.
    #[error("rate must be >= 0 (got {provided} tokens/s)")]
    InvalidRate {
        /// Value provided by caller, in tokens per second.
        provided: f64,
    },
    /// Sweep interval must be > 0.
    #[error("sweep interval must be > 0")]
    ZeroSweepInterval,
    /// Idle timeout must be > 0.
    #[error("idle timeout must be > 0")]
    ZeroIdleTimeout,
}

/// Rate and burst applied to one class of identities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    rate: Rate,
    burst: f64,
}

impl Limits {
    /// Create limits with validation.
    pub fn new(rate: Rate, burst: f64) -> Result<Self, ConfigError> {
        validate_rate(rate)?;
        validate_burst(burst)?;
        Ok(Self { rate, burst })
    }

    /// `n` requests per minute with a burst of `burst`, the unit the
    /// per-route defaults are usually written in.
    pub fn per_minute(n: f64, burst: f64) -> Result<Self, ConfigError> {
        Self::new(Rate::per_minute(n), burst)
    }

    /// Limits that admit everything.
    pub fn unlimited() -> Self {
        Self { rate: Rate::UNLIMITED, burst: 0.0 }
    }

    /// Accrual rate.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Bucket ceiling.
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Same burst, different rate.
    pub fn with_rate(self, rate: Rate) -> Result<Self, ConfigError> {
        Self::new(rate, self.burst)
    }

    /// Same rate, different burst.
    pub fn with_burst(self, burst: f64) -> Result<Self, ConfigError> {
        Self::new(self.rate, burst)
    }
}

pub(crate) fn validate_rate(rate: Rate) -> Result<(), ConfigError> {
    let r = rate.as_per_second();
    if r.is_nan() || r < 0.0 {
        return Err(ConfigError::InvalidRate { provided: r });
    }
    Ok(())
}

pub(crate) fn validate_burst(burst: f64) -> Result<(), ConfigError> {
    if !burst.is_finite() || burst < 0.0 {
        return Err(ConfigError::InvalidBurst { provided: burst });
    }
    Ok(())
}

/// Schedule for idle-identity reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    interval: Duration,
    idle_timeout: Duration,
}

impl Default for SweepConfig {
    /// Sweep once a minute, evicting identities idle for more than three minutes.
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), idle_timeout: Duration::from_secs(180) }
    }
}

impl SweepConfig {
    /// Create a sweep config with validation.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroSweepInterval`] or [`ConfigError::ZeroIdleTimeout`]
    /// when either duration is zero.
    pub fn new(interval: Duration, idle_timeout: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        Ok(Self { interval, idle_timeout })
    }

    /// Sweep every `interval`, evicting identities idle for three intervals.
    pub fn every(interval: Duration) -> Result<Self, ConfigError> {
        Self::new(interval, interval.saturating_mul(3))
    }

    /// How often the sweeper runs.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Inactivity after which an identity is evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
