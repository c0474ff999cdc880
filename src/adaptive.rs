//! Live-updatable configuration handles.
//!
//! Used for the default [`Limits`] of an identity class: the admission layer
//! reads the current value for every request, and the control plane can swap
//! it without rebuilding the service stack. Only buckets created after a swap
//! see the new defaults; live buckets are changed through
//! [`BucketRegistry::reconfigure`](crate::registry::BucketRegistry::reconfigure).
//!
//! Default uses `ArcSwap` for lock-free reads; feature `adaptive-rwlock`
//! switches to an `RwLock`.

use crate::config::{ConfigError, Limits};
use crate::rate::Rate;
use std::sync::Arc;

#[cfg(feature = "adaptive-rwlock")]
use std::sync::{PoisonError, RwLock};

#[cfg(not(feature = "adaptive-rwlock"))]
use arc_swap::ArcSwap;

/// Shared handle to a value that can be replaced at runtime. Clones observe
/// the same value.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    #[cfg(not(feature = "adaptive-rwlock"))]
    inner: Arc<ArcSwap<T>>,
    #[cfg(feature = "adaptive-rwlock")]
    inner: Arc<RwLock<Arc<T>>>,
}

/// Default limits for one class of identities.
pub type DynamicLimits = DynamicConfig<Limits>;

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            Self { inner: Arc::new(RwLock::new(Arc::new(value))) }
        }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.load_full()
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.store(Arc::new(value));
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
        }
    }

    /// Derive a new value from the current one. Concurrent updates are last
    /// writer wins.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current));
    }
}

impl DynamicConfig<Limits> {
    /// Change only the default rate.
    pub fn set_rate(&self, rate: Rate) -> Result<(), ConfigError> {
        let next = self.get().with_rate(rate)?;
        self.set(next);
        Ok(())
    }

    /// Change only the default burst.
    pub fn set_burst(&self, burst: f64) -> Result<(), ConfigError> {
        let next = self.get().with_burst(burst)?;
        self.set(next);
        Ok(())
    }
}

impl From<Limits> for DynamicConfig<Limits> {
    fn from(limits: Limits) -> Self {
        Self::new(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_update() {
        let a = DynamicConfig::new(1);
        assert_eq!(*a.get(), 1);
        a.set(2);
        assert_eq!(*a.get(), 2);
        a.update(|v| v + 3);
        assert_eq!(*a.get(), 5);
    }

    #[test]
    fn clones_share_value() {
        let a = DynamicLimits::new(Limits::per_minute(5.0, 5.0).unwrap());
        let b = a.clone();
        a.set_burst(2.0).unwrap();
        assert_eq!(b.get().burst(), 2.0);
        assert_eq!(b.get().rate(), Rate::per_minute(5.0));
    }

    #[test]
    fn invalid_default_is_rejected_and_value_kept() {
        let a = DynamicLimits::new(Limits::per_minute(5.0, 5.0).unwrap());
        assert!(a.set_burst(-3.0).is_err());
        assert!(a.set_rate(Rate::per_second(-1.0)).is_err());
        assert_eq!(*a.get(), Limits::per_minute(5.0, 5.0).unwrap());
    }
}
