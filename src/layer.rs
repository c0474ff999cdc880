//! Tower middleware that gates requests on per-identity admission.
//!
//! ```rust
//! use keygate::{AdmissionControl, AdmissionLayer, DynamicLimits, InMemoryBucketRegistry, Limits, PathKey};
//! use std::sync::Arc;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let control = AdmissionControl::new(Arc::new(InMemoryBucketRegistry::new()));
//! let defaults = DynamicLimits::new(Limits::per_minute(2.0, 3.0).unwrap());
//! let layer = AdmissionLayer::new(control, PathKey, defaults);
//!
//! let svc = layer.layer(service_fn(|path: String| async move {
//!     Ok::<_, std::convert::Infallible>(format!("Hey I am Admin {path}"))
//! }));
//! let reply = svc.oneshot("/admin/1/data".to_string()).await.unwrap();
//! assert_eq!(reply, "Hey I am Admin /admin/1/data");
//! # }
//! ```

use crate::adaptive::DynamicLimits;
use crate::admission::AdmissionControl;
use crate::bucket::Decision;
use crate::error::AdmissionError;
use crate::identity::KeyExtractor;
use crate::telemetry::AdmissionEvent;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that admits or rejects requests using an [`AdmissionControl`].
#[derive(Debug)]
pub struct AdmissionLayer<K, S> {
    control: Arc<AdmissionControl<S>>,
    key: Arc<K>,
    limits: DynamicLimits,
}

impl<K, S> Clone for AdmissionLayer<K, S> {
    fn clone(&self) -> Self {
        Self { control: self.control.clone(), key: self.key.clone(), limits: self.limits.clone() }
    }
}

impl<K, S> AdmissionLayer<K, S> {
    /// Gate requests keyed by `key`. New identities get whatever `limits`
    /// holds when they are first seen.
    pub fn new(control: AdmissionControl<S>, key: K, limits: DynamicLimits) -> Self {
        Self { control: Arc::new(control), key: Arc::new(key), limits }
    }

    /// Handle to the defaults, for live updates.
    pub fn limits(&self) -> &DynamicLimits {
        &self.limits
    }
}

impl<Inner, K, S> Layer<Inner> for AdmissionLayer<K, S> {
    type Service = AdmissionService<Inner, K, S>;

    fn layer(&self, service: Inner) -> Self::Service {
        AdmissionService {
            inner: service,
            control: self.control.clone(),
            key: self.key.clone(),
            limits: self.limits.clone(),
        }
    }
}

/// Middleware service produced by [`AdmissionLayer`].
#[derive(Debug)]
pub struct AdmissionService<Inner, K, S> {
    inner: Inner,
    control: Arc<AdmissionControl<S>>,
    key: Arc<K>,
    limits: DynamicLimits,
}

impl<Inner: Clone, K, S> Clone for AdmissionService<Inner, K, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            control: self.control.clone(),
            key: self.key.clone(),
            limits: self.limits.clone(),
        }
    }
}

impl<Inner, K, S, Req> Service<Req> for AdmissionService<Inner, K, S>
where
    Inner: Service<Req> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    Inner::Error: Send + 'static,
    K: KeyExtractor<Req>,
    S: tower::Service<AdmissionEvent, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = Inner::Response;
    type Error = AdmissionError<Inner::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let control = self.control.clone();
        let mut inner = self.inner.clone();
        let identity = self.key.extract(&req);
        let limits = self.limits.get();

        Box::pin(async move {
            match control.check(&identity, &limits).await {
                Decision::Allowed { .. } => inner.call(req).await.map_err(AdmissionError::Inner),
                Decision::Denied { retry_after, reason } => {
                    tracing::debug!(target: "keygate::layer", identity = %identity, "rejecting request");
                    Err(AdmissionError::Rejected { identity, retry_after, reason })
                }
            }
        })
    }
}
