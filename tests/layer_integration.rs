//! Three routes behind the middleware, sharing one registry and one set of
//! outcome counters: `/user/...` at 5/min burst 5, `/admin/...` at 2/min
//! burst 3, and an unrestricted `/public/info`.
mod common;

use common::{manual_registry, per_minute};
use keygate::error::AT_CAPACITY;
use keygate::{
    AdmissionControl, AdmissionError, AdmissionLayer, DynamicLimits, InMemoryBucketRegistry,
    Limits, ManualClock, OutcomeCounters, PathKey, PatternKey, Rate,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{service_fn, Layer, ServiceExt};

type Route = BoxCloneService<String, String, AdmissionError<Infallible>>;

struct App {
    user: Route,
    admin: Route,
    public: Route,
    user_limits: DynamicLimits,
    counters: OutcomeCounters,
    registry: Arc<InMemoryBucketRegistry>,
    clock: ManualClock,
}

fn app() -> App {
    let (registry, clock) = manual_registry();
    let counters = OutcomeCounters::new();
    let user_limits = DynamicLimits::new(per_minute(5.0, 5.0));
    let admin_limits = DynamicLimits::new(per_minute(2.0, 3.0));

    let control = || AdmissionControl::new(registry.clone()).with_sink(counters.clone());
    let user = AdmissionLayer::new(control(), PathKey, user_limits.clone())
        .layer(service_fn(|path: String| async move { Ok::<_, Infallible>(format!("Hey I am User {path}")) }));
    let admin = AdmissionLayer::new(control(), PathKey, admin_limits)
        .layer(service_fn(|path: String| async move { Ok::<_, Infallible>(format!("Hey I am Admin {path}")) }));
    let public = AdmissionLayer::new(control(), PathKey, DynamicLimits::new(Limits::unlimited()))
        .layer(service_fn(|_: String| async move { Ok::<_, Infallible>("Public info".to_string()) }));

    App {
        user: BoxCloneService::new(user),
        admin: BoxCloneService::new(admin),
        public: BoxCloneService::new(public),
        user_limits,
        counters,
        registry,
        clock,
    }
}

async fn hit(route: &Route, path: &str) -> Result<String, AdmissionError<Infallible>> {
    route.clone().oneshot(path.to_string()).await
}

#[tokio::test]
async fn user_route_admits_five_then_rejects() {
    let app = app();
    for _ in 0..5 {
        assert_eq!(hit(&app.user, "/user/1/data").await.unwrap(), "Hey I am User /user/1/data");
    }
    let err = hit(&app.user, "/user/1/data").await.unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(err.to_string(), AT_CAPACITY);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));

    let user = app.counters.get("user").unwrap();
    assert_eq!((user.admitted, user.denied), (5, 1));
}

#[tokio::test]
async fn admin_route_has_its_own_budget() {
    let app = app();
    for _ in 0..3 {
        assert!(hit(&app.admin, "/admin/1/data").await.is_ok());
    }
    assert!(hit(&app.admin, "/admin/1/data").await.unwrap_err().is_rejected());

    // a different admin path is a different identity
    assert!(hit(&app.admin, "/admin/2/data").await.is_ok());
    // and the user route is unaffected
    assert!(hit(&app.user, "/user/1/data").await.is_ok());

    let snapshot = app.counters.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].profile, "admin");
    assert_eq!((snapshot[0].admitted, snapshot[0].denied), (4, 1));
    assert_eq!(snapshot[1].profile, "user");
    assert_eq!(app.registry_len(), 3);
}

#[tokio::test]
async fn public_route_is_never_limited() {
    let app = app();
    for _ in 0..1_000 {
        assert_eq!(hit(&app.public, "/public/info").await.unwrap(), "Public info");
    }

    let public = app.counters.get("public").unwrap();
    assert_eq!((public.admitted, public.denied), (1_000, 0));
    assert_eq!(app.registry_len(), 1);

    // exhausting a limited route leaves the public one untouched
    for _ in 0..4 {
        let _ = hit(&app.admin, "/admin/1/data").await;
    }
    assert!(hit(&app.public, "/public/info").await.is_ok());
}

#[tokio::test]
async fn denied_identity_recovers_after_refill() {
    let app = app();
    for _ in 0..3 {
        hit(&app.admin, "/admin/1/data").await.unwrap();
    }
    assert!(hit(&app.admin, "/admin/1/data").await.is_err());

    // 2/min: one token every 30s
    app.clock.advance(Duration::from_secs(29));
    assert!(hit(&app.admin, "/admin/1/data").await.is_err());
    app.clock.advance(Duration::from_secs(1));
    assert!(hit(&app.admin, "/admin/1/data").await.is_ok());
    assert!(hit(&app.admin, "/admin/1/data").await.is_err());
}

#[tokio::test]
async fn new_defaults_reach_new_identities_only() {
    let app = app();
    for _ in 0..5 {
        hit(&app.user, "/user/1/data").await.unwrap();
    }
    app.user_limits.set_burst(1.0).unwrap();
    app.user_limits.set_rate(Rate::ZERO).unwrap();

    // /user/2 is created with burst 1 and no refill
    assert!(hit(&app.user, "/user/2/data").await.is_ok());
    for _ in 0..3 {
        let err = hit(&app.user, "/user/2/data").await.unwrap_err();
        assert_eq!(err.retry_after(), None);
    }
    let user = app.counters.get("user").unwrap();
    assert_eq!((user.admitted, user.denied), (6, 3));

    // /user/1 keeps its original rate
    app.clock.advance(Duration::from_secs(12));
    assert!(hit(&app.user, "/user/1/data").await.is_ok());
}

#[tokio::test]
async fn pattern_key_shares_budget_across_subpaths() {
    let (registry, _clock) = manual_registry();
    let layer = AdmissionLayer::new(
        AdmissionControl::new(registry.clone()),
        PatternKey::new("/user/:id/*"),
        DynamicLimits::new(per_minute(5.0, 2.0)),
    );
    let svc = layer.layer(service_fn(|_: String| async { Ok::<_, Infallible>(()) }));

    assert!(svc.clone().oneshot("/user/7/data".to_string()).await.is_ok());
    assert!(svc.clone().oneshot("/user/7/profile".to_string()).await.is_ok());
    let err = svc.clone().oneshot("/user/7/data".to_string()).await.unwrap_err();
    assert_eq!(err.identity(), Some("user:7"));
}

impl App {
    fn registry_len(&self) -> usize {
        use keygate::BucketRegistry;
        self.registry.len()
    }
}
