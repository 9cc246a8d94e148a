//! BDD step definitions for the dashboard feature

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use cucumber::{given, then, when};
use tower::ServiceExt;

use watchdog::clock::Clock;
use watchdog::config::{Config, DashboardConfig};
use watchdog::io::HttpClient;
use watchdog::store::SnapshotStore;
use watchdog::WatchdogBuilder;

use crate::world::WatchdogWorld;

#[given("the watchdog service is assembled")]
async fn watchdog_assembled(world: &mut WatchdogWorld) {
    let config = Config {
        dashboard: DashboardConfig {
            enabled: false,
            ..DashboardConfig::default()
        },
        ..Config::default()
    };
    let watchdog = WatchdogBuilder::new(config)
        .with_http_client(Arc::clone(&world.http) as Arc<dyn HttpClient>)
        .with_clock(Arc::clone(&world.clock) as Arc<dyn Clock>)
        .with_store(Arc::new(world.store.clone()) as Arc<dyn SnapshotStore>)
        .with_cancellation_token(world.cancel.clone())
        .build()
        .await
        .expect("watchdog should build");

    world.engine = Some(watchdog.engine().clone());
    world.dashboard = Some(watchdog.dashboard_router());
}

#[when(expr = "the dashboard receives {word} {string}")]
async fn dashboard_receives(world: &mut WatchdogWorld, method: String, uri: String) {
    let router = world.dashboard.clone().expect("watchdog not assembled");
    let response = router
        .oneshot(
            Request::builder()
                .method(method.as_str())
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status().as_u16();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    world.response = Some((status, json));
}

#[then(expr = "the dashboard answers {int}")]
fn dashboard_answers(world: &mut WatchdogWorld, status: u16) {
    let (actual, body) = world.response.as_ref().expect("no dashboard request");
    assert_eq!(*actual, status, "{body}");
}

#[then(expr = "the response field {string} is {int}")]
fn response_field_is(world: &mut WatchdogWorld, field: String, value: u64) {
    let (_, body) = world.response.as_ref().expect("no dashboard request");
    assert_eq!(body[field.as_str()], value, "{body}");
}
