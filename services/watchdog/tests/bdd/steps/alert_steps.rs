//! BDD step definitions for the alert classification feature

use cucumber::{given, then, when};

use watchdog::alert::EndpointAlert;
use watchdog::model::{NewSnapshot, WatchedEndpoint};
use watchdog::store::SnapshotStore;

use crate::world::{endpoint_url, WatchdogWorld};

async fn append(
    world: &WatchdogWorld,
    name: &str,
    at: u64,
    summary: &str,
    transition: Option<&str>,
) {
    world
        .store
        .append_snapshot(NewSnapshot {
            endpoint_id: name.to_string(),
            response_body: "{}".to_string(),
            change_summary: summary.to_string(),
            status_code: 200,
            status_transition: transition.map(str::to_string),
            response_time_ms: 10,
            created_at_epoch_ms: at,
        })
        .await
        .unwrap();
}

async fn current_alert(world: &WatchdogWorld, name: &str) -> EndpointAlert {
    let endpoint = world
        .store
        .get_endpoint(name)
        .await
        .unwrap()
        .expect("endpoint should be registered");
    world.alerts().endpoint_alert(&endpoint).await.unwrap()
}

// --- Given steps ---

#[given(expr = "a registered endpoint {string}")]
async fn registered_endpoint(world: &mut WatchdogWorld, name: String) {
    world.register(&name).await;
}

#[given(expr = "a registered endpoint {string} owned by {string}")]
async fn registered_owned_endpoint(world: &mut WatchdogWorld, name: String, owner: String) {
    let mut endpoint = WatchedEndpoint::get(&name, &name, &endpoint_url(&name));
    endpoint.owner = Some(owner);
    world.store.register_endpoint(endpoint).await;
}

#[given(expr = "{string} has a snapshot at {int} with summary {string}")]
async fn has_snapshot(world: &mut WatchdogWorld, name: String, at: u64, summary: String) {
    append(world, &name, at, &summary, None).await;
}

#[given(expr = "{string} has a snapshot at {int} with summary {string} and transition {string}")]
async fn has_snapshot_with_transition(
    world: &mut WatchdogWorld,
    name: String,
    at: u64,
    summary: String,
    transition: String,
) {
    append(world, &name, at, &summary, Some(&transition)).await;
}

// --- When steps ---

#[when(expr = "{string} records a snapshot at {int} with summary {string}")]
async fn records_snapshot(world: &mut WatchdogWorld, name: String, at: u64, summary: String) {
    append(world, &name, at, &summary, None).await;
}

#[when(expr = "the alert for {string} at {int} is dismissed")]
async fn dismiss_at(world: &mut WatchdogWorld, name: String, at: u64) {
    let outcome = world.alerts().dismiss(&name, Some(at)).await.unwrap();
    world.dismiss_outcomes.push(outcome);
}

#[when(expr = "the latest alert for {string} is dismissed")]
async fn dismiss_latest(world: &mut WatchdogWorld, name: String) {
    let outcome = world.alerts().dismiss(&name, None).await.unwrap();
    world.dismiss_outcomes.push(outcome);
}

// --- Then steps ---

#[then(expr = "the alert for {string} is active")]
async fn alert_active(world: &mut WatchdogWorld, name: String) {
    let alert = current_alert(world, &name).await;
    assert!(alert.status.is_active(), "{alert:?}");
}

#[then(expr = "the alert for {string} is suppressed as {string}")]
async fn alert_suppressed(world: &mut WatchdogWorld, name: String, reason: String) {
    let alert = current_alert(world, &name).await;
    let status = serde_json::to_value(alert.status).unwrap();
    assert_eq!(status["state"], "suppressed", "{alert:?}");
    assert_eq!(status["reason"], reason.as_str(), "{alert:?}");
}

#[then(expr = "{string} has {int} dismissal record(s)")]
async fn dismissal_records(world: &mut WatchdogWorld, name: String, count: usize) {
    let dismissed = world.store.dismissed_alerts(&name).await.unwrap();
    assert_eq!(dismissed.len(), count);
    assert_eq!(world.store.dismissal_count().await, count);
}

#[then("only the first dismissal was newly recorded")]
fn first_dismissal_new(world: &mut WatchdogWorld) {
    let flags: Vec<bool> = world
        .dismiss_outcomes
        .iter()
        .map(|o| o.newly_recorded)
        .collect();
    assert_eq!(flags.first(), Some(&true));
    assert!(flags.iter().skip(1).all(|new| !new), "{flags:?}");
}

#[then(expr = "{int} of {int} endpoint(s) owned by {string} are alerting")]
async fn owned_alerting(world: &mut WatchdogWorld, active: usize, total: usize, owner: String) {
    let alerts = world.alerts();
    assert_eq!(alerts.alerts(Some(&owner)).await.unwrap().len(), total);
    assert_eq!(alerts.alert_count(Some(&owner)).await.unwrap(), active);
}
