//! BDD step definitions for poll cycle, transition and end-to-end features

use cucumber::gherkin::Step;
use cucumber::{given, then, when};

use watchdog::model::Snapshot;
use watchdog::store::SnapshotStore;

use crate::world::{endpoint_url, Reply, WatchdogWorld};

async fn latest(world: &WatchdogWorld, name: &str) -> Snapshot {
    world
        .store
        .latest_snapshot(name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no snapshot for {name}"))
}

// --- Given steps ---

#[given(expr = "endpoint {string} answers {int} with body {string}")]
async fn endpoint_answers(world: &mut WatchdogWorld, name: String, status: u16, body: String) {
    world.register(&name).await;
    world
        .http
        .push(&endpoint_url(&name), Reply::Respond(status, body));
}

#[given(expr = "endpoint {string} refuses every connection")]
async fn endpoint_refuses(world: &mut WatchdogWorld, name: String) {
    world.register(&name).await;
    world.http.push(&endpoint_url(&name), Reply::Refuse);
}

#[given(expr = "endpoint {string} answers with statuses {string} and body {string}")]
async fn endpoint_status_sequence(
    world: &mut WatchdogWorld,
    name: String,
    statuses: String,
    body: String,
) {
    world.register(&name).await;
    for status in statuses.split(',') {
        let status: u16 = status.trim().parse().expect("status code");
        world
            .http
            .push(&endpoint_url(&name), Reply::Respond(status, body.clone()));
    }
}

#[given(expr = "endpoint {string} will answer in order:")]
async fn endpoint_answers_in_order(world: &mut WatchdogWorld, name: String, step: &Step) {
    world.register(&name).await;
    let table = step.table.as_ref().expect("a status/body table");
    for row in table.rows.iter().skip(1) {
        let status: u16 = row[0].trim().parse().expect("status code");
        world
            .http
            .push(&endpoint_url(&name), Reply::Respond(status, row[1].clone()));
    }
}

#[given("the watchdog is shutting down")]
fn shutting_down(world: &mut WatchdogWorld) {
    world.cancel.cancel();
}

// --- When steps ---

#[when("a poll cycle runs")]
async fn poll_cycle_runs(world: &mut WatchdogWorld) {
    let engine = world.engine();
    world.last_report = Some(engine.run_cycle().await);
}

#[when(expr = "{int} poll cycles run")]
async fn poll_cycles_run(world: &mut WatchdogWorld, count: usize) {
    let engine = world.engine();
    for _ in 0..count {
        world.last_report = Some(engine.run_cycle().await);
    }
}

// --- Then steps ---

#[then(expr = "the cycle persisted {int} snapshot(s) and recorded {int} fetch failure(s)")]
fn cycle_counts(world: &mut WatchdogWorld, persisted: usize, fetch_failed: usize) {
    let report = world.last_report.as_ref().expect("no cycle ran");
    assert_eq!(report.persisted, persisted, "{report:?}");
    assert_eq!(report.fetch_failed, fetch_failed, "{report:?}");
    assert_eq!(report.persist_failed, 0, "{report:?}");
}

#[then(expr = "the cycle cancelled {int} endpoint(s)")]
fn cycle_cancelled(world: &mut WatchdogWorld, cancelled: usize) {
    let report = world.last_report.as_ref().expect("no cycle ran");
    assert_eq!(report.cancelled, cancelled, "{report:?}");
}

#[then(expr = "{string} has {int} snapshot(s)")]
async fn snapshot_count(world: &mut WatchdogWorld, name: String, count: usize) {
    let history = world.store.snapshot_history(&name, 100).await.unwrap();
    assert_eq!(history.len(), count);
}

#[then(expr = "{string} shows {int} consecutive failure(s)")]
async fn consecutive_failures(world: &mut WatchdogWorld, name: String, failures: u32) {
    let state = world.engine().state();
    let state = state.read().await;
    let status = state
        .get_endpoint_status(&name)
        .unwrap_or_else(|| panic!("no runtime status for {name}"));
    assert_eq!(status.consecutive_failures, failures);
}

#[then(expr = "the status transitions of {string} are {string}")]
async fn status_transitions(world: &mut WatchdogWorld, name: String, expected: String) {
    let mut history = world.store.snapshot_history(&name, 100).await.unwrap();
    history.reverse();
    let actual: Vec<String> = history
        .iter()
        .skip(1)
        .map(|s| s.status_transition.clone().unwrap_or_else(|| "-".to_string()))
        .collect();
    let expected: Vec<String> = expected.split(',').map(|t| t.trim().to_string()).collect();
    assert_eq!(actual, expected);
}

#[then(expr = "the latest summary of {string} is {string}")]
async fn latest_summary_is(world: &mut WatchdogWorld, name: String, summary: String) {
    assert_eq!(latest(world, &name).await.change_summary, summary);
}

#[then(expr = "the latest summary of {string} mentions {string}")]
async fn latest_summary_mentions(world: &mut WatchdogWorld, name: String, fragment: String) {
    let summary = latest(world, &name).await.change_summary;
    assert!(summary.contains(&fragment), "{summary}");
}

#[then(expr = "the latest snapshot of {string} has no status transition")]
async fn no_transition(world: &mut WatchdogWorld, name: String) {
    assert_eq!(latest(world, &name).await.status_transition, None);
}

#[then(expr = "the latest snapshot of {string} has status transition {string}")]
async fn has_transition(world: &mut WatchdogWorld, name: String, transition: String) {
    assert_eq!(
        latest(world, &name).await.status_transition,
        Some(transition)
    );
}

#[then(expr = "the latest snapshot of {string} remembers the previous body {string}")]
async fn remembers_previous_body(world: &mut WatchdogWorld, name: String, body: String) {
    assert_eq!(
        latest(world, &name).await.previous_response_body,
        Some(body)
    );
}
