//! BDD step definitions for the fetch retry feature

use std::time::Duration;

use cucumber::{given, then, when};

use watchdog::store::SnapshotStore;
use watchdog::WatchdogError;

use crate::world::{endpoint_url, Reply, WatchdogWorld};

#[given(expr = "endpoint {string} fails {int} time(s) before answering {int} with body {string}")]
async fn fails_then_answers(
    world: &mut WatchdogWorld,
    name: String,
    failures: u32,
    status: u16,
    body: String,
) {
    world.register(&name).await;
    for _ in 0..failures {
        world.http.push(&endpoint_url(&name), Reply::Refuse);
    }
    world
        .http
        .push(&endpoint_url(&name), Reply::Respond(status, body));
}

#[when(expr = "the fetcher fetches {string}")]
async fn fetcher_fetches(world: &mut WatchdogWorld, name: String) {
    let endpoint = world
        .store
        .get_endpoint(&name)
        .await
        .unwrap()
        .expect("endpoint should be registered");
    world.fetch_result = Some(world.fetcher().fetch(&endpoint).await);
}

#[then(expr = "the fetch succeeds with status {int}")]
fn fetch_succeeds(world: &mut WatchdogWorld, status: u16) {
    match world.fetch_result.as_ref().expect("no fetch ran") {
        Ok(response) => assert_eq!(response.status_code, status),
        Err(e) => panic!("expected success, got {e}"),
    }
}

#[then("the fetch fails with a transport error")]
fn fetch_fails(world: &mut WatchdogWorld) {
    match world.fetch_result.as_ref().expect("no fetch ran") {
        Err(WatchdogError::Transport(_)) => {}
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[then(expr = "the fetcher slept for {int} ms and {int} ms")]
fn slept_for(world: &mut WatchdogWorld, first: u64, second: u64) {
    let sleeps = world.clock.sleeps.lock().unwrap().clone();
    assert_eq!(
        sleeps,
        vec![Duration::from_millis(first), Duration::from_millis(second)]
    );
}

#[then("the fetcher never slept")]
fn never_slept(world: &mut WatchdogWorld) {
    assert!(world.clock.sleeps.lock().unwrap().is_empty());
}

#[then(expr = "{int} request(s) reached {string}")]
fn requests_reached(world: &mut WatchdogWorld, count: usize, name: String) {
    let url = endpoint_url(&name);
    let seen = world
        .http
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.url == url)
        .count();
    assert_eq!(seen, count);
}
