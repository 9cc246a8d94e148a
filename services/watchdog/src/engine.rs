//! Engine: schedules poll cycles and runs fetch → diff → persist per endpoint

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::differ::Differ;
use crate::fetcher::Fetcher;
use crate::model::{NewSnapshot, Snapshot, WatchedEndpoint};
use crate::state::{CycleReport, StateHandle};
use crate::store::SnapshotStore;

/// Consecutive failures at which an endpoint is reported as degraded
const FAILURE_STREAK_WARNING: u32 = 5;

/// What happened to one endpoint during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    Persisted(Snapshot),
    FetchFailed(String),
    PersistFailed(String),
    /// A previous cycle still owns this endpoint
    SkippedBusy,
    /// Shutdown arrived before the fetch completed
    Cancelled,
}

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Exclusive right to work on one endpoint; released on drop
struct InFlightClaim {
    set: InFlightSet,
    endpoint_id: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.endpoint_id);
    }
}

/// The engine orchestrates poll cycles over every registered endpoint
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<Fetcher>,
    differ: Arc<Differ>,
    clock: Arc<dyn Clock>,
    state: StateHandle,
    in_flight: InFlightSet,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("fetcher", &self.fetcher)
            .field("differ", &self.differ)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        fetcher: Arc<Fetcher>,
        differ: Arc<Differ>,
        clock: Arc<dyn Clock>,
        state: StateHandle,
        max_concurrent_fetches: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            fetcher,
            differ,
            clock,
            state,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            workers: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            cancel,
        }
    }

    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    /// Fire a cycle now and then every `interval` until cancelled. A slow
    /// cycle does not delay the next one; endpoints it still holds are
    /// skipped by the newer cycle. Waits for running cycles before returning.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Scheduler cancelled");
                    break;
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    log_cycle_join(joined);
                }
                _ = ticker.tick() => {
                    let engine = self.clone();
                    cycles.spawn(async move { engine.run_cycle().await });
                }
            }
        }

        while let Some(joined) = cycles.join_next().await {
            log_cycle_join(joined);
        }
    }

    /// One pass over all registered endpoints. Never fails; per-endpoint
    /// errors are logged and counted.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport {
            started_epoch_ms: self.clock.now_epoch_ms(),
            ..CycleReport::default()
        };

        let endpoints = match self.store.list_watched_endpoints().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!("Failed to list watched endpoints: {}", e);
                self.state.write().await.record_cycle(report.clone());
                return report;
            }
        };
        report.endpoints = endpoints.len();
        tracing::info!("Polling {} watched endpoint(s)", endpoints.len());

        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let engine = self.clone();
            tasks.spawn(async move { engine.process_endpoint(endpoint).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(EndpointOutcome::Persisted(_)) => report.persisted += 1,
                Ok(EndpointOutcome::FetchFailed(_)) => report.fetch_failed += 1,
                Ok(EndpointOutcome::PersistFailed(_)) => report.persist_failed += 1,
                Ok(EndpointOutcome::SkippedBusy) => report.skipped_busy += 1,
                Ok(EndpointOutcome::Cancelled) => report.cancelled += 1,
                Err(e) => {
                    tracing::error!("Endpoint task aborted: {}", e);
                    report.panicked += 1;
                }
            }
        }

        tracing::info!(
            "Poll cycle done: {} persisted, {} fetch failures, {} persistence failures, {} busy, {} cancelled",
            report.persisted,
            report.fetch_failed,
            report.persist_failed,
            report.skipped_busy,
            report.cancelled
        );
        self.state.write().await.record_cycle(report.clone());
        report
    }

    /// Fetch, diff and persist a single endpoint
    pub async fn process_endpoint(&self, endpoint: WatchedEndpoint) -> EndpointOutcome {
        let Some(_claim) = self.claim(&endpoint.id) else {
            tracing::warn!(
                "Skipping '{}': previous cycle is still processing it",
                endpoint.name
            );
            return EndpointOutcome::SkippedBusy;
        };

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return EndpointOutcome::Cancelled,
            permit = self.workers.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return EndpointOutcome::Cancelled,
            },
        };

        tracing::debug!("Checking '{}' ({})", endpoint.name, endpoint.url);
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::info!("Shutdown: abandoning fetch of '{}'", endpoint.name);
                return EndpointOutcome::Cancelled;
            }
            result = self.fetcher.fetch(&endpoint) => result,
        };

        // From here on the endpoint runs to completion; the append is atomic.
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Error fetching '{}' ({}): {}", endpoint.name, endpoint.url, e);
                self.record_failure(&endpoint, &e.to_string()).await;
                return EndpointOutcome::FetchFailed(e.to_string());
            }
        };

        let prior = match self.store.latest_snapshot(&endpoint.id).await {
            Ok(prior) => prior,
            Err(e) => {
                tracing::error!("Failed to load last snapshot of '{}': {}", endpoint.name, e);
                self.record_failure(&endpoint, &e.to_string()).await;
                return EndpointOutcome::PersistFailed(e.to_string());
            }
        };

        let diff = self
            .differ
            .diff(&fetched.body, fetched.status_code, prior.as_ref())
            .await;

        let record = NewSnapshot {
            endpoint_id: endpoint.id.clone(),
            response_body: fetched.body,
            change_summary: diff.change_summary,
            status_code: fetched.status_code,
            status_transition: diff.status_transition,
            response_time_ms: fetched.response_time_ms,
            created_at_epoch_ms: self.clock.now_epoch_ms(),
        };

        match self.store.append_snapshot(record).await {
            Ok(snapshot) => {
                tracing::info!(
                    "Saved snapshot {} for '{}' (status {}, {}ms{})",
                    snapshot.id,
                    endpoint.name,
                    snapshot.status_code,
                    snapshot.response_time_ms,
                    snapshot
                        .status_transition
                        .as_ref()
                        .map(|t| format!(", {}", t))
                        .unwrap_or_default()
                );
                self.state.write().await.record_success(
                    &endpoint.id,
                    &endpoint.name,
                    snapshot.status_code,
                    snapshot.response_time_ms,
                    snapshot.created_at_epoch_ms,
                );
                EndpointOutcome::Persisted(snapshot)
            }
            Err(e) => {
                tracing::error!("Failed to insert snapshot for '{}': {}", endpoint.name, e);
                self.record_failure(&endpoint, &e.to_string()).await;
                EndpointOutcome::PersistFailed(e.to_string())
            }
        }
    }

    fn claim(&self, endpoint_id: &str) -> Option<InFlightClaim> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(endpoint_id.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            set: Arc::clone(&self.in_flight),
            endpoint_id: endpoint_id.to_string(),
        })
    }

    async fn record_failure(&self, endpoint: &WatchedEndpoint, error: &str) {
        let now_ms = self.clock.now_epoch_ms();
        let streak =
            self.state
                .write()
                .await
                .record_failure(&endpoint.id, &endpoint.name, error, now_ms);
        if streak == FAILURE_STREAK_WARNING {
            tracing::warn!(
                "Endpoint '{}' has failed {} cycles in a row",
                endpoint.name,
                streak
            );
        }
    }
}

fn log_cycle_join(joined: Result<CycleReport, JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Poll cycle task aborted: {}", e);
    }
}
