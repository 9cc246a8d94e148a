//! Shared runtime state: per-endpoint poll status and the last cycle report

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Runtime status of a single endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub endpoint_id: String,
    pub name: String,
    pub last_poll_epoch_ms: u64,
    pub last_status_code: Option<u16>,
    pub last_response_time_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Counts for one completed poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_epoch_ms: u64,
    pub endpoints: usize,
    pub persisted: usize,
    pub fetch_failed: usize,
    pub persist_failed: usize,
    pub skipped_busy: usize,
    pub cancelled: usize,
    /// Endpoint tasks that panicked or were aborted
    pub panicked: usize,
}

/// Shared state accessible by engine and dashboard
#[derive(Debug)]
pub struct SharedState {
    pub endpoints: Vec<EndpointStatus>,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleReport>,
    pub started_at: Instant,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            cycles_completed: 0,
            last_cycle: None,
            started_at: Instant::now(),
        }
    }

    fn status_mut(&mut self, endpoint_id: &str, name: &str) -> &mut EndpointStatus {
        let index = match self
            .endpoints
            .iter()
            .position(|s| s.endpoint_id == endpoint_id)
        {
            Some(index) => index,
            None => {
                self.endpoints.push(EndpointStatus {
                    endpoint_id: endpoint_id.to_string(),
                    name: name.to_string(),
                    ..EndpointStatus::default()
                });
                self.endpoints.len() - 1
            }
        };
        let status = &mut self.endpoints[index];
        status.name = name.to_string();
        status
    }

    /// Record a persisted snapshot
    pub fn record_success(
        &mut self,
        endpoint_id: &str,
        name: &str,
        status_code: u16,
        response_time_ms: u64,
        now_ms: u64,
    ) {
        let status = self.status_mut(endpoint_id, name);
        status.last_poll_epoch_ms = now_ms;
        status.last_status_code = Some(status_code);
        status.last_response_time_ms = Some(response_time_ms);
        status.consecutive_failures = 0;
        status.last_error = None;
    }

    /// Record a fetch or persistence failure, returning the failure streak
    pub fn record_failure(
        &mut self,
        endpoint_id: &str,
        name: &str,
        error: &str,
        now_ms: u64,
    ) -> u32 {
        let status = self.status_mut(endpoint_id, name);
        status.last_poll_epoch_ms = now_ms;
        status.consecutive_failures += 1;
        status.last_error = Some(error.to_string());
        status.consecutive_failures
    }

    pub fn record_cycle(&mut self, report: CycleReport) {
        self.cycles_completed += 1;
        self.last_cycle = Some(report);
    }

    pub fn get_endpoint_status(&self, endpoint_id: &str) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|s| s.endpoint_id == endpoint_id)
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle() -> StateHandle {
    Arc::new(RwLock::new(SharedState::new()))
}
