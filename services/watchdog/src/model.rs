//! Records shared between the poller, the stores and the dashboard

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An HTTP endpoint registered for polling. Read-only to the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEndpoint {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl WatchedEndpoint {
    /// A GET endpoint with no headers, body or owner
    pub fn get(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            owner: None,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// Immutable record of one endpoint's fetch outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    pub endpoint_id: String,
    pub response_body: String,
    pub previous_response_body: Option<String>,
    pub change_summary: String,
    pub status_code: u16,
    pub status_transition: Option<String>,
    pub response_time_ms: u64,
    pub created_at_epoch_ms: u64,
}

/// Write-side snapshot record. The store assigns the id and derives the
/// previous body from its own log when appending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub endpoint_id: String,
    pub response_body: String,
    pub change_summary: String,
    pub status_code: u16,
    pub status_transition: Option<String>,
    pub response_time_ms: u64,
    pub created_at_epoch_ms: u64,
}

/// Acknowledgment suppressing the alert for one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DismissedAlert {
    pub endpoint_id: String,
    pub dismissed_snapshot_timestamp: u64,
}
