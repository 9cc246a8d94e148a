//! Alert classification over persisted snapshots and dismissals

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::differ::{FIRST_SNAPSHOT_SUMMARY, NO_CHANGES, NO_SIGNIFICANT_CHANGES};
use crate::model::{DismissedAlert, Snapshot, WatchedEndpoint};
use crate::store::SnapshotStore;
use crate::WatchdogError;

fn normalize(summary: &str) -> String {
    summary.trim().to_lowercase()
}

/// Canonical phrases marking a summary as "nothing happened"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoopPhrases {
    phrases: Vec<String>,
}

impl NoopPhrases {
    /// Configured phrases plus the differ's own no-op summaries, which are
    /// always recognized whatever language the configured set uses.
    pub fn new(phrases: &[String]) -> Self {
        let mut normalized: Vec<String> = Vec::new();
        let built_in = [FIRST_SNAPSHOT_SUMMARY, NO_SIGNIFICANT_CHANGES, NO_CHANGES];
        for phrase in phrases.iter().map(String::as_str).chain(built_in) {
            let phrase = normalize(phrase);
            if !phrase.is_empty() && !normalized.contains(&phrase) {
                normalized.push(phrase);
            }
        }
        Self {
            phrases: normalized,
        }
    }

    /// True for an empty summary or one containing any phrase, ignoring case
    pub fn matches(&self, summary: &str) -> bool {
        let summary = normalize(summary);
        summary.is_empty() || self.phrases.iter().any(|p| summary.contains(p.as_str()))
    }
}

impl Default for NoopPhrases {
    fn default() -> Self {
        NoopPhrases::new(&crate::config::default_noop_phrases())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    NoSnapshot,
    NoopSummary,
    RepeatedSummary,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Suppressed(SuppressionReason),
}

impl AlertStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AlertStatus::Active)
    }
}

/// Decide whether the latest snapshot warrants an alert. Rules apply in order:
/// no-op summary, repeated summary, dismissed snapshot.
pub fn classify(
    latest: Option<&Snapshot>,
    previous: Option<&Snapshot>,
    dismissed: &HashSet<u64>,
    phrases: &NoopPhrases,
) -> AlertStatus {
    let Some(latest) = latest else {
        return AlertStatus::Suppressed(SuppressionReason::NoSnapshot);
    };

    if phrases.matches(&latest.change_summary) {
        return AlertStatus::Suppressed(SuppressionReason::NoopSummary);
    }

    if let Some(previous) = previous {
        if normalize(&latest.change_summary) == normalize(&previous.change_summary) {
            return AlertStatus::Suppressed(SuppressionReason::RepeatedSummary);
        }
    }

    if dismissed.contains(&latest.created_at_epoch_ms) {
        return AlertStatus::Suppressed(SuppressionReason::Dismissed);
    }

    AlertStatus::Active
}

/// Classifier output for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAlert {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub snapshot_timestamp: Option<u64>,
    pub change_summary: Option<String>,
    pub status_transition: Option<String>,
    pub status: AlertStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissOutcome {
    #[serde(flatten)]
    pub dismissal: DismissedAlert,
    /// False when the same dismissal already existed
    pub newly_recorded: bool,
}

/// Read-side alert queries plus the dismissal action
#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn SnapshotStore>,
    phrases: NoopPhrases,
}

impl std::fmt::Debug for AlertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertService")
            .field("phrases", &self.phrases)
            .finish()
    }
}

impl AlertService {
    pub fn new(store: Arc<dyn SnapshotStore>, phrases: NoopPhrases) -> Self {
        Self { store, phrases }
    }

    pub async fn endpoint_alert(&self, endpoint: &WatchedEndpoint) -> crate::Result<EndpointAlert> {
        let (latest, previous) = self.store.latest_two_snapshots(&endpoint.id).await?;
        let dismissed = self.store.dismissed_alerts(&endpoint.id).await?;
        let status = classify(
            latest.as_ref(),
            previous.as_ref(),
            &dismissed,
            &self.phrases,
        );

        Ok(EndpointAlert {
            endpoint_id: endpoint.id.clone(),
            endpoint_name: endpoint.name.clone(),
            snapshot_timestamp: latest.as_ref().map(|s| s.created_at_epoch_ms),
            change_summary: latest.as_ref().map(|s| s.change_summary.clone()),
            status_transition: latest.and_then(|s| s.status_transition),
            status,
        })
    }

    /// Alerts for every endpoint, or only those owned by `owner`
    pub async fn alerts(&self, owner: Option<&str>) -> crate::Result<Vec<EndpointAlert>> {
        let endpoints = self.store.list_watched_endpoints().await?;
        let mut alerts = Vec::new();
        for endpoint in endpoints
            .iter()
            .filter(|e| owner.is_none() || e.owner.as_deref() == owner)
        {
            alerts.push(self.endpoint_alert(endpoint).await?);
        }
        Ok(alerts)
    }

    /// Number of endpoints currently alerting
    pub async fn alert_count(&self, owner: Option<&str>) -> crate::Result<usize> {
        Ok(self
            .alerts(owner)
            .await?
            .iter()
            .filter(|a| a.status.is_active())
            .count())
    }

    /// Dismiss the alert for one snapshot, the endpoint's latest when
    /// `timestamp` is omitted. Repeat dismissals are no-ops.
    pub async fn dismiss(
        &self,
        endpoint_id: &str,
        timestamp: Option<u64>,
    ) -> crate::Result<DismissOutcome> {
        if self.store.get_endpoint(endpoint_id).await?.is_none() {
            return Err(WatchdogError::NotFound(format!(
                "endpoint '{}'",
                endpoint_id
            )));
        }

        let timestamp = match timestamp {
            Some(ts) => ts,
            None => self
                .store
                .latest_snapshot(endpoint_id)
                .await?
                .map(|s| s.created_at_epoch_ms)
                .ok_or_else(|| {
                    WatchdogError::NotFound(format!("snapshot for endpoint '{}'", endpoint_id))
                })?,
        };

        let newly_recorded = self.store.record_dismissal(endpoint_id, timestamp).await?;
        tracing::info!(
            "Dismissed alert for '{}' at snapshot {} (new={})",
            endpoint_id,
            timestamp,
            newly_recorded
        );

        Ok(DismissOutcome {
            dismissal: DismissedAlert {
                endpoint_id: endpoint_id.to_string(),
                dismissed_snapshot_timestamp: timestamp,
            },
            newly_recorded,
        })
    }
}
