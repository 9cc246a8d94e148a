//! Snapshot store contract and the in-memory store

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{DismissedAlert, NewSnapshot, Snapshot, WatchedEndpoint};

/// Registry and snapshot log consumed by the poller and the alert service.
///
/// The snapshot log is single-writer per endpoint (the active poll cycle) and
/// multi-reader. `append_snapshot` must be atomic: readers never observe a
/// partially written row.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotStore: Send + Sync {
    async fn list_watched_endpoints(&self) -> crate::Result<Vec<WatchedEndpoint>>;

    async fn get_endpoint(&self, endpoint_id: &str) -> crate::Result<Option<WatchedEndpoint>>;

    async fn latest_snapshot(&self, endpoint_id: &str) -> crate::Result<Option<Snapshot>>;

    /// Most recent snapshot first
    async fn latest_two_snapshots(
        &self,
        endpoint_id: &str,
    ) -> crate::Result<(Option<Snapshot>, Option<Snapshot>)>;

    /// Up to `limit` snapshots ordered by creation time, newest first
    async fn snapshot_history(
        &self,
        endpoint_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<Snapshot>>;

    /// Append a snapshot, filling `previous_response_body` from the log and
    /// bumping `created_at` past the latest row so it stays strictly increasing.
    async fn append_snapshot(&self, record: NewSnapshot) -> crate::Result<Snapshot>;

    async fn dismissed_alerts(&self, endpoint_id: &str) -> crate::Result<HashSet<u64>>;

    /// Record a dismissal. Returns false when the pair was already recorded.
    async fn record_dismissal(&self, endpoint_id: &str, timestamp: u64) -> crate::Result<bool>;
}

/// Timestamp for a new row: never at or before the latest existing one
pub(crate) fn next_created_at(requested: u64, latest: Option<u64>) -> u64 {
    match latest {
        Some(latest) if requested <= latest => latest + 1,
        _ => requested,
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    endpoints: Vec<WatchedEndpoint>,
    /// Per endpoint, oldest first
    snapshots: HashMap<String, Vec<Snapshot>>,
    dismissals: Vec<DismissedAlert>,
    next_snapshot_id: u64,
}

/// Process-local store; the whole log lives behind one lock
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an endpoint (registration side, not the poller)
    pub async fn register_endpoint(&self, endpoint: WatchedEndpoint) {
        let mut inner = self.inner.write().await;
        match inner.endpoints.iter_mut().find(|e| e.id == endpoint.id) {
            Some(existing) => *existing = endpoint,
            None => inner.endpoints.push(endpoint),
        }
    }

    pub async fn dismissal_count(&self) -> usize {
        self.inner.read().await.dismissals.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn list_watched_endpoints(&self) -> crate::Result<Vec<WatchedEndpoint>> {
        Ok(self.inner.read().await.endpoints.clone())
    }

    async fn get_endpoint(&self, endpoint_id: &str) -> crate::Result<Option<WatchedEndpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.endpoints.iter().find(|e| e.id == endpoint_id).cloned())
    }

    async fn latest_snapshot(&self, endpoint_id: &str) -> crate::Result<Option<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(endpoint_id)
            .and_then(|log| log.last())
            .cloned())
    }

    async fn latest_two_snapshots(
        &self,
        endpoint_id: &str,
    ) -> crate::Result<(Option<Snapshot>, Option<Snapshot>)> {
        let inner = self.inner.read().await;
        let mut newest = inner
            .snapshots
            .get(endpoint_id)
            .map(|log| log.iter().rev())
            .into_iter()
            .flatten();
        Ok((newest.next().cloned(), newest.next().cloned()))
    }

    async fn snapshot_history(
        &self,
        endpoint_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(endpoint_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_snapshot(&self, record: NewSnapshot) -> crate::Result<Snapshot> {
        let mut inner = self.inner.write().await;
        inner.next_snapshot_id += 1;
        let id = inner.next_snapshot_id;

        let log = inner.snapshots.entry(record.endpoint_id.clone()).or_default();
        let previous = log.last();
        let snapshot = Snapshot {
            id,
            previous_response_body: previous.map(|s| s.response_body.clone()),
            created_at_epoch_ms: next_created_at(
                record.created_at_epoch_ms,
                previous.map(|s| s.created_at_epoch_ms),
            ),
            endpoint_id: record.endpoint_id,
            response_body: record.response_body,
            change_summary: record.change_summary,
            status_code: record.status_code,
            status_transition: record.status_transition,
            response_time_ms: record.response_time_ms,
        };
        log.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn dismissed_alerts(&self, endpoint_id: &str) -> crate::Result<HashSet<u64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .dismissals
            .iter()
            .filter(|d| d.endpoint_id == endpoint_id)
            .map(|d| d.dismissed_snapshot_timestamp)
            .collect())
    }

    async fn record_dismissal(&self, endpoint_id: &str, timestamp: u64) -> crate::Result<bool> {
        let mut inner = self.inner.write().await;
        let dismissal = DismissedAlert {
            endpoint_id: endpoint_id.to_string(),
            dismissed_snapshot_timestamp: timestamp,
        };
        if inner.dismissals.contains(&dismissal) {
            return Ok(false);
        }
        inner.dismissals.push(dismissal);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_snapshot(endpoint_id: &str, body: &str, status: u16, at: u64) -> NewSnapshot {
        NewSnapshot {
            endpoint_id: endpoint_id.to_string(),
            response_body: body.to_string(),
            change_summary: "summary".to_string(),
            status_code: status,
            status_transition: None,
            response_time_ms: 12,
            created_at_epoch_ms: at,
        }
    }

    #[test]
    fn next_created_at_is_strictly_increasing() {
        assert_eq!(next_created_at(100, None), 100);
        assert_eq!(next_created_at(100, Some(50)), 100);
        assert_eq!(next_created_at(100, Some(100)), 101);
        assert_eq!(next_created_at(100, Some(200)), 201);
    }

    #[tokio::test]
    async fn register_endpoint_replaces_by_id() {
        let store = MemoryStore::new();
        store
            .register_endpoint(WatchedEndpoint::get("a", "A", "http://localhost/a"))
            .await;
        store
            .register_endpoint(WatchedEndpoint::get("a", "A2", "http://localhost/a2"))
            .await;
        let endpoints = store.list_watched_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "A2");
        assert!(store.get_endpoint("a").await.unwrap().is_some());
        assert!(store.get_endpoint("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_derives_previous_body_from_log() {
        let store = MemoryStore::new();
        let first = store
            .append_snapshot(new_snapshot("a", "one", 200, 1000))
            .await
            .unwrap();
        let second = store
            .append_snapshot(new_snapshot("a", "two", 200, 2000))
            .await
            .unwrap();
        let other = store
            .append_snapshot(new_snapshot("b", "three", 200, 3000))
            .await
            .unwrap();

        assert_eq!(first.previous_response_body, None);
        assert_eq!(second.previous_response_body.as_deref(), Some("one"));
        assert_eq!(other.previous_response_body, None);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn append_keeps_created_at_strictly_increasing() {
        let store = MemoryStore::new();
        store
            .append_snapshot(new_snapshot("a", "one", 200, 5000))
            .await
            .unwrap();
        let second = store
            .append_snapshot(new_snapshot("a", "two", 200, 5000))
            .await
            .unwrap();
        assert_eq!(second.created_at_epoch_ms, 5001);
    }

    #[tokio::test]
    async fn latest_two_and_history_are_newest_first() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_two_snapshots("a").await.unwrap(), (None, None));

        for (i, body) in ["one", "two", "three"].iter().enumerate() {
            store
                .append_snapshot(new_snapshot("a", body, 200, 1000 * (i as u64 + 1)))
                .await
                .unwrap();
        }

        let (latest, previous) = store.latest_two_snapshots("a").await.unwrap();
        assert_eq!(latest.unwrap().response_body, "three");
        assert_eq!(previous.unwrap().response_body, "two");
        assert_eq!(
            store.latest_snapshot("a").await.unwrap().unwrap().response_body,
            "three"
        );

        let history = store.snapshot_history("a", 2).await.unwrap();
        let bodies: Vec<&str> = history.iter().map(|s| s.response_body.as_str()).collect();
        assert_eq!(bodies, vec!["three", "two"]);
        assert!(store.snapshot_history("missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_snapshot_has_no_previous() {
        let store = MemoryStore::new();
        store
            .append_snapshot(new_snapshot("a", "one", 200, 1000))
            .await
            .unwrap();
        let (latest, previous) = store.latest_two_snapshots("a").await.unwrap();
        assert!(latest.is_some());
        assert!(previous.is_none());
    }

    #[tokio::test]
    async fn record_dismissal_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.record_dismissal("a", 1000).await.unwrap());
        assert!(!store.record_dismissal("a", 1000).await.unwrap());
        assert!(store.record_dismissal("b", 1000).await.unwrap());

        assert_eq!(store.dismissal_count().await, 2);
        let dismissed = store.dismissed_alerts("a").await.unwrap();
        assert_eq!(dismissed, HashSet::from([1000]));
    }
}
