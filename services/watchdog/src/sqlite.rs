//! SQLite-backed snapshot store

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{NewSnapshot, Snapshot, WatchedEndpoint};
use crate::store::{next_created_at, SnapshotStore};
use crate::WatchdogError;

const DB_SCHEMA_VERSION: i64 = 1;

const SNAPSHOT_COLUMNS: &str = "id, endpoint_id, response_body, previous_response_body, \
     change_summary, status_code, status_transition, response_time_ms, created_at";

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version < 1 {
        apply_migration_1(conn)?;
        conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)?;
    }
    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS watched_endpoints (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'GET',
            headers_json TEXT NOT NULL DEFAULT '{}',
            body TEXT,
            owner TEXT
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint_id TEXT NOT NULL,
            response_body TEXT NOT NULL,
            previous_response_body TEXT,
            change_summary TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            status_transition TEXT,
            response_time_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_endpoint_created
            ON snapshots (endpoint_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS dismissed_alerts (
            endpoint_id TEXT NOT NULL,
            dismissed_snapshot_timestamp INTEGER NOT NULL,
            PRIMARY KEY (endpoint_id, dismissed_snapshot_timestamp)
        );
        ",
    )
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get::<_, i64>(0)? as u64,
        endpoint_id: row.get(1)?,
        response_body: row.get(2)?,
        previous_response_body: row.get(3)?,
        change_summary: row.get(4)?,
        status_code: row.get::<_, i64>(5)? as u16,
        status_transition: row.get(6)?,
        response_time_ms: row.get::<_, i64>(7)? as u64,
        created_at_epoch_ms: row.get::<_, i64>(8)? as u64,
    })
}

fn row_to_endpoint(row: &Row<'_>) -> rusqlite::Result<(WatchedEndpoint, String)> {
    let headers_json: String = row.get(4)?;
    Ok((
        WatchedEndpoint {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            method: row.get(3)?,
            headers: BTreeMap::new(),
            body: row.get(5)?,
            owner: row.get(6)?,
        },
        headers_json,
    ))
}

fn with_headers(
    (mut endpoint, headers_json): (WatchedEndpoint, String),
) -> crate::Result<WatchedEndpoint> {
    endpoint.headers = serde_json::from_str(&headers_json)?;
    Ok(endpoint)
}

/// Snapshot store persisted in a single SQLite database. Every operation runs
/// under one connection lock; appends run inside a transaction.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> crate::Result<Self> {
        tracing::debug!("Opening snapshot database {:?}", path);
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> crate::Result<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Mutex<Connection>) -> crate::Result<MutexGuard<'_, Connection>> {
        conn.lock()
            .map_err(|_| WatchdogError::Persistence("database lock poisoned".to_string()))
    }

    /// Run a database operation on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> crate::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = Self::lock(&conn)?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| WatchdogError::Persistence(format!("database task failed: {}", e)))?
    }

    /// Register or replace an endpoint (registration side, not the poller)
    pub fn register_endpoint(&self, endpoint: &WatchedEndpoint) -> crate::Result<()> {
        let headers_json = serde_json::to_string(&endpoint.headers)?;
        let conn = Self::lock(&self.conn)?;
        conn.execute(
            "INSERT INTO watched_endpoints (id, name, url, method, headers_json, body, owner)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                method = excluded.method,
                headers_json = excluded.headers_json,
                body = excluded.body,
                owner = excluded.owner",
            params![
                endpoint.id,
                endpoint.name,
                endpoint.url,
                endpoint.method,
                headers_json,
                endpoint.body,
                endpoint.owner
            ],
        )?;
        Ok(())
    }

    fn query_snapshots(
        conn: &Connection,
        endpoint_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE endpoint_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![endpoint_id, limit as i64], row_to_snapshot)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn list_watched_endpoints(&self) -> crate::Result<Vec<WatchedEndpoint>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, url, method, headers_json, body, owner
                 FROM watched_endpoints ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], row_to_endpoint)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(with_headers).collect()
        })
        .await
    }

    async fn get_endpoint(&self, endpoint_id: &str) -> crate::Result<Option<WatchedEndpoint>> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, url, method, headers_json, body, owner
                     FROM watched_endpoints WHERE id = ?1",
                    params![endpoint_id],
                    row_to_endpoint,
                )
                .optional()?;
            row.map(with_headers).transpose()
        })
        .await
    }

    async fn latest_snapshot(&self, endpoint_id: &str) -> crate::Result<Option<Snapshot>> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            Ok(Self::query_snapshots(conn, &endpoint_id, 1)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn latest_two_snapshots(
        &self,
        endpoint_id: &str,
    ) -> crate::Result<(Option<Snapshot>, Option<Snapshot>)> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            let mut rows = Self::query_snapshots(conn, &endpoint_id, 2)?.into_iter();
            Ok((rows.next(), rows.next()))
        })
        .await
    }

    async fn snapshot_history(
        &self,
        endpoint_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<Snapshot>> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| Self::query_snapshots(conn, &endpoint_id, limit))
            .await
    }

    async fn append_snapshot(&self, record: NewSnapshot) -> crate::Result<Snapshot> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let previous: Option<(String, i64)> = tx
                .query_row(
                    "SELECT response_body, created_at FROM snapshots
                     WHERE endpoint_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    params![record.endpoint_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let created_at = next_created_at(
                record.created_at_epoch_ms,
                previous.as_ref().map(|(_, at)| *at as u64),
            );
            let previous_response_body = previous.map(|(body, _)| body);

            tx.execute(
                "INSERT INTO snapshots (endpoint_id, response_body, previous_response_body,
                    change_summary, status_code, status_transition, response_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.endpoint_id,
                    record.response_body,
                    previous_response_body,
                    record.change_summary,
                    record.status_code as i64,
                    record.status_transition,
                    record.response_time_ms as i64,
                    created_at as i64
                ],
            )?;
            let id = tx.last_insert_rowid() as u64;
            tx.commit()?;

            Ok(Snapshot {
                id,
                endpoint_id: record.endpoint_id,
                response_body: record.response_body,
                previous_response_body,
                change_summary: record.change_summary,
                status_code: record.status_code,
                status_transition: record.status_transition,
                response_time_ms: record.response_time_ms,
                created_at_epoch_ms: created_at,
            })
        })
        .await
    }

    async fn dismissed_alerts(&self, endpoint_id: &str) -> crate::Result<HashSet<u64>> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT dismissed_snapshot_timestamp FROM dismissed_alerts WHERE endpoint_id = ?1",
            )?;
            let rows = stmt.query_map(params![endpoint_id], |row| row.get::<_, i64>(0))?;
            let mut dismissed = HashSet::new();
            for row in rows {
                dismissed.insert(row? as u64);
            }
            Ok(dismissed)
        })
        .await
    }

    async fn record_dismissal(&self, endpoint_id: &str, timestamp: u64) -> crate::Result<bool> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO dismissed_alerts (endpoint_id, dismissed_snapshot_timestamp)
                 VALUES (?1, ?2)",
                params![endpoint_id, timestamp as i64],
            )?;
            Ok(inserted > 0)
        })
        .await
    }
}
