//! Watchdog - HTTP endpoint change monitoring service
//!
//! Polls registered API endpoints, snapshots every response, summarizes what
//! changed since the previous snapshot, and classifies changes into alerts.

pub mod alert;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod differ;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod io;
pub mod model;
pub mod sqlite;
pub mod state;
pub mod store;
pub mod summarizer;

pub use config::{load_config, Config};
pub use error::{Result, WatchdogError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::{AlertService, NoopPhrases};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::dashboard::DashboardState;
use crate::differ::Differ;
use crate::engine::Engine;
use crate::fetcher::{Fetcher, RetryPolicy};
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::sqlite::SqliteStore;
use crate::state::StateHandle;
use crate::store::{MemoryStore, SnapshotStore};
use crate::summarizer::Summarizer;

/// Assembles a [`Watchdog`] from configuration, with optional overrides for
/// the HTTP client, store, clock and summarizer.
pub struct WatchdogBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    store: Option<Arc<dyn SnapshotStore>>,
    clock: Option<Arc<dyn Clock>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    cancel: Option<CancellationToken>,
}

impl WatchdogBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            store: None,
            clock: None,
            summarizer: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Use an existing store. Configured endpoints are not registered into it.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn build(self) -> Result<Watchdog> {
        let config = self.config;
        config.validate()?;

        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cancel = self.cancel.unwrap_or_default();

        let store = match self.store {
            Some(store) => store,
            None => open_store(&config).await?,
        };

        let summarizer = match self.summarizer {
            Some(summarizer) => summarizer,
            None => summarizer::from_config(
                &config.summarizer,
                config.differ.numeric_drift_tolerance,
                Arc::clone(&http),
            )?,
        };
        tracing::debug!("Using '{}' summarizer", summarizer.name());

        let phrases = NoopPhrases::new(&config.alerts.noop_phrases);
        let fetcher = Fetcher::new(
            http,
            Arc::clone(&clock),
            RetryPolicy::from(&config.poller.retry),
            config.poller.timeout(),
        );
        let differ = Differ::new(
            summarizer,
            config.differ.numeric_drift_tolerance,
            phrases.clone(),
        );

        let state = state::new_state_handle();
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::new(fetcher),
            Arc::new(differ),
            clock,
            Arc::clone(&state),
            config.poller.max_concurrent_fetches,
            cancel.clone(),
        );
        let alerts = AlertService::new(Arc::clone(&store), phrases);

        Ok(Watchdog {
            config,
            engine,
            store,
            alerts,
            state,
            cancel,
        })
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    match &config.store {
        StoreConfig::Memory => {
            let store = MemoryStore::new();
            for endpoint in &config.endpoints {
                store.register_endpoint(endpoint.clone()).await;
            }
            tracing::info!(
                "Using in-memory store with {} endpoint(s)",
                config.endpoints.len()
            );
            Ok(Arc::new(store))
        }
        StoreConfig::Sqlite { path } => {
            let store = SqliteStore::open(path)?;
            for endpoint in &config.endpoints {
                store.register_endpoint(endpoint)?;
            }
            tracing::info!(
                "Using SQLite store at {:?} with {} configured endpoint(s)",
                path,
                config.endpoints.len()
            );
            Ok(Arc::new(store))
        }
    }
}

/// A fully assembled watchdog service
pub struct Watchdog {
    config: Config,
    engine: Engine,
    store: Arc<dyn SnapshotStore>,
    alerts: AlertService,
    state: StateHandle,
    cancel: CancellationToken,
}

impl Watchdog {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        Arc::clone(&self.store)
    }

    pub fn alerts(&self) -> &AlertService {
        &self.alerts
    }

    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Router over this instance's state, for embedding or tests
    pub fn dashboard_router(&self) -> axum::Router {
        dashboard::build_router(DashboardState {
            state: Arc::clone(&self.state),
            store: Arc::clone(&self.store),
            alerts: self.alerts.clone(),
            history_limit: self.config.dashboard.history_limit,
        })
    }

    /// Run until ctrl-c or cancellation: the poll scheduler plus the
    /// dashboard when enabled.
    pub async fn start(self) -> Result<()> {
        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Shutdown signal received");
                        cancel_for_signal.cancel();
                    }
                    Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
                },
                _ = cancel_for_signal.cancelled() => {}
            }
        });

        let dashboard = if self.config.dashboard.enabled {
            let port = self.config.dashboard.port;
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                WatchdogError::Dashboard(format!("Failed to bind port {}: {}", port, e))
            })?;
            tracing::info!("Dashboard listening on http://{}", addr);

            let router = self.dashboard_router();
            let cancel_for_dashboard = self.cancel.clone();
            Some(tokio::spawn(async move {
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        cancel_for_dashboard.cancelled().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!("Dashboard server failed: {}", e);
                }
                tracing::debug!("Dashboard stopped");
            }))
        } else {
            None
        };

        tracing::info!(
            "Watchdog started, polling every {}s",
            self.config.poller.interval_seconds
        );
        self.engine.run(self.config.poller.interval()).await;

        if let Some(handle) = dashboard {
            if let Err(e) = handle.await {
                tracing::error!("Dashboard task failed: {}", e);
            }
        }
        tracing::info!("Watchdog stopped");
        Ok(())
    }
}
