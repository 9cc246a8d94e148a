//! Configuration types for the watchdog service

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::WatchedEndpoint;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Endpoints registered into the store at start-up
    #[serde(default)]
    pub endpoints: Vec<WatchedEndpoint>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub differ: DifferConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Poll cycle scheduling and fetch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            timeout_ms: default_timeout_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for transport failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferConfig {
    /// Relative numeric change at or below which a value change is ignored
    #[serde(default = "default_numeric_drift_tolerance")]
    pub numeric_drift_tolerance: f64,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            numeric_drift_tolerance: default_numeric_drift_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Summaries containing any of these (case-insensitive) never alert
    #[serde(default = "default_noop_phrases")]
    pub noop_phrases: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            noop_phrases: default_noop_phrases(),
        }
    }
}

/// Change summarizer with tagged enum for extensibility
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SummarizerConfig {
    #[default]
    #[serde(rename = "structural")]
    Structural,
    #[serde(rename = "chat")]
    Chat {
        #[serde(default = "default_chat_base_url")]
        base_url: String,
        #[serde(default = "default_chat_model")]
        model: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_chat_timeout_ms")]
        timeout_ms: u64,
    },
}

/// Snapshot store backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[default]
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "sqlite")]
    Sqlite { path: PathBuf },
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    /// Snapshots returned by the history endpoint when no limit is given
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    8000
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> u32 {
    2
}

fn default_numeric_drift_tolerance() -> f64 {
    0.1
}

pub fn default_noop_phrases() -> Vec<String> {
    [
        "no major changes",
        "no changes",
        "no significant changes",
        "first snapshot – no previous version.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_chat_timeout_ms() -> u64 {
    20000
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

fn default_history_limit() -> usize {
    50
}

impl Config {
    /// Reject configurations the poller cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.poller.interval_seconds == 0 {
            return Err(crate::WatchdogError::Config(
                "poller.interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.poller.timeout_ms == 0 {
            return Err(crate::WatchdogError::Config(
                "poller.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.poller.max_concurrent_fetches == 0 {
            return Err(crate::WatchdogError::Config(
                "poller.max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }
        if self.poller.retry.multiplier == 0 {
            return Err(crate::WatchdogError::Config(
                "poller.retry.multiplier must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.differ.numeric_drift_tolerance) {
            return Err(crate::WatchdogError::Config(format!(
                "differ.numeric_drift_tolerance must be in [0, 1), got {}",
                self.differ.numeric_drift_tolerance
            )));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                return Err(crate::WatchdogError::Config(format!(
                    "Duplicate endpoint id '{}'",
                    endpoint.id
                )));
            }
            reqwest::Url::parse(&endpoint.url).map_err(|e| {
                crate::WatchdogError::Config(format!(
                    "Endpoint '{}' has invalid url {:?}: {}",
                    endpoint.id, endpoint.url, e
                ))
            })?;
        }
        Ok(())
    }

    /// Fill secrets that are referenced through environment variables
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        if let SummarizerConfig::Chat {
            api_key,
            api_key_env,
            ..
        } = &mut self.summarizer
        {
            if api_key.is_none() {
                let value = std::env::var(api_key_env.as_str()).map_err(|_| {
                    crate::WatchdogError::Config(format!(
                        "Chat summarizer needs an API key; environment variable {} is not set",
                        api_key_env
                    ))
                })?;
                *api_key = Some(value);
            }
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::WatchdogError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
