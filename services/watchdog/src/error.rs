//! Error types for the watchdog service

/// Errors that can occur in the watchdog service
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connect, DNS, timeout or body-read failure. The only retryable kind.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Summarizer error: {0}")]
    Summarizer(String),

    #[error("Dashboard error: {0}")]
    Dashboard(String),
}

impl WatchdogError {
    /// Whether the fetcher may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, WatchdogError::Transport(_))
    }
}

impl From<rusqlite::Error> for WatchdogError {
    fn from(e: rusqlite::Error) -> Self {
        WatchdogError::Persistence(e.to_string())
    }
}

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;
