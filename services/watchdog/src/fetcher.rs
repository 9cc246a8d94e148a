//! HTTP fetcher with bounded exponential-backoff retry

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RetryConfig;
use crate::io::{HttpClient, HttpRequest};
use crate::model::WatchedEndpoint;
use crate::WatchdogError;

/// Response of the successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status_code: u16,
    pub body: String,
    /// Wall-clock time of the successful attempt only
    pub response_time_ms: u64,
}

/// Retry schedule for transport failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base * multiplier^retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

/// States of a single fetch. `Attempting(n)` is the n-th retry, 0 being the
/// initial attempt.
#[derive(Debug)]
enum FetchState {
    Attempting(u32),
    Succeeded(FetchedResponse),
    Failed(WatchdogError),
}

/// Performs one endpoint's HTTP call. Holds no per-fetch state, so a single
/// instance is shared by every concurrent fetch.
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Fetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            clock,
            policy,
            timeout,
        }
    }

    /// Fetch `endpoint`, retrying transport failures per the policy. Returns
    /// the final error once retries are exhausted, without a trailing delay.
    pub async fn fetch(&self, endpoint: &WatchedEndpoint) -> crate::Result<FetchedResponse> {
        let request = HttpRequest {
            method: endpoint.method.clone(),
            url: endpoint.url.clone(),
            headers: endpoint.headers.clone(),
            body: endpoint.body.clone(),
            timeout: self.timeout,
        };

        let mut state = FetchState::Attempting(0);
        loop {
            state = match state {
                FetchState::Attempting(retry) => match self.attempt(&request).await {
                    Ok(response) => FetchState::Succeeded(response),
                    Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                        let delay = self.policy.delay_for(retry);
                        tracing::warn!(
                            "Fetching '{}' failed ({}), retry {}/{} in {}ms",
                            endpoint.name,
                            e,
                            retry + 1,
                            self.policy.max_retries,
                            delay.as_millis()
                        );
                        self.clock.sleep(delay).await;
                        FetchState::Attempting(retry + 1)
                    }
                    Err(e) => FetchState::Failed(e),
                },
                FetchState::Succeeded(response) => return Ok(response),
                FetchState::Failed(e) => return Err(e),
            };
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> crate::Result<FetchedResponse> {
        let started = tokio::time::Instant::now();
        let response = self.http.send(request).await?;
        let response_time_ms = started.elapsed().as_millis() as u64;
        Ok(FetchedResponse {
            status_code: response.status,
            body: response.body,
            response_time_ms,
        })
    }
}
