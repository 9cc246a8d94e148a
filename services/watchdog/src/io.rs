//! HTTP client abstraction for testability

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::WatchdogError;

/// A fully operator-specified outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// HTTP response from a request. Any status code is a valid response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a request. Transport failures map to `WatchdogError::Transport`,
    /// request-construction failures to `WatchdogError::Http`.
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| {
                WatchdogError::Http(format!("Invalid method '{}': {}", request.method, e))
            })?;

        tracing::debug!("{} {}", method, request.url);
        let mut builder = self
            .client
            .request(method.clone(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                WatchdogError::Http(format!("{} {} failed: {}", method, request.url, e))
            } else {
                WatchdogError::Transport(format!("{} {} failed: {}", method, request.url, e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| WatchdogError::Transport(format!("Reading response body: {}", e)))?;

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            method,
            request.url,
            status,
            body.len()
        );
        Ok(HttpResponse { status, body })
    }
}
