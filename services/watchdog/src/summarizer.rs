//! Pluggable change summarizers

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SummarizerConfig;
use crate::differ::structural_summary;
use crate::io::{HttpClient, HttpRequest};
use crate::WatchdogError;

/// Describes the meaningful differences between two response bodies
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Summarizer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    async fn summarize(&self, old: &str, new: &str) -> crate::Result<String>;
}

/// Deterministic JSON structural diff; never fails
#[derive(Debug, Clone)]
pub struct StructuralSummarizer {
    numeric_drift_tolerance: f64,
}

impl StructuralSummarizer {
    pub fn new(numeric_drift_tolerance: f64) -> Self {
        Self {
            numeric_drift_tolerance,
        }
    }
}

#[async_trait]
impl Summarizer for StructuralSummarizer {
    fn name(&self) -> &'static str {
        "structural"
    }

    async fn summarize(&self, old: &str, new: &str) -> crate::Result<String> {
        Ok(structural_summary(old, new, self.numeric_drift_tolerance))
    }
}

fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

/// Prompt asking for structural, key, type and major-value changes only
pub fn build_prompt(old: &str, new: &str) -> String {
    format!(
        "Compare these two API responses and describe only meaningful changes \
         (structure, key names, types, major values). Ignore minor numerical changes. \
         If nothing meaningful changed, answer exactly \"No significant changes.\"\n\n\
         OLD:\n{}\n\nNEW:\n{}\n\n\
         Respond with a plain-language summary of the changes.",
        pretty(old),
        pretty(new)
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completion summarizer
pub struct ChatSummarizer {
    completions_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for ChatSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSummarizer")
            .field("completions_url", &self.completions_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatSummarizer {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let completions_url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        tracing::debug!(
            "Created ChatSummarizer for model '{}' at {}",
            model,
            completions_url
        );
        Self {
            completions_url,
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
            http,
        }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn summarize(&self, old: &str, new: &str) -> crate::Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_prompt(old, new)}],
        });

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );

        let request = HttpRequest {
            method: "POST".to_string(),
            url: self.completions_url.clone(),
            headers,
            body: Some(payload.to_string()),
            timeout: self.timeout,
        };

        let response = self
            .http
            .send(&request)
            .await
            .map_err(|e| WatchdogError::Summarizer(e.to_string()))?;

        if response.status != 200 {
            return Err(WatchdogError::Summarizer(format!(
                "Chat API returned status {}: {}",
                response.status, response.body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&response.body)
            .map_err(|e| WatchdogError::Summarizer(format!("Unexpected chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WatchdogError::Summarizer("Chat response had no content".to_string()))
    }
}

/// Build the summarizer selected by configuration
pub fn from_config(
    config: &SummarizerConfig,
    numeric_drift_tolerance: f64,
    http: Arc<dyn HttpClient>,
) -> crate::Result<Arc<dyn Summarizer>> {
    match config {
        SummarizerConfig::Structural => {
            Ok(Arc::new(StructuralSummarizer::new(numeric_drift_tolerance)))
        }
        SummarizerConfig::Chat {
            base_url,
            model,
            api_key,
            timeout_ms,
            ..
        } => {
            let api_key = api_key.as_deref().ok_or_else(|| {
                WatchdogError::Config(
                    "Chat summarizer has no API key; call resolve_secrets first".to_string(),
                )
            })?;
            Ok(Arc::new(ChatSummarizer::new(
                base_url,
                model,
                api_key,
                Duration::from_millis(*timeout_ms),
                http,
            )))
        }
    }
}
