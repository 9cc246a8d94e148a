//! BDD test world for the watchdog service

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cucumber::World;
use tokio_util::sync::CancellationToken;

use watchdog::alert::{AlertService, DismissOutcome, NoopPhrases};
use watchdog::clock::Clock;
use watchdog::differ::Differ;
use watchdog::engine::Engine;
use watchdog::fetcher::{FetchedResponse, Fetcher, RetryPolicy};
use watchdog::io::{HttpClient, HttpRequest, HttpResponse};
use watchdog::model::WatchedEndpoint;
use watchdog::state::{new_state_handle, CycleReport};
use watchdog::store::{MemoryStore, SnapshotStore};
use watchdog::summarizer::StructuralSummarizer;
use watchdog::WatchdogError;

// --- Test doubles ---

/// One scripted answer for an endpoint
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, String),
    Refuse,
}

/// Answers requests from per-URL scripts. The last reply of a script
/// repeats once the earlier ones are used up.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: &HttpRequest) -> watchdog::Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Respond(status, body)) => Ok(HttpResponse { status, body }),
            Some(Reply::Refuse) => Err(WatchdogError::Transport(format!(
                "{} {}: connection refused",
                request.method, request.url
            ))),
            None => Err(WatchdogError::Transport(format!(
                "no scripted reply for {}",
                request.url
            ))),
        }
    }
}

/// Advances one second per reading and records requested sleeps
#[derive(Debug, Default)]
pub struct RecordingClock {
    now: AtomicU64,
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait::async_trait]
impl Clock for RecordingClock {
    fn now_epoch_ms(&self) -> u64 {
        self.now.fetch_add(1000, Ordering::SeqCst) + 1000
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn endpoint_url(name: &str) -> String {
    format!("http://api.test/{name}")
}

// --- World ---

#[derive(Debug, Default, World)]
pub struct WatchdogWorld {
    pub http: Arc<ScriptedHttpClient>,
    pub clock: Arc<RecordingClock>,
    pub store: MemoryStore,
    pub cancel: CancellationToken,
    pub engine: Option<Engine>,

    // Fetch testing
    pub fetch_result: Option<watchdog::Result<FetchedResponse>>,

    // Cycle testing
    pub last_report: Option<CycleReport>,

    // Alert testing
    pub dismiss_outcomes: Vec<DismissOutcome>,

    // Dashboard testing
    pub dashboard: Option<axum::Router>,
    pub response: Option<(u16, serde_json::Value)>,
}

impl WatchdogWorld {
    pub async fn register(&self, name: &str) {
        if self.store.get_endpoint(name).await.unwrap().is_none() {
            self.store
                .register_endpoint(WatchedEndpoint::get(name, name, &endpoint_url(name)))
                .await;
        }
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            Arc::clone(&self.http) as Arc<dyn HttpClient>,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
            RetryPolicy::default(),
            Duration::from_millis(8000),
        )
    }

    pub fn engine(&mut self) -> Engine {
        if self.engine.is_none() {
            let differ = Differ::new(
                Arc::new(StructuralSummarizer::new(0.1)),
                0.1,
                NoopPhrases::default(),
            );
            self.engine = Some(Engine::new(
                Arc::new(self.store.clone()),
                Arc::new(self.fetcher()),
                Arc::new(differ),
                Arc::clone(&self.clock) as Arc<dyn Clock>,
                new_state_handle(),
                8,
                self.cancel.clone(),
            ));
        }
        self.engine.clone().unwrap()
    }

    pub fn alerts(&self) -> AlertService {
        AlertService::new(Arc::new(self.store.clone()), NoopPhrases::default())
    }
}
