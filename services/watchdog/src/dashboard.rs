//! Web dashboard with JSON API endpoints for snapshots and alerts

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::alert::AlertService;
use crate::model::WatchedEndpoint;
use crate::state::StateHandle;
use crate::store::SnapshotStore;
use crate::WatchdogError;

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub state: StateHandle,
    pub store: Arc<dyn SnapshotStore>,
    pub alerts: AlertService,
    pub history_limit: usize,
}

/// Maps domain errors onto HTTP status codes
struct ApiError(WatchdogError);

impl From<WatchdogError> for ApiError {
    fn from(e: WatchdogError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WatchdogError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!("Dashboard request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DismissRequest {
    timestamp_epoch_ms: Option<u64>,
}

/// Public view of a registration. Header values and the request body
/// often carry credentials and are never served.
#[derive(Debug, Serialize)]
struct EndpointView {
    id: String,
    name: String,
    url: String,
    method: String,
    header_names: Vec<String>,
    has_body: bool,
    owner: Option<String>,
}

impl From<WatchedEndpoint> for EndpointView {
    fn from(endpoint: WatchedEndpoint) -> Self {
        Self {
            id: endpoint.id,
            name: endpoint.name,
            url: endpoint.url,
            method: endpoint.method,
            header_names: endpoint.headers.into_keys().collect(),
            has_body: endpoint.body.is_some(),
            owner: endpoint.owner,
        }
    }
}

/// Escape text for an HTML element or attribute
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build the dashboard axum router
pub fn build_router(dashboard_state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/endpoints", get(endpoints_handler))
        .route("/api/endpoints/{id}/snapshots", get(snapshots_handler))
        .route("/api/endpoints/{id}/alert", get(alert_handler))
        .route("/api/endpoints/{id}/dismiss", post(dismiss_handler))
        .route("/api/alerts", get(alerts_handler))
        .layer(CorsLayer::permissive())
        .with_state(dashboard_state)
}

async fn index_handler(State(dashboard): State<DashboardState>) -> ApiResult<Html<String>> {
    let alerts = dashboard.alerts.alerts(None).await?;

    let rows: String = alerts
        .iter()
        .map(|a| {
            let (label, color, bg) = if a.status.is_active() {
                ("Changed", "#721c24", "#f8d7da")
            } else {
                ("Quiet", "#155724", "#d4edda")
            };
            format!(
                r#"<tr style="border-bottom: 1px solid #dee2e6;">
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">
                        <span style="display: inline-block; padding: 0.25em 0.6em; border-radius: 0.25rem; font-size: 0.85em; font-weight: 600; color: {}; background-color: {};">{}</span>
                    </td>
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                </tr>"#,
                escape_html(&a.endpoint_name),
                color,
                bg,
                label,
                escape_html(a.status_transition.as_deref().unwrap_or("")),
                escape_html(a.change_summary.as_deref().unwrap_or("Pending"))
            )
        })
        .collect();

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Watchdog Dashboard</title>
    <script>setTimeout(() => location.reload(), 30000);</script>
</head>
<body style="font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1rem;">
    <h1>Watchdog Dashboard</h1>
    <table style="width: 100%; border-collapse: collapse;">
        <thead>
            <tr style="border-bottom: 2px solid #dee2e6;">
                <th style="padding: 0.5rem; text-align: left;">Endpoint</th>
                <th style="padding: 0.5rem; text-align: left;">Alert</th>
                <th style="padding: 0.5rem; text-align: left;">Status</th>
                <th style="padding: 0.5rem; text-align: left;">Latest Change</th>
            </tr>
        </thead>
        <tbody>{rows}</tbody>
    </table>
</body>
</html>"#
    )))
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn status_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    Json(serde_json::json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "cycles_completed": state.cycles_completed,
        "last_cycle": state.last_cycle,
        "endpoints": state.endpoints,
    }))
}

async fn endpoints_handler(
    State(dashboard): State<DashboardState>,
) -> ApiResult<impl IntoResponse> {
    let endpoints: Vec<EndpointView> = dashboard
        .store
        .list_watched_endpoints()
        .await?
        .into_iter()
        .map(EndpointView::from)
        .collect();
    Ok(Json(endpoints))
}

async fn snapshots_handler(
    State(dashboard): State<DashboardState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    if dashboard.store.get_endpoint(&id).await?.is_none() {
        return Err(WatchdogError::NotFound(format!("endpoint '{}'", id)).into());
    }
    let limit = query
        .limit
        .unwrap_or(dashboard.history_limit)
        .min(dashboard.history_limit);
    Ok(Json(dashboard.store.snapshot_history(&id, limit).await?))
}

async fn alert_handler(
    State(dashboard): State<DashboardState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let endpoint = dashboard
        .store
        .get_endpoint(&id)
        .await?
        .ok_or_else(|| WatchdogError::NotFound(format!("endpoint '{}'", id)))?;
    Ok(Json(dashboard.alerts.endpoint_alert(&endpoint).await?))
}

async fn alerts_handler(
    State(dashboard): State<DashboardState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<impl IntoResponse> {
    let alerts = dashboard.alerts.alerts(query.owner.as_deref()).await?;
    let active_count = alerts.iter().filter(|a| a.status.is_active()).count();
    Ok(Json(serde_json::json!({
        "active_count": active_count,
        "alerts": alerts,
    })))
}

async fn dismiss_handler(
    State(dashboard): State<DashboardState>,
    Path(id): Path<String>,
    request: Option<Json<DismissRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let outcome = dashboard
        .alerts
        .dismiss(&id, request.timestamp_epoch_ms)
        .await?;
    Ok(Json(outcome))
}
