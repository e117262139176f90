use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Liveness only: the process is up and answering HTTP. Never reflects
/// downstream health — that's what `/readyz` and `/status` are for.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: 200 once the startup sequence has completed at least once,
/// 503 before that (config error, waiting on C8, driver mapping, hydration).
/// Never flips back to not-ready after a post-startup failure — see
/// [`syncd_orchestrator::OpsStatus`].
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.orchestrator.ops_status().is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[derive(Serialize)]
struct FailureView {
    at: chrono::DateTime<chrono::Utc>,
    title: String,
    detail: String,
}

#[derive(Serialize)]
struct StatusView {
    ready: bool,
    counts_by_status: HashMap<String, u64>,
    reconciler_last_tick: Option<chrono::DateTime<chrono::Utc>>,
    push_channel_state: String,
    last_failure: Option<FailureView>,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    let orchestrator = &state.orchestrator;

    let counts_by_status = syncd_orchestrator::status_counts(orchestrator.store().as_ref())
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();

    let last_failure = orchestrator.ops_status().last_failure().await.map(|f| FailureView {
        at: f.at,
        title: f.title,
        detail: f.detail,
    });

    Json(StatusView {
        ready: orchestrator.ops_status().is_ready(),
        counts_by_status,
        reconciler_last_tick: orchestrator.reconciler().last_tick().await,
        push_channel_state: orchestrator.push_channel().state().to_string(),
        last_failure,
    })
}
