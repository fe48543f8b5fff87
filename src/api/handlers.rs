use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::approval::{ApprovalRequest, Decision};
use crate::AppState;

static INDEX_HTML: &str = include_str!("../../static/index.html");

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Serialize)]
pub struct PendingResponse {
    pub requests: Vec<ApprovalRequest>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub id: String,
    pub decision: String, // "allow" | "always" | "deny"
}

#[derive(Serialize)]
pub struct RespondResponse {
    pub ok: bool,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET / — the approval page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api/pending — requests still waiting for a human
///
/// An unreadable queue directory lists as empty; the page keeps polling
/// and the failure is left to the server log.
pub async fn list_pending(State(state): State<Arc<AppState>>) -> Json<PendingResponse> {
    let requests = match state.service.list_pending().await {
        Ok(requests) => requests,
        Err(e) => {
            tracing::error!("list_pending: {}", e);
            Vec::new()
        }
    };
    Json(PendingResponse { requests })
}

/// POST /api/respond — commit a decision for one request
pub async fn respond(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<RespondResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::warn!("respond: rejected body: {}", rejection.body_text());
        AppError::BadRequest(rejection.body_text())
    })?;

    let decision: Decision = payload.decision.parse().map_err(|e| {
        tracing::warn!("respond: {}", e);
        AppError::BadRequest(format!("{e}"))
    })?;

    tracing::info!(id = %payload.id, decision = %decision, "respond");

    state.service.resolve(&payload.id, decision).await?;

    Ok(Json(RespondResponse { ok: true }))
}
