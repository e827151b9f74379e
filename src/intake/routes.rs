//! REST endpoints for driving an intake.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::Error;

use super::model::FieldAddress;
use super::wizard::{IntakeWizard, WizardStatus};

/// Shared state for intake routes.
#[derive(Clone)]
pub struct IntakeRouteState {
    pub wizard: Arc<IntakeWizard>,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    address: FieldAddress,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct InputRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RevisitRequest {
    address: FieldAddress,
}

/// GET /api/intake/status
async fn get_status(State(state): State<IntakeRouteState>) -> impl IntoResponse {
    Json(state.wizard.status().await)
}

/// POST /api/intake/answers
///
/// Answer the active question. A rejected answer is still 200; the returned
/// step carries the field error.
async fn post_answer(
    State(state): State<IntakeRouteState>,
    Json(req): Json<AnswerRequest>,
) -> Response {
    respond(state.wizard.submit(req.address, &req.value).await)
}

/// PUT /api/intake/input
async fn put_input(
    State(state): State<IntakeRouteState>,
    Json(req): Json<InputRequest>,
) -> Response {
    respond(state.wizard.edit_input(&req.text).await)
}

/// POST /api/intake/retry
async fn post_retry(State(state): State<IntakeRouteState>) -> Response {
    respond(state.wizard.retry().await)
}

/// POST /api/intake/entries
async fn post_entry(State(state): State<IntakeRouteState>) -> Response {
    respond(state.wizard.add_entry().await)
}

/// POST /api/intake/refresh
///
/// Pick up session changes made outside this process.
async fn post_refresh(State(state): State<IntakeRouteState>) -> Response {
    respond(state.wizard.refresh().await)
}

/// POST /api/intake/revisit
async fn post_revisit(
    State(state): State<IntakeRouteState>,
    Json(req): Json<RevisitRequest>,
) -> Response {
    respond(state.wizard.revisit(req.address).await)
}

fn respond(result: Result<WizardStatus, Error>) -> Response {
    match result {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            let code = match &e {
                Error::StaleState(_) => StatusCode::CONFLICT,
                Error::Submission(_) => StatusCode::BAD_GATEWAY,
                Error::Config(_) | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Build the intake REST routes.
pub fn intake_routes(state: IntakeRouteState) -> Router {
    Router::new()
        .route("/api/intake/status", get(get_status))
        .route("/api/intake/answers", post(post_answer))
        .route("/api/intake/input", put(put_input))
        .route("/api/intake/retry", post(post_retry))
        .route("/api/intake/entries", post(post_entry))
        .route("/api/intake/revisit", post(post_revisit))
        .route("/api/intake/refresh", post(post_refresh))
        .with_state(state)
}
