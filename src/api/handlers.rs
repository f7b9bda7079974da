//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, LocationRequest, SuccessResponse, TouchRequest,
};
use super::AppState;
use crate::state_machine::{TurnError, DEFAULT_NETWORK_FAILURE_CAPTION};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Speech recognizer / text input
        .route("/api/chat", post(send_chat))
        .route("/api/touch", post(touch))
        .route("/api/reset", post(reset))
        .route("/api/history", get(get_history))
        .route("/api/location", post(set_location))
        // Bus events for the animation layer and prop spawner
        .route("/api/events", get(stream_events))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turns
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let submission = state.coordinator.submit(req.text).await?;
    Ok(Json(submission.into()))
}

async fn touch(
    State(state): State<AppState>,
    Json(req): Json<TouchRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let submission = state.touch.touch(req.part).await?;
    Ok(Json(submission.into()))
}

async fn reset(State(state): State<AppState>) -> Result<Json<SuccessResponse>, AppError> {
    state.coordinator.reset().await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_history(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.coordinator.snapshot().await?;
    Ok(Json(snapshot))
}

// ============================================================
// Context
// ============================================================

async fn set_location(
    State(state): State<AppState>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    if req.city.trim().is_empty() {
        return Err(AppError::BadRequest("city must not be empty".to_string()));
    }
    let restarted = state
        .context
        .as_ref()
        .is_some_and(|context| context.set_location(&req.city));
    if !restarted {
        return Err(AppError::Unavailable(
            "weather refresh is not configured".to_string(),
        ));
    }
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_events(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    // Subscribe before the snapshot so nothing falls between them
    let broadcast_rx = state.bus.subscribe();
    let snapshot = state.coordinator.snapshot().await?;
    tracing::info!(subscribers = state.bus.subscriber_count(), "Event stream opened");
    Ok(sse_stream(snapshot, broadcast_rx))
}

async fn get_version() -> &'static str {
    concat!("avatar-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Unavailable(String),
    Turn(TurnError),
}

impl From<TurnError> for AppError {
    fn from(error: TurnError) -> Self {
        AppError::Turn(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", msg))
            }
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("unavailable", msg),
            ),
            AppError::Turn(error) => {
                let message = error.to_string();
                match error {
                    TurnError::Network(_) => {
                        tracing::warn!(error = %message, "Turn failed on the generative service");
                        (
                            StatusCode::BAD_GATEWAY,
                            ErrorResponse::new("network", DEFAULT_NETWORK_FAILURE_CAPTION),
                        )
                    }
                    TurnError::Parse { raw, .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        ErrorResponse {
                            display_text: Some(raw),
                            ..ErrorResponse::new("parse", message)
                        },
                    ),
                    TurnError::Config(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::new("config", message),
                    ),
                    TurnError::Interrupted => {
                        (StatusCode::CONFLICT, ErrorResponse::new("interrupted", message))
                    }
                    TurnError::Shutdown => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::new("shutdown", message),
                    ),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
