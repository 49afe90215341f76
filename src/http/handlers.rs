use super::state::AppState;
use crate::error::CaptureError;
use crate::session::{RegistrationOutcome, SessionStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCaptureRequest {
    /// Registration subject, embedded in the socket endpoint
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCaptureResponse {
    pub session_id: String,
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct CaptureStatusResponse {
    pub stats: SessionStats,
    pub outcome: Option<RegistrationOutcome>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/start
/// Connect a new capture session and start streaming
pub async fn start_capture(
    State(state): State<AppState>,
    Json(req): Json<StartCaptureRequest>,
) -> impl IntoResponse {
    let session_id = req.session_id;
    if session_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, CaptureError::InvalidSessionId.to_string());
    }

    info!("Starting capture for session: {}", session_id);

    // Register first so concurrent starts for the same id conflict.
    // A session that already ended (server closed, error) is replaced.
    let session = {
        let mut sessions = state.sessions.write().await;
        if let Some(existing) = sessions.get(&session_id) {
            if !existing.state().is_terminal() {
                return error_response(
                    StatusCode::CONFLICT,
                    format!("Session {} is already capturing", session_id),
                );
            }
            info!("Replacing ended session {} ({})", session_id, existing.state());
        }
        let session = Arc::new(state.new_session());
        sessions.insert(session_id.clone(), Arc::clone(&session));
        session
    };

    let progress_id = session_id.clone();
    session.on_progress(move |count| info!("Session {}: {} samples accepted", progress_id, count));

    if let Err(e) = session.connect(&session_id).await {
        error!("Failed to start capture for {}: {}", session_id, e);
        {
            // Only our own entry: a stop + restart may have registered a newer session
            let mut sessions = state.sessions.write().await;
            if sessions
                .get(&session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &session))
            {
                sessions.remove(&session_id);
            }
        }

        let status = match e {
            CaptureError::Transport(_) => StatusCode::BAD_GATEWAY,
            CaptureError::InvalidSessionId => StatusCode::BAD_REQUEST,
            CaptureError::Stopped | CaptureError::AlreadyStarted => StatusCode::CONFLICT,
            CaptureError::Device(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return error_response(status, format!("Failed to start capture: {}", e));
    }

    info!("Capture started successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartCaptureResponse {
            session_id: session_id.clone(),
            status: session.state().to_string(),
            message: format!("Capture started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /capture/stop/:session_id
/// Stop a capture session and forget it
pub async fn stop_capture(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping capture for session: {}", session_id);

    // Find and remove session
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match session {
        Some(session) => {
            session.stop();
            (
                StatusCode::OK,
                Json(StopCaptureResponse {
                    session_id: session_id.clone(),
                    status: session.state().to_string(),
                    stats: session.stats(),
                }),
            )
                .into_response()
        }
        None => {
            error!("Session {} not found", session_id);
            error_response(StatusCode::NOT_FOUND, format!("Session {} not found", session_id))
        }
    }
}

/// GET /capture/:session_id/status
/// Get state and statistics of a capture session
pub async fn get_capture_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (
            StatusCode::OK,
            Json(CaptureStatusResponse {
                stats: session.stats(),
                outcome: session.outcome(),
            }),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Session {} not found", session_id)),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
