//! HTTP API for the surrounding UI
//!
//! This module provides a small control surface over capture sessions:
//! - POST /capture/start - Connect and start streaming for a session id
//! - POST /capture/stop/:session_id - Stop a session and return its stats
//! - GET /capture/:session_id/status - Query state, stats and server verdict
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, DeviceMaker};
