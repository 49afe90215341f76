use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::ConnectionState;

/// Snapshot of a capture session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: Option<String>,

    pub state: ConnectionState,

    /// When streaming began
    pub started_at: Option<DateTime<Utc>>,

    /// When the session was torn down
    pub ended_at: Option<DateTime<Utc>>,

    /// Streaming time, frozen once the session ends
    pub duration_secs: f64,

    /// Chunks handed to the socket
    pub chunks_sent: u64,

    pub bytes_sent: u64,

    /// Non-empty chunks discarded because the socket was not open or refused them
    pub chunks_dropped: u64,

    /// Frames discarded by encoder rate control
    pub frames_dropped: u64,

    /// Latest accepted-sample count reported by the server
    pub last_progress: Option<u64>,
}

/// Final verdict sent by the registration server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Complete { success: bool },
    Rejected { message: String },
}
