use serde::Serialize;

/// Lifecycle of a capture session
///
/// ```text
/// Idle -> Connecting -> Streaming -> Closed | Failed
///            |                           ^
///            +---------------------------+
/// ```
///
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Closed,
    Failed(String),
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed(_))
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Streaming)
                | (Connecting, Closed)
                | (Connecting, Failed(_))
                | (Streaming, Closed)
                | (Streaming, Failed(_))
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Streaming => f.write_str("streaming"),
            ConnectionState::Closed => f.write_str("closed"),
            ConnectionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
