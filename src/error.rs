use thiserror::Error;

/// Errors surfaced by [`CaptureSession::connect`](crate::session::CaptureSession::connect)
///
/// Only setup-time failures reach the caller. Faults after the session is
/// streaming are reflected in its state, and teardown faults are logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Socket failed to open or dropped before setup completed
    #[error("transport error: {0}")]
    Transport(String),

    /// Camera unavailable or permission denied
    #[error("capture device error: {0}")]
    Device(String),

    #[error("session id must not be empty")]
    InvalidSessionId,

    /// The session is single-use and `connect` was already called
    #[error("session already started")]
    AlreadyStarted,

    /// `stop()` was called while `connect` was still in flight
    #[error("session stopped during connect")]
    Stopped,
}

impl CaptureError {
    // `{:#}` keeps anyhow's context chain on one line
    pub(crate) fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(format!("{:#}", err))
    }

    pub(crate) fn device(err: &anyhow::Error) -> Self {
        Self::Device(format!("{:#}", err))
    }
}
