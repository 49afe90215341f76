//! Face-registration capture session
//!
//! `CaptureSession` ties one socket, one capture device and one encoder
//! together for a single registration attempt:
//! - Connects to the per-session endpoint
//! - Acquires the camera and streams encoded chunks while the socket is open
//! - Forwards server progress to a callback
//! - Releases device and socket together on stop, error or remote close

mod config;
mod progress;
mod session;
mod state;
mod stats;

pub use config::{SessionConfig, SessionId};
pub use progress::{ProgressCallback, ProgressSlot};
pub use session::CaptureSession;
pub use state::ConnectionState;
pub use stats::{RegistrationOutcome, SessionStats};
