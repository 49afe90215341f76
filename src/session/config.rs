use std::fmt;

use crate::capture::CaptureProfile;
use crate::encoder::EncoderConfig;
use crate::error::CaptureError;

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Registration server scheme and host, e.g. `ws://localhost:5001`
    pub base_url: String,

    /// Fixed camera constraints
    pub profile: CaptureProfile,

    pub encoder: EncoderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:5001".to_string(),
            profile: CaptureProfile::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

/// Opaque, non-empty token naming the registration subject
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, CaptureError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CaptureError::InvalidSessionId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
