use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event sent by the registration server as a JSON text frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Cumulative number of samples accepted so far
    Progress { count: u64 },
    /// Registration finished; the server closes the socket next
    Complete { success: bool },
    /// Registration failed server-side
    Error { message: String },
}

impl ServerEvent {
    /// Parse an inbound text frame. Unknown types and malformed JSON yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Ignoring inbound message ({}): {}", e, text);
                None
            }
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain tagged enum cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
