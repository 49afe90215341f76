//! Socket transport to the face-registration server
//!
//! - `socket`: transport-neutral traits the capture session drives
//! - `websocket`: tokio-tungstenite implementation
//! - `messages`: JSON events sent by the server

mod endpoint;
pub mod messages;
pub mod socket;
pub mod websocket;

pub use endpoint::{face_register_endpoint, FACE_REGISTER_PATH};
pub use messages::ServerEvent;
pub use socket::{Connector, FrameSink, ReadyState, SocketEvent, SocketHandle};
pub use websocket::WsConnector;
