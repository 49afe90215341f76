pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;

pub use capture::{
    CaptureDevice, CaptureDeviceFactory, CaptureProfile, DeviceSource, FileDevice, RawFrame,
    SyntheticDevice,
};
pub use config::Config;
pub use encoder::{Codec, EncoderConfig, EncoderState, MediaChunk, MediaEncoder};
pub use error::CaptureError;
pub use http::{create_router, AppState};
pub use session::{
    CaptureSession, ConnectionState, RegistrationOutcome, SessionConfig, SessionId, SessionStats,
};
pub use transport::{Connector, FrameSink, ReadyState, ServerEvent, SocketEvent, WsConnector};
