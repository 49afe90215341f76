use crate::capture::{CaptureDevice, CaptureDeviceFactory, DeviceSource};
use crate::session::{CaptureSession, SessionConfig};
use crate::transport::{Connector, WsConnector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builds a fresh capture device for each session
pub type DeviceMaker = Arc<dyn Fn() -> Box<dyn CaptureDevice> + Send + Sync>;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Registered sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<CaptureSession>>>>,
    pub config: SessionConfig,
    connector: Arc<dyn Connector>,
    make_device: DeviceMaker,
}

impl AppState {
    pub fn new(config: SessionConfig, source: DeviceSource) -> Self {
        Self::with_parts(
            config,
            Arc::new(WsConnector::new()),
            Arc::new(move || CaptureDeviceFactory::create(source.clone())),
        )
    }

    pub fn with_parts(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        make_device: DeviceMaker,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            connector,
            make_device,
        }
    }

    pub fn new_session(&self) -> CaptureSession {
        CaptureSession::new(
            self.config.clone(),
            Arc::clone(&self.connector),
            (self.make_device)(),
        )
    }
}
