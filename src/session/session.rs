use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{SessionConfig, SessionId};
use super::progress::{ProgressCallback, ProgressSlot};
use super::state::ConnectionState;
use super::stats::{RegistrationOutcome, SessionStats};
use crate::capture::{CaptureDevice, CaptureDeviceFactory, DeviceSource};
use crate::encoder::{EncoderHandle, EncoderState, MediaChunk, MediaEncoder};
use crate::error::CaptureError;
use crate::transport::{
    face_register_endpoint, Connector, FrameSink, ReadyState, ServerEvent, SocketEvent,
    SocketHandle, WsConnector,
};

/// One end-to-end registration capture
///
/// Single use: after `connect` has been called once, reconnecting requires a
/// new instance. Dropping the session stops it.
pub struct CaptureSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

/// State reachable from the session's background tasks
struct Shared {
    state: watch::Sender<ConnectionState>,
    session_id: OnceLock<SessionId>,
    progress: ProgressSlot,
    resources: Mutex<Resources>,
    stop_requested: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    /// Set by the first teardown after streaming began
    ended_at: Mutex<Option<DateTime<Utc>>>,
    last_progress: Mutex<Option<u64>>,
    outcome: Mutex<Option<RegistrationOutcome>>,
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
    chunks_dropped: AtomicU64,
    frames_dropped: AtomicU64,
}

struct Resources {
    /// `None` only while `connect` is awaiting acquisition
    device: Option<Box<dyn CaptureDevice>>,
    encoder: Option<EncoderHandle>,
    sink: Option<Arc<dyn FrameSink>>,
    tasks: Vec<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        device: Box<dyn CaptureDevice>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);

        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                state,
                session_id: OnceLock::new(),
                progress: ProgressSlot::default(),
                resources: Mutex::new(Resources {
                    device: Some(device),
                    encoder: None,
                    sink: None,
                    tasks: Vec::new(),
                }),
                stop_requested: AtomicBool::new(false),
                started_at: Mutex::new(None),
                ended_at: Mutex::new(None),
                last_progress: Mutex::new(None),
                outcome: Mutex::new(None),
                chunks_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                chunks_dropped: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Session over a real WebSocket with a built-in capture device
    pub fn with_source(config: SessionConfig, source: DeviceSource) -> Self {
        Self::new(
            config,
            Arc::new(WsConnector::new()),
            CaptureDeviceFactory::create(source),
        )
    }

    /// Connect, acquire the camera and start streaming
    ///
    /// Resolves once the device is acquired and the encoder is running; it
    /// does not wait for the server to acknowledge anything. On failure the
    /// socket is closed and the device released before returning.
    pub async fn connect(&self, session_id: &str) -> Result<(), CaptureError> {
        let id = SessionId::new(session_id)?;

        if let Err(current) = self.shared.transition(ConnectionState::Connecting) {
            return Err(match current {
                ConnectionState::Closed if self.shared.stop_requested.load(Ordering::SeqCst) => {
                    CaptureError::Stopped
                }
                _ => CaptureError::AlreadyStarted,
            });
        }
        let _ = self.shared.session_id.set(id.clone());

        let endpoint = face_register_endpoint(&self.config.base_url, &id);
        info!("Starting capture session {} -> {}", id, endpoint);

        let SocketHandle { sink, events } = match self.connector.connect(&endpoint).await {
            Ok(socket) => socket,
            Err(e) => {
                let err = CaptureError::transport(&e);
                error!("Session {}: {}", id, err);
                self.shared.fail(err.to_string());
                return Err(err);
            }
        };

        // Take the device out so acquisition can be awaited without the lock
        let device = {
            let mut res = self.shared.resources.lock();
            res.sink = Some(Arc::clone(&sink));
            if self.shared.current() != ConnectionState::Connecting {
                drop(res);
                return Err(self.abort_setup(None));
            }
            res.device.take()
        };
        let Some(mut device) = device else {
            return Err(self.abort_setup(Some(CaptureError::Device(
                "capture device unavailable".to_string(),
            ))));
        };

        info!("Acquiring capture device: {}", device.name());
        let acquired = device.acquire(&self.config.profile).await;
        self.shared.resources.lock().device = Some(device);

        let frames = match acquired {
            Ok(frames) => frames,
            Err(e) => {
                let err = CaptureError::device(&e);
                error!("Session {}: {}", id, err);
                return Err(self.abort_setup(Some(err)));
            }
        };
        if self.shared.current() != ConnectionState::Connecting {
            // Stopped while the device was being acquired
            return Err(self.abort_setup(None));
        }

        let mut encoder =
            MediaEncoder::new(self.config.encoder.clone(), self.config.profile).start(frames);
        let chunks = encoder.take_chunks();

        let mut res = self.shared.resources.lock();
        res.encoder = Some(encoder);

        if sink.ready_state() != ReadyState::Open {
            drop(res);
            return Err(self.abort_setup(Some(CaptureError::Transport(
                "socket closed during setup".to_string(),
            ))));
        }
        if self.shared.transition(ConnectionState::Streaming).is_err() {
            drop(res);
            return Err(self.abort_setup(None));
        }
        *self.shared.started_at.lock() = Some(Utc::now());

        if let Some(chunks) = chunks {
            res.tasks.push(tokio::spawn(transmit(
                chunks,
                Arc::clone(&sink),
                Arc::clone(&self.shared),
            )));
        }
        res.tasks.push(tokio::spawn(receive(events, Arc::clone(&self.shared))));

        info!("Session {} streaming", id);
        Ok(())
    }

    /// Stop encoder, release the device, close the socket
    ///
    /// Idempotent and safe in any state. Never fails; release faults are logged.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        if self.shared.transition(ConnectionState::Closed).is_ok() {
            info!("Stopping capture session {}", self.session_label());
        }
        self.shared.teardown();
    }

    /// Replace the progress callback (`None` clears it)
    pub fn set_on_progress(&self, callback: Option<ProgressCallback>) {
        self.shared.progress.set(callback);
    }

    /// Convenience for `set_on_progress(Some(..))`
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.set_on_progress(Some(Arc::new(callback)));
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    /// Lifecycle signal: observe every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.shared.session_id.get()
    }

    /// `Inactive` before streaming starts and after teardown
    pub fn encoder_state(&self) -> EncoderState {
        self.shared
            .resources
            .lock()
            .encoder
            .as_ref()
            .map_or(EncoderState::Inactive, EncoderHandle::state)
    }

    /// Verdict from the server, once it sent one
    pub fn outcome(&self) -> Option<RegistrationOutcome> {
        self.shared.outcome.lock().clone()
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = *self.shared.started_at.lock();
        let ended_at = *self.shared.ended_at.lock();
        let duration_secs = started_at
            .map(|t| {
                let end = ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(t).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.session_id().map(|id| id.to_string()),
            state: self.state(),
            started_at,
            ended_at,
            duration_secs,
            chunks_sent: self.shared.chunks_sent.load(Ordering::SeqCst),
            bytes_sent: self.shared.bytes_sent.load(Ordering::SeqCst),
            chunks_dropped: self.shared.chunks_dropped.load(Ordering::SeqCst),
            frames_dropped: self.shared.frames_dropped.load(Ordering::SeqCst),
            last_progress: *self.shared.last_progress.lock(),
        }
    }

    /// Undo a partial `connect`. `None` means the session was stopped or
    /// closed underneath us and the error is derived from that.
    fn abort_setup(&self, err: Option<CaptureError>) -> CaptureError {
        let err = err.unwrap_or_else(|| {
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                CaptureError::Stopped
            } else {
                CaptureError::Transport("socket closed during setup".to_string())
            }
        });

        if err != CaptureError::Stopped {
            self.shared.fail(err.to_string());
        }
        self.shared.teardown();
        err
    }

    fn session_label(&self) -> String {
        self.session_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<unconnected>".to_string())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn current(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Apply a legal transition; on rejection returns the current state
    fn transition(&self, next: ConnectionState) -> Result<(), ConnectionState> {
        let mut rejected = None;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                debug!("Session state {} -> {}", current, next);
                *current = next.clone();
                true
            } else {
                rejected = Some(current.clone());
                false
            }
        });
        match rejected {
            Some(current) => Err(current),
            None => Ok(()),
        }
    }

    fn fail(&self, reason: String) {
        let _ = self.transition(ConnectionState::Failed(reason));
    }

    /// Ordered, best-effort release: encoder, then device tracks, then socket
    fn teardown(&self) {
        if self.started_at.lock().is_some() {
            let mut ended_at = self.ended_at.lock();
            if ended_at.is_none() {
                *ended_at = Some(Utc::now());
            }
        }

        let mut res = self.resources.lock();

        if let Some(encoder) = res.encoder.as_mut() {
            if encoder.state() == EncoderState::Recording && encoder.stop() {
                debug!("Encoder stopped");
            }
        }

        if let Some(device) = res.device.as_mut() {
            if device.is_acquired() {
                match device.release() {
                    Ok(tracks) => info!("Released {} ({} tracks)", device.name(), tracks),
                    Err(e) => warn!("Failed to release {}: {:#}", device.name(), e),
                }
            }
        }

        if let Some(sink) = res.sink.as_ref() {
            if sink.ready_state() == ReadyState::Open {
                sink.close();
            }
        }

        for task in res.tasks.drain(..) {
            task.abort();
        }
    }

    /// Remote close or socket error while streaming
    fn socket_ended(&self, next: ConnectionState) {
        if self.transition(next.clone()).is_ok() {
            info!("Session ended by socket: {}", next);
        }
        // Device and socket fall together regardless of who got here first
        self.teardown();
    }

    fn handle_message(&self, text: &str) {
        match ServerEvent::parse(text) {
            Some(ServerEvent::Progress { count }) => {
                *self.last_progress.lock() = Some(count);
                self.progress.deliver(count);
            }
            Some(ServerEvent::Complete { success }) => {
                info!("Registration complete (success={})", success);
                *self.outcome.lock() = Some(RegistrationOutcome::Complete { success });
            }
            Some(ServerEvent::Error { message }) => {
                warn!("Registration rejected: {}", message);
                *self.outcome.lock() = Some(RegistrationOutcome::Rejected { message });
            }
            None => {}
        }
    }
}

/// Encoder -> socket. Never waits on the socket; chunks it can't take are dropped.
async fn transmit(
    mut chunks: mpsc::Receiver<MediaChunk>,
    sink: Arc<dyn FrameSink>,
    shared: Arc<Shared>,
) {
    while let Some(chunk) = chunks.recv().await {
        shared
            .frames_dropped
            .fetch_add(chunk.frames_dropped as u64, Ordering::SeqCst);

        if chunk.is_empty() {
            continue;
        }

        if sink.ready_state() != ReadyState::Open {
            debug!("Chunk {} dropped: socket not open", chunk.index);
            shared.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        let len = chunk.len() as u64;
        match sink.send_binary(chunk.data) {
            Ok(()) => {
                shared.chunks_sent.fetch_add(1, Ordering::SeqCst);
                shared.bytes_sent.fetch_add(len, Ordering::SeqCst);
            }
            Err(e) => {
                debug!("Chunk {} dropped: {}", chunk.index, e);
                shared.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Socket -> progress callback / lifecycle
async fn receive(mut events: mpsc::Receiver<SocketEvent>, shared: Arc<Shared>) {
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Text(text) => shared.handle_message(&text),
            SocketEvent::Closed { code, reason } => {
                info!("Socket closed by server (code={:?}, reason={:?})", code, reason);
                shared.socket_ended(ConnectionState::Closed);
                return;
            }
            SocketEvent::Error(e) => {
                warn!("Socket error: {}", e);
                shared.socket_ended(ConnectionState::Failed(e));
                return;
            }
        }
    }

    shared.socket_ended(ConnectionState::Closed);
}
