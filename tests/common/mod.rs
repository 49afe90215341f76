// Test doubles for the capture session: a scriptable socket and camera

#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::Bytes;
use facereg_capture::capture::{CaptureDevice, CaptureProfile, RawFrame};
use facereg_capture::encoder::{Codec, EncoderConfig};
use facereg_capture::session::SessionConfig;
use facereg_capture::transport::socket::ReadyStateCell;
use facereg_capture::transport::{Connector, FrameSink, ReadyState, SocketEvent, SocketHandle};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Ordered record of teardown side effects shared by the fakes
pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

pub fn tiny_config() -> SessionConfig {
    SessionConfig {
        base_url: "ws://localhost:5001".to_string(),
        profile: CaptureProfile {
            width: 8,
            height: 8,
            frame_rate: 10,
        },
        encoder: EncoderConfig {
            codec: Codec::Gray8,
            bitrate_bps: 1_000_000,
            chunk_interval: Duration::from_millis(20),
        },
    }
}

pub fn tiny_frame(profile: &CaptureProfile, fill: u8) -> RawFrame {
    RawFrame {
        data: Bytes::from(vec![fill; profile.frame_len()]),
        width: profile.width,
        height: profile.height,
        timestamp_ms: 0,
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("future did not settle in time")
}

// ============================================================================
// Socket
// ============================================================================

pub struct FakeSink {
    state: ReadyStateCell,
    pub sent: Mutex<Vec<Bytes>>,
    pub send_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    log: EventLog,
}

impl FakeSink {
    /// Simulate the socket going away without a close event
    pub fn force_state(&self, state: ReadyState) {
        self.state.set(state);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl FrameSink for FakeSink {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send_binary(&self, data: Bytes) -> Result<()> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.get() != ReadyState::Open {
            bail!("fake socket not open");
        }
        self.sent.lock().push(data);
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.transition(ReadyState::Open, ReadyState::Closed) {
            self.log.lock().push("socket closed");
        }
    }
}

pub struct FakeConnector {
    fail_with: Option<String>,
    gate: Mutex<Option<Arc<Notify>>>,
    log: EventLog,
    pub endpoints: Mutex<Vec<String>>,
    pub connect_started: Notify,
    pub sink: Mutex<Option<Arc<FakeSink>>>,
    pub events: Mutex<Option<mpsc::Sender<SocketEvent>>>,
}

impl FakeConnector {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self::build(None, None, log))
    }

    pub fn failing(reason: &str, log: EventLog) -> Arc<Self> {
        Arc::new(Self::build(Some(reason.to_string()), None, log))
    }

    /// The first `connect` stays pending until the gate is notified;
    /// later connects go straight through
    pub fn gated(gate: Arc<Notify>, log: EventLog) -> Arc<Self> {
        Arc::new(Self::build(None, Some(gate), log))
    }

    fn build(fail_with: Option<String>, gate: Option<Arc<Notify>>, log: EventLog) -> Self {
        Self {
            fail_with,
            gate: Mutex::new(gate),
            log,
            endpoints: Mutex::new(Vec::new()),
            connect_started: Notify::new(),
            sink: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    pub fn sink(&self) -> Arc<FakeSink> {
        self.sink.lock().clone().expect("connect was never called")
    }

    pub async fn push(&self, event: SocketEvent) {
        let tx = self.events.lock().clone().expect("connect was never called");
        tx.send(event).await.expect("session stopped listening");
    }

    pub async fn push_text(&self, text: &str) {
        self.push(SocketEvent::Text(text.to_string())).await;
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, endpoint: &str) -> Result<SocketHandle> {
        self.endpoints.lock().push(endpoint.to_string());
        self.connect_started.notify_one();

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(reason) = &self.fail_with {
            bail!("{}", reason);
        }

        let sink = Arc::new(FakeSink {
            state: ReadyStateCell::new(ReadyState::Open),
            sent: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            log: Arc::clone(&self.log),
        });
        let (tx, rx) = mpsc::channel(32);
        *self.sink.lock() = Some(Arc::clone(&sink));
        *self.events.lock() = Some(tx);

        Ok(SocketHandle {
            sink,
            events: rx,
        })
    }
}

// ============================================================================
// Camera
// ============================================================================

/// Observable side of a [`FakeDevice`]
#[derive(Default)]
pub struct DeviceProbe {
    pub acquired: AtomicBool,
    pub acquire_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub frames: Mutex<Option<mpsc::Sender<RawFrame>>>,
}

impl DeviceProbe {
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Feed one frame to the encoder as if the camera produced it
    pub fn emit(&self, frame: RawFrame) -> bool {
        match self.frames.lock().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }
}

pub struct FakeDevice {
    probe: Arc<DeviceProbe>,
    fail_with: Option<String>,
    gate: Option<Arc<Notify>>,
    log: EventLog,
}

impl FakeDevice {
    pub fn new(log: EventLog) -> (Box<dyn CaptureDevice>, Arc<DeviceProbe>) {
        Self::build(None, None, log)
    }

    pub fn failing(reason: &str, log: EventLog) -> (Box<dyn CaptureDevice>, Arc<DeviceProbe>) {
        Self::build(Some(reason.to_string()), None, log)
    }

    /// `acquire` stays pending until the gate is notified
    pub fn gated(gate: Arc<Notify>, log: EventLog) -> (Box<dyn CaptureDevice>, Arc<DeviceProbe>) {
        Self::build(None, Some(gate), log)
    }

    fn build(
        fail_with: Option<String>,
        gate: Option<Arc<Notify>>,
        log: EventLog,
    ) -> (Box<dyn CaptureDevice>, Arc<DeviceProbe>) {
        let probe = Arc::new(DeviceProbe::default());
        let device = FakeDevice {
            probe: Arc::clone(&probe),
            fail_with,
            gate,
            log,
        };
        (Box::new(device), probe)
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FakeDevice {
    async fn acquire(&mut self, _profile: &CaptureProfile) -> Result<mpsc::Receiver<RawFrame>> {
        self.probe.acquire_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(reason) = &self.fail_with {
            bail!("{}", reason);
        }

        let (tx, rx) = mpsc::channel(16);
        *self.probe.frames.lock() = Some(tx);
        self.probe.acquired.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn release(&mut self) -> Result<usize> {
        if !self.probe.acquired.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        self.probe.release_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.frames.lock().take();
        self.log.lock().push("device released");
        Ok(1)
    }

    fn is_acquired(&self) -> bool {
        self.probe.is_acquired()
    }

    fn name(&self) -> &str {
        "fake camera"
    }
}
