use anyhow::Result;
use bytes::Bytes;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// WebSocket readyState
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Lock-free ready state shared between a socket's tasks and its sink
#[derive(Debug)]
pub struct ReadyStateCell(AtomicU8);

impl ReadyStateCell {
    pub fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from -> to` atomically; false if the state was not `from`
    pub fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Inbound socket activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// Outbound half of an open socket
pub trait FrameSink: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queue one binary message without waiting on the network
    fn send_binary(&self, data: Bytes) -> Result<()>;

    /// Start the closing handshake. No-op unless the socket is open.
    fn close(&self);
}

/// A connected socket: the sink plus its ordered inbound event stream
pub struct SocketHandle {
    pub sink: Arc<dyn FrameSink>,
    pub events: mpsc::Receiver<SocketEvent>,
}

/// Opens sockets to an endpoint URL
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<SocketHandle>;
}
