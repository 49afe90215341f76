use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::socket::{Connector, FrameSink, ReadyState, ReadyStateCell, SocketEvent, SocketHandle};

/// Outbound messages waiting for the writer task (~1s of 100ms chunks)
const DEFAULT_SEND_QUEUE: usize = 16;
const EVENT_QUEUE: usize = 64;

/// WebSocket connector backed by tokio-tungstenite
pub struct WsConnector {
    send_queue: usize,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            send_queue: DEFAULT_SEND_QUEUE,
        }
    }

    /// Bound the outbound queue; sends beyond it fail instead of buffering
    pub fn with_send_queue(send_queue: usize) -> Self {
        Self {
            send_queue: send_queue.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<SocketHandle> {
        info!("Connecting to {}", endpoint);

        let (stream, _response) = connect_async(endpoint)
            .await
            .with_context(|| format!("Failed to connect to {}", endpoint))?;
        let (mut write, mut read) = stream.split();

        info!("WebSocket open: {}", endpoint);

        let state = Arc::new(ReadyStateCell::new(ReadyState::Open));
        let close_signal = Arc::new(Notify::new());
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(self.send_queue);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        // Writer: drains queued binary frames, sends a close frame on request
        let writer_state = Arc::clone(&state);
        let writer_close = Arc::clone(&close_signal);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_close.notified() => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Close frame not sent: {}", e);
                        }
                        break;
                    }
                    data = out_rx.recv() => match data {
                        Some(data) => {
                            if let Err(e) = write.send(Message::Binary(data.to_vec())).await {
                                warn!("WebSocket send failed: {}", e);
                                writer_state.set(ReadyState::Closed);
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("WebSocket writer finished");
        });

        // Reader: forwards text frames in arrival order until the socket ends
        let reader_state = Arc::clone(&state);
        let reader_close = Arc::clone(&close_signal);
        tokio::spawn(async move {
            let end = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(SocketEvent::Text(text)).await.is_err() {
                            // Nobody listening any more
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        // Let the writer answer the close handshake
                        if reader_state.transition(ReadyState::Open, ReadyState::Closing) {
                            reader_close.notify_one();
                        }
                        break Some(SocketEvent::Closed { code, reason });
                    }
                    Some(Ok(_)) => {} // binary, ping, pong
                    Some(Err(e)) => break Some(SocketEvent::Error(e.to_string())),
                    None => {
                        break Some(SocketEvent::Closed {
                            code: None,
                            reason: "connection ended".to_string(),
                        })
                    }
                }
            };

            reader_state.set(ReadyState::Closed);
            if let Some(event) = end {
                let _ = event_tx.send(event).await;
            }
            debug!("WebSocket reader finished");
        });

        Ok(SocketHandle {
            sink: Arc::new(WsSink {
                state,
                out_tx,
                close_signal,
            }),
            events: event_rx,
        })
    }
}

struct WsSink {
    state: Arc<ReadyStateCell>,
    out_tx: mpsc::Sender<Bytes>,
    close_signal: Arc<Notify>,
}

impl FrameSink for WsSink {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send_binary(&self, data: Bytes) -> Result<()> {
        if self.state.get() != ReadyState::Open {
            bail!("WebSocket is not open");
        }
        self.out_tx.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("WebSocket send queue full"),
            TrySendError::Closed(_) => anyhow!("WebSocket writer stopped"),
        })
    }

    fn close(&self) {
        if self.state.transition(ReadyState::Open, ReadyState::Closing) {
            info!("Closing WebSocket");
            self.close_signal.notify_one();
        }
    }
}
