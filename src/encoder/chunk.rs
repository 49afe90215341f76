use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::container::{downscale_luma, scale_factor, ChunkBuilder, Codec};
use crate::capture::{CaptureProfile, RawFrame};

const CHUNK_QUEUE: usize = 32;

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub codec: Codec,
    /// Target bitrate in bits per second
    pub bitrate_bps: u64,
    /// How often a chunk is flushed (default: 100ms)
    pub chunk_interval: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Gray8,
            bitrate_bps: 1_000_000,
            chunk_interval: Duration::from_millis(100),
        }
    }
}

impl EncoderConfig {
    /// Bytes one frame may use at `frame_rate` without exceeding the bitrate
    pub fn frame_budget(&self, frame_rate: u32) -> usize {
        (self.bitrate_bps / 8 / frame_rate.max(1) as u64) as usize
    }

    /// Bytes one chunk may carry
    pub fn chunk_budget(&self) -> usize {
        (self.bitrate_bps as u128 * self.chunk_interval.as_millis() / 8_000) as usize
    }
}

/// One encoded chunk, handed to the transport as-is
#[derive(Debug, Clone)]
pub struct MediaChunk {
    /// Sequence number among non-empty chunks
    pub index: u32,
    pub data: Bytes,
    pub frame_count: u16,
    /// Frames discarded by rate control during this interval
    pub frames_dropped: u32,
}

impl MediaChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
}

/// Interval-flushing encoder bound to one device stream
pub struct MediaEncoder {
    config: EncoderConfig,
    profile: CaptureProfile,
}

impl MediaEncoder {
    pub fn new(config: EncoderConfig, profile: CaptureProfile) -> Self {
        Self { config, profile }
    }

    /// Start encoding `frames`, flushing a chunk every `chunk_interval`
    ///
    /// Encoding ends when the handle is stopped or dropped, or when the
    /// device closes its frame channel. The pending partial chunk is flushed
    /// in every case.
    pub fn start(self, frames: mpsc::Receiver<RawFrame>) -> EncoderHandle {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE);
        let (stop_tx, stop_rx) = oneshot::channel();
        let recording = Arc::new(AtomicBool::new(true));

        info!(
            "Encoder started: codec={}, {} bps, {}ms chunks",
            self.config.codec,
            self.config.bitrate_bps,
            self.config.chunk_interval.as_millis()
        );

        let task = EncodeTask::new(self.config, self.profile, chunk_tx);
        tokio::spawn(task.run(frames, stop_rx, Arc::clone(&recording)));

        EncoderHandle {
            stop_tx: Some(stop_tx),
            recording,
            chunks: Some(chunk_rx),
        }
    }
}

/// Control side of a running encoder
pub struct EncoderHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    recording: Arc<AtomicBool>,
    chunks: Option<mpsc::Receiver<MediaChunk>>,
}

impl EncoderHandle {
    pub fn state(&self) -> EncoderState {
        if self.recording.load(Ordering::SeqCst) {
            EncoderState::Recording
        } else {
            EncoderState::Inactive
        }
    }

    /// Chunk stream; can be taken once
    pub fn take_chunks(&mut self) -> Option<mpsc::Receiver<MediaChunk>> {
        self.chunks.take()
    }

    /// Stop producing chunks. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        let was_recording = self.recording.swap(false, Ordering::SeqCst);
        match self.stop_tx.take() {
            Some(tx) => {
                // The task may already have exited on its own
                let _ = tx.send(());
                was_recording
            }
            None => false,
        }
    }
}

struct EncodeTask {
    config: EncoderConfig,
    profile: CaptureProfile,
    chunk_tx: mpsc::Sender<MediaChunk>,
    builder: ChunkBuilder,
    next_index: u32,
    interval_bytes: usize,
    interval_dropped: u32,
    scale_cache: HashMap<(u32, u32), u32>,
}

impl EncodeTask {
    fn new(config: EncoderConfig, profile: CaptureProfile, chunk_tx: mpsc::Sender<MediaChunk>) -> Self {
        Self {
            builder: ChunkBuilder::new(config.codec),
            config,
            profile,
            chunk_tx,
            next_index: 0,
            interval_bytes: 0,
            interval_dropped: 0,
            scale_cache: HashMap::new(),
        }
    }

    async fn run(
        mut self,
        mut frames: mpsc::Receiver<RawFrame>,
        mut stop_rx: oneshot::Receiver<()>,
        recording: Arc<AtomicBool>,
    ) {
        let period = self.config.chunk_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                // Fires on explicit stop and when the handle is dropped
                _ = &mut stop_rx => break,
                _ = ticker.tick() => self.flush(),
                frame = frames.recv() => match frame {
                    Some(frame) => self.encode(frame),
                    None => {
                        debug!("Frame source closed");
                        break;
                    }
                },
            }
        }

        self.flush();
        recording.store(false, Ordering::SeqCst);
        info!("Encoder stopped after {} chunks", self.next_index);
    }

    fn encode(&mut self, frame: RawFrame) {
        if self.builder.is_full() {
            self.flush();
        }

        let (width, height, payload) = match self.config.codec {
            Codec::Gray8 => {
                let budget = self.config.frame_budget(self.profile.frame_rate);
                let k = *self
                    .scale_cache
                    .entry((frame.width, frame.height))
                    .or_insert_with(|| scale_factor(frame.width, frame.height, budget));
                downscale_luma(&frame, k)
            }
            Codec::I420 => (frame.width, frame.height, frame.data.clone()),
        };

        // The first frame of an interval is always admitted
        let over_budget = self.interval_bytes + payload.len() > self.config.chunk_budget();
        if over_budget && self.builder.frame_count() > 0 {
            self.interval_dropped += 1;
            return;
        }

        self.builder.push(frame.timestamp_ms, width, height, &payload);
        self.interval_bytes += payload.len();
    }

    fn flush(&mut self) {
        let frame_count = self.builder.frame_count();
        let data = self.builder.finish(self.next_index);
        let chunk = MediaChunk {
            index: self.next_index,
            data,
            frame_count,
            frames_dropped: self.interval_dropped,
        };
        if !chunk.is_empty() {
            self.next_index += 1;
        }
        self.interval_bytes = 0;
        self.interval_dropped = 0;

        match self.chunk_tx.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(chunk)) => {
                warn!("Chunk {} dropped: transmit queue full", chunk.index);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
