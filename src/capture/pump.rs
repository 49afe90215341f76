// Shared frame clock for the built-in devices

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::backend::{CaptureProfile, RawFrame};

const FRAME_QUEUE: usize = 8;

/// Emits one frame per tick at the profile frame rate until stopped
pub(crate) struct FramePump {
    task: Option<JoinHandle<()>>,
}

impl FramePump {
    pub(crate) fn spawn<F>(profile: CaptureProfile, mut next_frame: F) -> (Self, mpsc::Receiver<RawFrame>)
    where
        F: FnMut(u64) -> Bytes + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let period = Duration::from_secs_f64(1.0 / profile.frame_rate as f64);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut index = 0u64;

            loop {
                ticker.tick().await;

                let frame = RawFrame {
                    data: next_frame(index),
                    width: profile.width,
                    height: profile.height,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                index += 1;

                match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => debug!("Frame {} dropped: consumer behind", index - 1),
                    Err(TrySendError::Closed(_)) => break,
                }
            }

            info!("Frame pump finished after {} frames", index);
        });

        (Self { task: Some(task) }, rx)
    }

    /// Returns false if the pump was already stopped
    pub(crate) fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}
