use anyhow::{bail, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::info;

use super::backend::{CaptureDevice, CaptureProfile, RawFrame};
use super::pump::FramePump;

/// Test-pattern camera: a diagonal luma gradient that scrolls one pixel per frame
pub struct SyntheticDevice {
    pump: Option<FramePump>,
}

impl SyntheticDevice {
    pub fn new() -> Self {
        Self { pump: None }
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Render frame `index` of the test pattern
pub fn test_pattern(profile: &CaptureProfile, index: u64) -> Bytes {
    let (w, h) = (profile.width as usize, profile.height as usize);
    let mut buf = BytesMut::with_capacity(profile.frame_len());

    for y in 0..h {
        for x in 0..w {
            buf.put_u8(((x + y) as u64 + index) as u8);
        }
    }
    // Neutral chroma
    buf.put_bytes(128, profile.frame_len() - w * h);

    buf.freeze()
}

#[async_trait::async_trait]
impl CaptureDevice for SyntheticDevice {
    async fn acquire(&mut self, profile: &CaptureProfile) -> Result<mpsc::Receiver<RawFrame>> {
        if self.is_acquired() {
            bail!("Synthetic camera already acquired");
        }
        profile.validate()?;

        info!(
            "Synthetic camera acquired ({}x{} @ {} fps)",
            profile.width, profile.height, profile.frame_rate
        );

        let profile = *profile;
        let (pump, rx) = FramePump::spawn(profile, move |index| test_pattern(&profile, index));
        self.pump = Some(pump);

        Ok(rx)
    }

    fn release(&mut self) -> Result<usize> {
        match self.pump.take() {
            Some(mut pump) => {
                pump.stop();
                info!("Synthetic camera released");
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn is_acquired(&self) -> bool {
        self.pump.as_ref().is_some_and(FramePump::is_running)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
