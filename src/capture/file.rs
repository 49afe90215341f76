use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

use super::backend::{CaptureDevice, CaptureProfile, RawFrame};
use super::pump::FramePump;

/// Replays a raw I420 recording as if it were a live camera, looping at the end
pub struct FileDevice {
    path: PathBuf,
    pump: Option<FramePump>,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pump: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FileDevice {
    async fn acquire(&mut self, profile: &CaptureProfile) -> Result<mpsc::Receiver<RawFrame>> {
        if self.is_acquired() {
            bail!("File source {} already acquired", self.path.display());
        }
        profile.validate()?;

        let contents = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to open capture file {}", self.path.display()))?;

        let frame_len = profile.frame_len();
        let frame_count = contents.len() / frame_len;
        if frame_count == 0 {
            bail!(
                "Capture file {} holds {} bytes, less than one {}x{} frame",
                self.path.display(),
                contents.len(),
                profile.width,
                profile.height
            );
        }

        info!(
            "File source acquired: {} ({} frames, {}x{} @ {} fps)",
            self.path.display(),
            frame_count,
            profile.width,
            profile.height,
            profile.frame_rate
        );

        let contents = Bytes::from(contents);
        let (pump, rx) = FramePump::spawn(*profile, move |index| {
            let start = (index as usize % frame_count) * frame_len;
            contents.slice(start..start + frame_len)
        });
        self.pump = Some(pump);

        Ok(rx)
    }

    fn release(&mut self) -> Result<usize> {
        match self.pump.take() {
            Some(mut pump) => {
                pump.stop();
                info!("File source released: {}", self.path.display());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn is_acquired(&self) -> bool {
        self.pump.as_ref().is_some_and(FramePump::is_running)
    }

    fn name(&self) -> &str {
        "file"
    }
}
