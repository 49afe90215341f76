use anyhow::{bail, Result};
use bytes::Bytes;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::file::FileDevice;
use super::synthetic::SyntheticDevice;

/// Largest width or height accepted; frame records store dimensions as u16
pub const MAX_DIMENSION: u32 = 4096;

/// Above this the frame clock period would round towards zero
pub const MAX_FRAME_RATE: u32 = 120;

/// Fixed capture constraints requested from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    /// Target frames per second
    pub frame_rate: u32,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 10,
        }
    }
}

impl CaptureProfile {
    /// Size in bytes of one I420 frame at this resolution
    pub fn frame_len(&self) -> usize {
        let (w, h) = (self.width as usize, self.height as usize);
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        w * h + 2 * chroma
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("Invalid capture resolution {}x{}", self.width, self.height);
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            bail!(
                "Capture resolution {}x{} exceeds {}x{}",
                self.width,
                self.height,
                MAX_DIMENSION,
                MAX_DIMENSION
            );
        }
        if self.frame_rate == 0 {
            bail!("Capture frame rate must be positive");
        }
        if self.frame_rate > MAX_FRAME_RATE {
            bail!(
                "Capture frame rate {} exceeds {} fps",
                self.frame_rate,
                MAX_FRAME_RATE
            );
        }
        Ok(())
    }
}

/// One uncompressed video frame (I420, planar)
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the device was acquired
    pub timestamp_ms: u64,
}

/// Camera capture device
///
/// Implementations:
/// - Synthetic: moving test pattern, for demos and tests
/// - File: replays raw I420 frames from disk
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device exclusively and start producing frames
    ///
    /// Frames are offered with `try_send`; a slow consumer loses frames
    /// rather than stalling the device.
    async fn acquire(&mut self, profile: &CaptureProfile) -> Result<mpsc::Receiver<RawFrame>>;

    /// Stop every track and give the device back
    ///
    /// Returns how many tracks were stopped. Releasing an idle device is a no-op.
    fn release(&mut self) -> Result<usize>;

    fn is_acquired(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    Synthetic,
    /// Raw I420 file matching the capture profile resolution
    File(PathBuf),
}

impl std::str::FromStr for DeviceSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synthetic" => Ok(Self::Synthetic),
            other => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
                _ => bail!("Unknown capture source '{}' (expected synthetic or file:<path>)", s),
            },
        }
    }
}

pub struct CaptureDeviceFactory;

impl CaptureDeviceFactory {
    pub fn create(source: DeviceSource) -> Box<dyn CaptureDevice> {
        match source {
            DeviceSource::Synthetic => Box::new(SyntheticDevice::new()),
            DeviceSource::File(path) => Box::new(FileDevice::new(path)),
        }
    }
}
