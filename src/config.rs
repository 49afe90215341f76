use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::capture::CaptureProfile;
use crate::encoder::EncoderConfig;
use crate::session::SessionConfig;

/// Default config file, resolved by the `config` crate with any supported extension
pub const DEFAULT_CONFIG_PATH: &str = "config/facereg-capture";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub encoder: EncoderSettings,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Scheme and host of the registration server, e.g. `ws://localhost:5001`
    pub base_url: String,
    /// Upper bound the CLI puts on `connect`; the session itself never times out
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSettings {
    pub codec: String,
    pub bitrate_bps: u64,
    pub chunk_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Config {
    /// Load defaults, then `path` if it exists, then `FACEREG__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FACEREG").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid facereg-capture configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("server.base_url", "ws://localhost:5001")?
            .set_default("server.connect_timeout_secs", 30_i64)?
            .set_default("capture.width", 640_i64)?
            .set_default("capture.height", 480_i64)?
            .set_default("capture.frame_rate", 10_i64)?
            .set_default("encoder.codec", "gray8")?
            .set_default("encoder.bitrate_bps", 1_000_000_i64)?
            .set_default("encoder.chunk_interval_ms", 100_i64)?
            .set_default("http.bind", "127.0.0.1")?
            .set_default("http.port", 5080_i64)?)
    }

    pub fn capture_profile(&self) -> CaptureProfile {
        CaptureProfile {
            width: self.capture.width,
            height: self.capture.height,
            frame_rate: self.capture.frame_rate,
        }
    }

    pub fn encoder_config(&self) -> Result<EncoderConfig> {
        Ok(EncoderConfig {
            codec: self.encoder.codec.parse()?,
            bitrate_bps: self.encoder.bitrate_bps,
            chunk_interval: Duration::from_millis(self.encoder.chunk_interval_ms),
        })
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let profile = self.capture_profile();
        profile.validate()?;

        Ok(SessionConfig {
            base_url: self.server.base_url.clone(),
            profile,
            encoder: self.encoder_config()?,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }
}
