// Example: Encode a capture source into chunk files without a server
//
// Runs the same device -> encoder pipeline a capture session streams, but
// writes each non-empty chunk to disk so the container can be inspected.
//
// Usage: cargo run --example encode_chunks -- --duration 5 --output-dir /tmp/chunks
//        cargo run --example encode_chunks -- --source file:face.yuv

use anyhow::{Context, Result};
use clap::Parser;
use facereg_capture::capture::{CaptureDeviceFactory, CaptureProfile, DeviceSource};
use facereg_capture::encoder::{ChunkHeader, Codec, EncoderConfig, MediaEncoder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "encode_chunks")]
#[command(about = "Encode a capture source into chunk files")]
struct Args {
    /// Seconds to capture
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// synthetic | file:<path>
    #[arg(short, long, default_value = "synthetic")]
    source: DeviceSource,

    /// gray8 | i420
    #[arg(short, long, default_value = "gray8")]
    codec: Codec,

    #[arg(short, long, default_value = "chunks")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    let profile = CaptureProfile::default();
    let config = EncoderConfig {
        codec: args.codec,
        ..EncoderConfig::default()
    };

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let mut device = CaptureDeviceFactory::create(args.source);
    info!("Device: {}", device.name());

    let frames = device.acquire(&profile).await?;
    let mut encoder = MediaEncoder::new(config, profile).start(frames);
    let mut chunks = encoder.take_chunks().context("chunk stream already taken")?;

    let writer = {
        let output_dir = args.output_dir.clone();
        tokio::spawn(async move {
            let mut written = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                if chunk.is_empty() {
                    continue;
                }
                let (header, _) = ChunkHeader::parse(&chunk.data)?;
                let path = output_dir.join(format!("chunk_{:05}.frc", header.index));
                tokio::fs::write(&path, &chunk.data).await?;
                written.push((path, chunk.frame_count, chunk.len()));
            }
            anyhow::Ok(written)
        })
    };

    tokio::time::sleep(Duration::from_secs(args.duration)).await;

    // Same order as session teardown: encoder first, then the device
    encoder.stop();
    device.release()?;

    let written = writer.await??;
    info!("Wrote {} chunks:", written.len());
    for (path, frames, bytes) in &written {
        info!("  - {} ({} frames, {} bytes)", path.display(), frames, bytes);
    }

    Ok(())
}
