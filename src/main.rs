use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facereg_capture::config::DEFAULT_CONFIG_PATH;
use facereg_capture::{create_router, AppState, CaptureSession, Config, DeviceSource};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facereg-capture")]
#[command(about = "Stream camera capture to the face-registration server")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Capture source: synthetic or file:<path to raw I420>
    #[arg(long, default_value = "synthetic", global = true)]
    source: DeviceSource,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one registration capture
    Capture {
        /// Registration subject (usually the username)
        #[arg(short, long)]
        session: String,

        /// Stop after this many seconds unless the server finishes first
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },
    /// Serve the HTTP control API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("facereg-capture v{}", env!("CARGO_PKG_VERSION"));
    info!("Registration server: {}", cfg.server.base_url);

    match cli.command {
        Command::Capture { session, duration } => {
            run_capture(&cfg, cli.source, &session, Duration::from_secs(duration)).await
        }
        Command::Serve => serve(&cfg, cli.source).await,
    }
}

async fn run_capture(
    cfg: &Config,
    source: DeviceSource,
    session_id: &str,
    duration: Duration,
) -> Result<()> {
    let session = CaptureSession::with_source(cfg.session_config()?, source);
    session.on_progress(|count| info!("📸 Samples accepted: {}", count));

    match timeout(cfg.connect_timeout(), session.connect(session_id)).await {
        Ok(result) => result.context("Failed to start capture")?,
        Err(_) => {
            session.stop();
            anyhow::bail!("Timed out after {:?} waiting for connect", cfg.connect_timeout());
        }
    }

    info!("✅ Streaming for up to {} seconds (Ctrl-C to stop)", duration.as_secs());

    let mut state_rx = session.subscribe_state();
    tokio::select! {
        _ = sleep(duration) => info!("Capture duration elapsed"),
        _ = tokio::signal::ctrl_c() => info!("🛑 Interrupted"),
        ended = state_rx.wait_for(|s| s.is_terminal()) => {
            if let Ok(state) = ended {
                info!("Session ended: {}", *state);
            }
        }
    }

    session.stop();

    let stats = session.stats();
    info!(
        "Sent {} chunks ({} bytes), dropped {} chunks and {} frames in {:.1}s",
        stats.chunks_sent,
        stats.bytes_sent,
        stats.chunks_dropped,
        stats.frames_dropped,
        stats.duration_secs
    );

    match session.outcome() {
        Some(outcome) => info!("Server verdict: {:?}", outcome),
        None => warn!("Server sent no verdict"),
    }

    Ok(())
}

async fn serve(cfg: &Config, source: DeviceSource) -> Result<()> {
    let state = AppState::new(cfg.session_config()?, source);
    let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")
}
