//! Vibrator service daemon (vibrad)

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vibrad_service::{ServiceConfig, VibratorService};

/// Force-feedback vibrator service.
#[derive(Parser, Debug)]
#[command(name = "vibrad", version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); platform defaults apply when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vibrator device node override
    #[arg(long)]
    device: Option<PathBuf>,

    /// Control socket path override
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "vibrad=debug,vibrad_service=debug,vibrad_ff=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.device_path = device;
    }
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    info!("starting vibrad v{}", env!("CARGO_PKG_VERSION"));
    let service = VibratorService::open(config)?;
    service.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}
