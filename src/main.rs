//! framecast: camera frames to H.264/RTP/UDP

mod cli;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use gstreamer as gst;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use framecast::launch;
use framecast::pipeline::StreamGroup;

/// Wait for Ctrl+C or SIGTERM, then raise the stop signal.
async fn wait_for_shutdown(stop: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = stop.cancelled() => return,
    }

    info!("Shutdown signal received");
    stop.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecast=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let Some(config) = cli::Cli::parse().into_config()? else {
        return Ok(());
    };

    info!("framecast launching {} stream(s)", config.streams.len());
    gst::init().map_err(|e| eyre!("Failed to initialize GStreamer: {}", e))?;

    let stop = CancellationToken::new();
    let mut group = StreamGroup::new();

    if let Err(e) = launch::spawn_streams(&config, &stop, &mut group) {
        // Tear down whatever already started before reporting
        stop.cancel();
        tokio::task::spawn_blocking(move || group.join_all()).await?;
        return Err(e);
    }

    let signals = tokio::spawn(wait_for_shutdown(stop.clone()));
    let results = tokio::task::spawn_blocking(move || group.join_all()).await?;
    stop.cancel();
    signals.await?;

    let mut failed = 0;
    for (name, reason) in &results {
        if reason.is_failure() {
            error!("[{}] Stream failed: {:?}", name, reason);
            failed += 1;
        } else {
            info!("[{}] Stream stopped: {:?}", name, reason);
        }
    }

    info!("framecast shutting down");
    if failed > 0 {
        return Err(eyre!("{} of {} stream(s) failed", failed, results.len()));
    }
    Ok(())
}
