//! camscan: headless camera snapshot pipeline with live symbol scanning

use std::path::PathBuf;
use std::time::Duration;

use camscan::{utils, CameraPipeline, Config, PipelineEvent};
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STATS_EVERY: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camscan=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camscan launching...");

    // Load configuration: optional TOML path as the only argument
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    if let Err(e) = utils::probe_camera(&config.camera).await {
        warn!("{:#}; starting anyway", e);
    }

    let pipeline = CameraPipeline::start(&config)?;
    let events = pipeline.events();
    let mut stats_ticker = tokio::time::interval(STATS_EVERY);
    stats_ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
            event = events.recv_async() => match event {
                Ok(PipelineEvent::SymbolDecoded(symbol)) => {
                    info!(
                        "Decoded {} '{}' (scale {}, region {}, {}°, {:?}, {:?})",
                        symbol.format,
                        symbol.text,
                        symbol.attempt.scale,
                        symbol.attempt.region,
                        symbol.attempt.rotation.degrees(),
                        symbol.attempt.binarizer,
                        symbol.attempt.polarity,
                    );
                }
                Ok(PipelineEvent::ScanFault(fault)) => warn!("Scan fault: {}", fault),
                Ok(PipelineEvent::FetchFailed(_)) => {}
                Err(_) => break,
            },
            _ = stats_ticker.tick() => {
                let stats = pipeline.stats();
                let fps = pipeline.latest_frame().map_or(0.0, |f| f.display_fps);
                info!(
                    "{:.1} fps | fetched {} | errors {} | dropped {} | shown {} | scans {} | found {}",
                    fps,
                    stats.frames_fetched,
                    stats.fetch_errors,
                    stats.frames_dropped,
                    stats.frames_displayed,
                    stats.scans_started,
                    stats.symbols_found,
                );
                if let Some(e) = pipeline.last_error() {
                    warn!("Last fetch error: {}", e);
                    pipeline.dismiss_error();
                }
            }
        }
    }

    pipeline.stop().await;
    info!("camscan shutting down");
    Ok(())
}
