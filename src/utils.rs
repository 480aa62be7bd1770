use std::sync::{Mutex, MutexGuard, PoisonError};

use color_eyre::{eyre::eyre, Result};
use reqwest::Url;
use tracing::info;

use crate::capture::{decode_frame, HttpFetcher};
use crate::{CameraConfig, ConfigError};

/// `<base_url>/<capture_path>`, tolerant of a trailing slash on the base
pub fn capture_url(config: &CameraConfig) -> Result<Url, ConfigError> {
    let raw = format!(
        "{}/{}",
        config.base_url.trim_end_matches('/'),
        config.capture_path.trim_start_matches('/')
    );
    let url = Url::parse(&raw).map_err(|e| ConfigError::Url {
        url: raw.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Url {
            url: raw,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Lock a mutex, recovering the data if a previous holder panicked. Every
/// critical section in this crate leaves its data consistent.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch and decode one snapshot to confirm the camera is reachable.
/// Returns the frame dimensions.
pub async fn probe_camera(config: &CameraConfig) -> Result<(usize, usize)> {
    let mut fetcher = HttpFetcher::new(config)?;
    info!("Probing camera at {}", fetcher.url());

    let frame = fetcher
        .fetch_frame()
        .await
        .map_err(|e| eyre!("camera probe failed: {}", e))?;
    let image = decode_frame(&frame)?;

    info!(
        "Camera answered with a {}x{} frame ({} bytes, {:?})",
        image.width(),
        image.height(),
        frame.len(),
        frame.meta.fetch_latency
    );
    Ok((image.width(), image.height()))
}
