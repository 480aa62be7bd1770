pub mod capture;
pub mod display;
pub mod pipeline;
pub mod scan;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capture::{Frame, FrameMetadata};
pub use display::DisplayFrame;
pub use pipeline::{CameraPipeline, PipelineEvent, StatsSnapshot};
pub use scan::{Recognition, ScanState, Symbol, SymbolFormat};

/// Environment prefix for configuration overrides, e.g. `CAMSCAN__PIPELINE__TARGET_FPS=25`
pub const ENV_PREFIX: &str = "CAMSCAN";

/// Upper bound on `pipeline.buffer_ms`
pub const MAX_BUFFER_MS: u64 = 10_000;
/// Upper bound on the derived jitter buffer capacity
pub const MAX_BUFFERED_FRAMES: usize = 1024;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub pipeline: PipelineConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub base_url: String,
    pub capture_path: String,
    pub timeout_ms: u64,
    /// TCP connect deadline, capped by `timeout_ms`
    pub connect_timeout_ms: u64,
    /// Larger snapshot bodies are rejected
    pub max_frame_bytes: usize,
    pub user_agent: String,
    /// Upper bound on the fetch rate. Unset means as fast as the network allows.
    pub max_fetch_fps: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_fps: f64,
    pub buffer_ms: u64,
    pub error_backoff_ms: u64,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub enabled: bool,
    pub scan_every_ms: u64,
    pub scales: Vec<f32>,
    pub regions: Vec<f32>,
    pub formats: Vec<SymbolFormat>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".into(),
            capture_path: "capture.jpg".into(),
            timeout_ms: 1000,
            connect_timeout_ms: 500,
            max_frame_bytes: 4 * 1024 * 1024,
            user_agent: concat!("camscan/", env!("CARGO_PKG_VERSION")).into(),
            max_fetch_fps: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 20.0,
            buffer_ms: 100,
            error_backoff_ms: 100,
            event_capacity: 64,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_every_ms: 180,
            scales: vec![1.0, 1.5, 2.0],
            regions: vec![1.0, 0.6, 0.35],
            formats: vec![SymbolFormat::Qr, SymbolFormat::Ean13],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid camera url '{url}': {reason}")]
    Url { url: String, reason: String },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl Config {
    /// Layer built-in defaults, an optional TOML file and `CAMSCAN__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scan.scales")
                    .with_list_parse_key("scan.regions")
                    .with_list_parse_key("scan.formats"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        utils::capture_url(&self.camera)?;

        if self.camera.timeout_ms == 0 {
            return Err(invalid("camera.timeout_ms", "must be positive"));
        }
        if self.camera.connect_timeout_ms == 0 {
            return Err(invalid("camera.connect_timeout_ms", "must be positive"));
        }
        if self.camera.max_frame_bytes == 0 {
            return Err(invalid("camera.max_frame_bytes", "must be positive"));
        }
        if let Some(fps) = self.camera.max_fetch_fps {
            if !positive_finite(fps) {
                return Err(invalid("camera.max_fetch_fps", "must be positive and finite"));
            }
        }
        if !positive_finite(self.pipeline.target_fps) {
            return Err(invalid("pipeline.target_fps", "must be positive and finite"));
        }
        if self.pipeline.buffer_ms > MAX_BUFFER_MS {
            return Err(invalid("pipeline.buffer_ms", "must be at most 10000"));
        }
        if self.pipeline.max_frames() > MAX_BUFFERED_FRAMES {
            return Err(invalid(
                "pipeline.buffer_ms",
                "buffer_ms x target_fps holds more than 1024 frames",
            ));
        }
        if self.pipeline.event_capacity == 0 {
            return Err(invalid("pipeline.event_capacity", "must be positive"));
        }
        if self.scan.scales.is_empty() || self.scan.scales.iter().any(|s| !positive_finite(*s as f64)) {
            return Err(invalid("scan.scales", "need at least one factor, all finite and > 0"));
        }
        if self.scan.regions.is_empty()
            || self.scan.regions.iter().any(|r| !(positive_finite(*r as f64) && *r <= 1.0))
        {
            return Err(invalid("scan.regions", "need at least one height in (0, 1]"));
        }
        if self.scan.formats.is_empty() {
            return Err(invalid("scan.formats", "need at least one symbol format"));
        }
        Ok(())
    }
}

fn positive_finite(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

impl CameraConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.min(self.timeout_ms))
    }

    /// Minimum spacing between fetch starts, if pacing is enabled
    pub fn fetch_period(&self) -> Option<Duration> {
        self.max_fetch_fps
            .filter(|fps| *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps))
    }
}

impl PipelineConfig {
    /// Jitter buffer capacity: `round(buffer_ms / 1000 * target_fps) + 1`
    pub fn max_frames(&self) -> usize {
        ((self.buffer_ms as f64 / 1000.0 * self.target_fps).round() as usize).saturating_add(1)
    }

    /// Display tick interval: `floor(1000 / target_fps)` ms, never below 5ms
    pub fn tick_interval(&self) -> Duration {
        let ms = (1000.0 / self.target_fps).floor() as u64;
        Duration::from_millis(ms.max(5))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl ScanConfig {
    pub fn scan_every(&self) -> Duration {
        Duration::from_millis(self.scan_every_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn max_frames_follows_buffer_depth() {
        let pipeline = PipelineConfig {
            target_fps: 25.0,
            buffer_ms: 100,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.max_frames(), 4);

        let pipeline = PipelineConfig {
            target_fps: 20.0,
            buffer_ms: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.max_frames(), 1);
    }

    #[test]
    fn tick_interval_is_floored_and_clamped() {
        let mut pipeline = PipelineConfig::default();
        pipeline.target_fps = 30.0;
        assert_eq!(pipeline.tick_interval(), Duration::from_millis(33));

        pipeline.target_fps = 1000.0;
        assert_eq!(pipeline.tick_interval(), Duration::from_millis(5));
    }

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_regions_and_rates() {
        let mut config = Config::default();
        config.scan.regions = vec![1.0, 1.5];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "scan.regions", .. })
        ));

        let mut config = Config::default();
        config.pipeline.target_fps = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::Url { .. })));
    }

    #[test]
    fn rejects_non_finite_rates() {
        let mut config = Config::default();
        config.pipeline.target_fps = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "pipeline.target_fps", .. })
        ));
        // saturates instead of overflowing even when unvalidated
        assert_eq!(config.pipeline.max_frames(), usize::MAX);

        let mut config = Config::default();
        config.pipeline.target_fps = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.max_fetch_fps = Some(f64::INFINITY);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "camera.max_fetch_fps", .. })
        ));

        let mut config = Config::default();
        config.scan.scales = vec![1.0, f32::INFINITY];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "scan.scales", .. })
        ));

        let mut config = Config::default();
        config.scan.regions = vec![f32::NAN];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_buffer() {
        let mut config = Config::default();
        config.pipeline.buffer_ms = MAX_BUFFER_MS;
        config.validate().unwrap();

        config.pipeline.buffer_ms = MAX_BUFFER_MS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "pipeline.buffer_ms", .. })
        ));

        let mut config = Config::default();
        config.pipeline.target_fps = 1e6;
        assert!(config.pipeline.max_frames() > MAX_BUFFERED_FRAMES);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "pipeline.buffer_ms", .. })
        ));
    }

    #[test]
    fn connect_timeout_never_exceeds_request_timeout() {
        let mut camera = CameraConfig::default();
        assert_eq!(camera.connect_timeout(), Duration::from_millis(500));

        camera.timeout_ms = 300;
        assert_eq!(camera.connect_timeout(), Duration::from_millis(300));

        camera.connect_timeout_ms = 0;
        let mut config = Config::default();
        config.camera = camera;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
base_url = "http://10.0.0.7:8080"
timeout_ms = 600

[pipeline]
target_fps = 25.0

[scan]
scan_every_ms = 150
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.camera.base_url, "http://10.0.0.7:8080");
        assert_eq!(config.camera.timeout_ms, 600);
        assert_eq!(config.camera.capture_path, "capture.jpg");
        assert_eq!(config.pipeline.target_fps, 25.0);
        assert_eq!(config.pipeline.buffer_ms, 100);
        assert_eq!(config.scan.scan_every_ms, 150);
        assert!(config.scan.enabled);
    }
}
