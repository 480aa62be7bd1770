//! Acquisition + display smoothing, wired to the decode scheduler.
//!
//! ```text
//! Producer --push--> JitterBuffer --take_latest--> DisplayConsumer --offer--> ScanScheduler
//! ```

pub mod producer;
pub mod ringbuf;
pub mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use color_eyre::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use producer::Producer;
pub use ringbuf::JitterBuffer;
pub use stats::{PipelineStats, StatsSnapshot};

use crate::capture::{FetchError, FrameSource, HttpFetcher};
use crate::display::{DisplayConsumer, DisplayFrame};
use crate::scan::{DecodeEngine, ScanScheduler, ScanState, Symbol};
use crate::Config;

/// Notifications for the caller. Frames are not announced; poll
/// [`CameraPipeline::latest_frame`] at the display rate instead.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    FetchFailed(Arc<FetchError>),
    SymbolDecoded(Arc<Symbol>),
    ScanFault(String),
}

/// Send without ever blocking the pipeline; a full channel drops the event.
pub(crate) fn emit(events: &flume::Sender<PipelineEvent>, event: PipelineEvent) {
    if let Err(flume::TrySendError::Full(event)) = events.try_send(event) {
        debug!("event channel full, dropping {:?}", event);
    }
}

/// State shared by the producer and consumer tasks
pub struct PipelineShared {
    running: AtomicBool,
    pub(crate) buffer: Mutex<JitterBuffer>,
    pub(crate) last_error: ArcSwapOption<FetchError>,
    pub(crate) display: ArcSwapOption<DisplayFrame>,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) events: flume::Sender<PipelineEvent>,
}

impl PipelineShared {
    pub fn new(max_frames: usize, event_capacity: usize) -> (Arc<Self>, flume::Receiver<PipelineEvent>) {
        let (tx, rx) = flume::bounded(event_capacity.max(1));
        let shared = Arc::new(Self {
            running: AtomicBool::new(true),
            buffer: Mutex::new(JitterBuffer::new(max_frames)),
            last_error: ArcSwapOption::empty(),
            display: ArcSwapOption::empty(),
            stats: Arc::new(PipelineStats::default()),
            events: tx,
        });
        (shared, rx)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn buffered(&self) -> usize {
        crate::utils::lock(&self.buffer).len()
    }

    pub fn last_error(&self) -> Option<Arc<FetchError>> {
        self.last_error.load_full()
    }

    pub fn latest_frame(&self) -> Option<Arc<DisplayFrame>> {
        self.display.load_full()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn events(&self) -> flume::Sender<PipelineEvent> {
        self.events.clone()
    }
}

/// Handle to a running camera pipeline
pub struct CameraPipeline {
    shared: Arc<PipelineShared>,
    scheduler: Option<ScanScheduler>,
    events: flume::Receiver<PipelineEvent>,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl CameraPipeline {
    /// Start fetching from the configured camera endpoint. Must be called from a tokio runtime.
    pub fn start(config: &Config) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config.camera)?;
        Ok(Self::with_source(config, fetcher))
    }

    /// Start the pipeline on any frame source. Must be called from a tokio runtime.
    pub fn with_source<S: FrameSource>(config: &Config, source: S) -> Self {
        let pipeline = &config.pipeline;
        let (shared, events) = PipelineShared::new(pipeline.max_frames(), pipeline.event_capacity);

        let scheduler = config.scan.enabled.then(|| {
            ScanScheduler::new(
                DecodeEngine::from_config(&config.scan),
                config.scan.scan_every(),
                shared.stats(),
                shared.events(),
            )
        });

        info!(
            "Starting pipeline: {} fps display, {} frame buffer, scan every {}ms{}",
            pipeline.target_fps,
            pipeline.max_frames(),
            config.scan.scan_every_ms,
            if scheduler.is_some() { "" } else { " (disabled)" }
        );

        let producer = Producer::new(source, shared.clone(), pipeline.error_backoff())
            .with_fetch_period(config.camera.fetch_period());
        let consumer = DisplayConsumer::new(shared.clone(), pipeline.tick_interval(), scheduler.clone());

        Self {
            producer: tokio::spawn(producer.run()),
            consumer: tokio::spawn(consumer.run()),
            shared,
            scheduler,
            events,
        }
    }

    /// Most recently displayed frame
    pub fn latest_frame(&self) -> Option<Arc<DisplayFrame>> {
        self.shared.latest_frame()
    }

    /// Most recent successful decode; survives later misses
    pub fn recognized(&self) -> Option<Arc<Symbol>> {
        self.scheduler.as_ref().and_then(|s| s.recognized())
    }

    pub fn scan_state(&self) -> ScanState {
        self.scheduler
            .as_ref()
            .map_or(ScanState::Idle, |s| s.state())
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_state() == ScanState::Scanning
    }

    /// Most recent fetch failure, until dismissed or replaced
    pub fn last_error(&self) -> Option<Arc<FetchError>> {
        self.shared.last_error()
    }

    pub fn dismiss_error(&self) {
        self.shared.last_error.store(None);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn events(&self) -> flume::Receiver<PipelineEvent> {
        self.events.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop both loops and wait for them, then for any scan already in flight.
    pub async fn stop(self) {
        info!("Stopping pipeline");
        self.shared.stop();

        for (name, handle) in [("producer", self.producer), ("consumer", self.consumer)] {
            if let Err(e) = handle.await {
                warn!("{} task ended abnormally: {}", name, e);
            }
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.wait_idle().await;
        }
    }
}
