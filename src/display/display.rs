//! Display smoothing
//! Pulls the newest buffered frame on a fixed tick and publishes it as the
//! current display state. Staleness is resolved in favour of recency: older
//! buffered frames are flushed, not shown late.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::capture::Frame;
use crate::pipeline::PipelineShared;
use crate::scan::ScanScheduler;
use crate::utils::lock;

/// The frame currently on screen
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub frame: Frame,
    pub shown_at: Instant,
    /// Smoothed display rate at the time this frame was shown
    pub display_fps: f64,
}

impl DisplayFrame {
    pub fn sequence(&self) -> u64 {
        self.frame.sequence()
    }

    /// Encoded image bytes, ready for any image widget
    pub fn bytes(&self) -> &Bytes {
        &self.frame.data
    }

    pub fn content_type(&self) -> &str {
        self.frame
            .meta
            .content_type
            .as_deref()
            .unwrap_or("image/jpeg")
    }
}

/// Exponential moving average of the instantaneous display rate
#[derive(Debug, Default)]
pub struct FpsMeter {
    ema: Option<f64>,
    last: Option<Instant>,
}

impl FpsMeter {
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last.replace(now) {
            let dt = now.saturating_duration_since(last).as_secs_f64().max(1e-6);
            let instant = 1.0 / dt;
            self.ema = Some(match self.ema {
                Some(ema) => 0.9 * ema + 0.1 * instant,
                None => instant,
            });
        }
        self.ema.unwrap_or(0.0)
    }
}

pub struct DisplayConsumer {
    shared: Arc<PipelineShared>,
    interval: Duration,
    min_spacing: Duration,
    last_shown: Option<Instant>,
    last_sequence: u64,
    fps: FpsMeter,
    scheduler: Option<ScanScheduler>,
}

impl DisplayConsumer {
    pub fn new(shared: Arc<PipelineShared>, interval: Duration, scheduler: Option<ScanScheduler>) -> Self {
        Self {
            shared,
            interval,
            // ticks landing slightly early must not produce a second update
            min_spacing: interval / 2,
            last_shown: None,
            last_sequence: 0,
            fps: FpsMeter::default(),
            scheduler,
        }
    }

    /// One consumer step. Takes the newest buffered frame (flushing the rest) and
    /// publishes it if half an interval has passed since the last publish.
    pub fn tick(&mut self, now: Instant) -> Option<Arc<DisplayFrame>> {
        let stats = &self.shared.stats;
        let (frame, flushed) = lock(&self.shared.buffer).take_latest()?;
        stats.add_dropped(flushed);

        if frame.sequence() <= self.last_sequence {
            trace!(sequence = frame.sequence(), "older than the frame on screen");
            stats.add_dropped(1);
            return None;
        }
        if let Some(last) = self.last_shown {
            if now.saturating_duration_since(last) < self.min_spacing {
                trace!(sequence = frame.sequence(), "too soon after last update");
                stats.add_dropped(1);
                return None;
            }
        }

        self.last_shown = Some(now);
        self.last_sequence = frame.sequence();
        let shown = Arc::new(DisplayFrame {
            frame,
            shown_at: now,
            display_fps: self.fps.tick(now),
        });
        self.shared.display.store(Some(shown.clone()));
        stats.add_displayed(1);

        if let Some(scheduler) = &self.scheduler {
            scheduler.offer(&shown.frame);
        }
        Some(shown)
    }

    pub async fn run(mut self) {
        info!("Display consumer started ({:?} tick)", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.shared.is_running() {
            let now = ticker.tick().await;
            if !self.shared.is_running() {
                break;
            }
            if let Some(shown) = self.tick(now) {
                debug!(
                    "Showing frame {} ({:.1} fps)",
                    shown.sequence(),
                    shown.display_fps
                );
            }
        }

        info!("Display consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, Bytes::from_static(b"jpeg"), None, Duration::ZERO)
    }

    fn consumer(interval_ms: u64) -> (DisplayConsumer, Arc<PipelineShared>) {
        let (shared, _events) = PipelineShared::new(4, 8);
        let consumer = DisplayConsumer::new(shared.clone(), Duration::from_millis(interval_ms), None);
        (consumer, shared)
    }

    fn push(shared: &PipelineShared, seq: u64) {
        lock(&shared.buffer).push(frame(seq));
    }

    #[test]
    fn publishes_newest_and_flushes_buffer() {
        let (mut consumer, shared) = consumer(50);
        for seq in 1..=3 {
            push(&shared, seq);
        }

        let shown = consumer.tick(Instant::now()).unwrap();
        assert_eq!(shown.sequence(), 3);
        assert_eq!(shared.buffered(), 0);
        assert_eq!(shared.latest_frame().unwrap().sequence(), 3);

        let stats = shared.stats.snapshot();
        assert_eq!(stats.frames_displayed, 1);
        assert_eq!(stats.frames_dropped, 2);
    }

    #[test]
    fn empty_buffer_keeps_current_frame() {
        let (mut consumer, shared) = consumer(50);
        push(&shared, 1);
        let t0 = Instant::now();
        consumer.tick(t0).unwrap();

        assert!(consumer.tick(t0 + Duration::from_millis(50)).is_none());
        assert_eq!(shared.latest_frame().unwrap().sequence(), 1);
    }

    #[test]
    fn half_interval_gate_suppresses_early_updates() {
        let (mut consumer, shared) = consumer(50);
        let t0 = Instant::now();
        push(&shared, 1);
        consumer.tick(t0).unwrap();

        push(&shared, 2);
        assert!(consumer.tick(t0 + Duration::from_millis(24)).is_none());
        // the early frame was flushed, not held back
        assert_eq!(shared.buffered(), 0);
        assert_eq!(shared.latest_frame().unwrap().sequence(), 1);

        push(&shared, 3);
        let shown = consumer.tick(t0 + Duration::from_millis(25)).unwrap();
        assert_eq!(shown.sequence(), 3);
    }

    #[test]
    fn never_goes_back_in_time() {
        let (mut consumer, shared) = consumer(10);
        let t0 = Instant::now();
        push(&shared, 5);
        consumer.tick(t0).unwrap();

        push(&shared, 4);
        assert!(consumer.tick(t0 + Duration::from_millis(100)).is_none());

        let mut last = 5;
        for (i, seq) in [6, 9, 12].into_iter().enumerate() {
            push(&shared, seq - 1);
            push(&shared, seq);
            let shown = consumer
                .tick(t0 + Duration::from_millis(200 + 10 * i as u64))
                .unwrap();
            assert!(shown.sequence() > last);
            assert_eq!(shown.sequence(), seq);
            last = shown.sequence();
        }
    }

    #[test]
    fn fps_meter_smooths_rate() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();
        assert_eq!(meter.tick(t0), 0.0);
        let first = meter.tick(t0 + Duration::from_millis(50));
        assert!((first - 20.0).abs() < 1e-6);
        let second = meter.tick(t0 + Duration::from_millis(150));
        assert!((second - (0.9 * 20.0 + 0.1 * 10.0)).abs() < 1e-6);
    }
}
