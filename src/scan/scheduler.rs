//! Rate-limited, non-overlapping decode scheduling.
//!
//! `Idle -> Scanning` only when no scan is in flight and at least
//! `scan_every` has passed since the previous scan started. `Scanning -> Idle`
//! happens when the `ScanPermit` drops, which covers success, miss, fault and
//! a panicking decode task alike. Offers that find the gate closed are
//! dropped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::engine::{DecodeEngine, Symbol};
use super::reader::DecodeFault;
use crate::capture::{decode_frame, Frame};
use crate::pipeline::{emit, PipelineEvent, PipelineStats};
use crate::utils::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanState {
    Idle,
    Scanning,
}

pub struct ScanGate {
    scan_every: Duration,
    in_flight: AtomicBool,
    last_start: Mutex<Option<Instant>>,
    idle: Notify,
}

/// Proof of the single in-flight slot. Dropping it returns the gate to `Idle`.
pub struct ScanPermit {
    gate: Arc<ScanGate>,
}

impl ScanGate {
    pub fn new(scan_every: Duration) -> Arc<Self> {
        Arc::new(Self {
            scan_every,
            in_flight: AtomicBool::new(false),
            last_start: Mutex::new(None),
            idle: Notify::new(),
        })
    }

    /// Take the in-flight slot if the gate is open at `now`.
    pub fn try_begin(self: &Arc<Self>, now: Instant) -> Option<ScanPermit> {
        // check-and-set happens under the lock so concurrent offers cannot both win
        let mut last_start = lock(&self.last_start);
        if self.in_flight.load(Ordering::Acquire) {
            return None;
        }
        if let Some(prev) = *last_start {
            if now.saturating_duration_since(prev) < self.scan_every {
                return None;
            }
        }
        self.in_flight.store(true, Ordering::Release);
        *last_start = Some(now);
        Some(ScanPermit { gate: self.clone() })
    }

    pub fn state(&self) -> ScanState {
        if self.in_flight.load(Ordering::Acquire) {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    pub fn last_start(&self) -> Option<Instant> {
        *lock(&self.last_start)
    }

    /// Resolves once no scan is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.state() == ScanState::Idle {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::Release);
        self.gate.idle.notify_waiters();
    }
}

/// Runs the decode engine against offered frames, at most one at a time.
#[derive(Clone)]
pub struct ScanScheduler {
    gate: Arc<ScanGate>,
    engine: Arc<DecodeEngine>,
    recognized: Arc<ArcSwapOption<Symbol>>,
    stats: Arc<PipelineStats>,
    events: flume::Sender<PipelineEvent>,
}

impl ScanScheduler {
    pub fn new(
        engine: DecodeEngine,
        scan_every: Duration,
        stats: Arc<PipelineStats>,
        events: flume::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            gate: ScanGate::new(scan_every),
            engine: Arc::new(engine),
            recognized: Arc::new(ArcSwapOption::empty()),
            stats,
            events,
        }
    }

    pub fn state(&self) -> ScanState {
        self.gate.state()
    }

    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Latest successful decode. Misses and faults leave it untouched.
    pub fn recognized(&self) -> Option<Arc<Symbol>> {
        self.recognized.load_full()
    }

    pub async fn wait_idle(&self) {
        self.gate.wait_idle().await
    }

    /// Start a scan of `frame` if the gate is open. Returns whether a scan started.
    /// Must be called from within a tokio runtime.
    pub fn offer(&self, frame: &Frame) -> bool {
        let Some(permit) = self.gate.try_begin(Instant::now()) else {
            self.stats.add_scans_rejected(1);
            return false;
        };
        self.stats.add_scans_started(1);

        let frame = frame.clone();
        let engine = self.engine.clone();
        let recognized = self.recognized.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let _permit = permit;
            // let the display path run before the heavy work starts
            tokio::task::yield_now().await;

            let sequence = frame.sequence();
            let started = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || scan_frame(&engine, &frame)).await;
            metrics::histogram!("decode_time_ms").record(started.elapsed().as_secs_f64() * 1000.0);

            match outcome {
                Ok(Ok(Some(symbol))) => {
                    info!("Frame {}: {} '{}'", sequence, symbol.format, symbol.text);
                    stats.add_symbols_found(1);
                    let symbol = Arc::new(symbol);
                    recognized.store(Some(symbol.clone()));
                    emit(&events, PipelineEvent::SymbolDecoded(symbol));
                }
                Ok(Ok(None)) => debug!("Frame {}: no symbol", sequence),
                Ok(Err(fault)) => {
                    warn!("Frame {}: {}", sequence, fault);
                    stats.add_scan_faults(1);
                    emit(&events, PipelineEvent::ScanFault(fault.to_string()));
                }
                Err(e) => {
                    warn!("Frame {}: decode task failed: {}", sequence, e);
                    stats.add_scan_faults(1);
                    emit(&events, PipelineEvent::ScanFault(e.to_string()));
                }
            }
        });

        true
    }
}

/// Corrupt frames count as "nothing found"; only reader faults escape.
fn scan_frame(engine: &DecodeEngine, frame: &Frame) -> Result<Option<Symbol>, DecodeFault> {
    match decode_frame(frame) {
        Ok(image) => engine.decode(&image),
        Err(e) => {
            debug!("{}", e);
            Ok(None)
        }
    }
}
