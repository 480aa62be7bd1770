use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use serde::Serialize;

/// Pipeline counters, mirrored into the `metrics` facade as they change
#[derive(Default)]
pub struct PipelineStats {
    counters: CachePadded<Counters>,
}

#[derive(Default)]
struct Counters {
    frames_fetched: AtomicU64,
    fetch_errors: AtomicU64,
    frames_dropped: AtomicU64,
    frames_displayed: AtomicU64,
    scans_started: AtomicU64,
    scans_rejected: AtomicU64,
    symbols_found: AtomicU64,
    scan_faults: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_fetched: u64,
    pub fetch_errors: u64,
    pub frames_dropped: u64,
    pub frames_displayed: u64,
    pub scans_started: u64,
    pub scans_rejected: u64,
    pub symbols_found: u64,
    pub scan_faults: u64,
}

macro_rules! counter_fn {
    ($fn_name:ident, $field:ident) => {
        pub fn $fn_name(&self, n: u64) {
            self.counters.$field.fetch_add(n, Ordering::Relaxed);
            metrics::counter!(stringify!($field)).increment(n);
        }
    };
}

impl PipelineStats {
    counter_fn!(add_fetched, frames_fetched);
    counter_fn!(add_fetch_errors, fetch_errors);
    counter_fn!(add_dropped, frames_dropped);
    counter_fn!(add_displayed, frames_displayed);
    counter_fn!(add_scans_started, scans_started);
    counter_fn!(add_scans_rejected, scans_rejected);
    counter_fn!(add_symbols_found, symbols_found);
    counter_fn!(add_scan_faults, scan_faults);

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            frames_fetched: c.frames_fetched.load(Ordering::Relaxed),
            fetch_errors: c.fetch_errors.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            frames_displayed: c.frames_displayed.load(Ordering::Relaxed),
            scans_started: c.scans_started.load(Ordering::Relaxed),
            scans_rejected: c.scans_rejected.load(Ordering::Relaxed),
            symbols_found: c.symbols_found.load(Ordering::Relaxed),
            scan_faults: c.scan_faults.load(Ordering::Relaxed),
        }
    }
}
