//! Acquisition loop: fetch as fast as the network allows and feed the jitter buffer

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::{emit, PipelineEvent, PipelineShared};
use crate::capture::FrameSource;
use crate::utils::lock;

pub struct Producer<S> {
    source: S,
    shared: Arc<PipelineShared>,
    backoff: Duration,
    fetch_period: Option<Duration>,
}

impl<S: FrameSource> Producer<S> {
    pub fn new(source: S, shared: Arc<PipelineShared>, backoff: Duration) -> Self {
        Self {
            source,
            shared,
            backoff,
            fetch_period: None,
        }
    }

    /// Space fetch starts at least `period` apart
    pub fn with_fetch_period(mut self, period: Option<Duration>) -> Self {
        self.fetch_period = period;
        self
    }

    /// Runs until the shared running flag is cleared. Failures never end the
    /// loop: they are recorded, then followed by a fixed backoff.
    pub async fn run(mut self) {
        info!("Producer started");
        let mut next_slot = Instant::now();

        while self.shared.is_running() {
            if let Some(period) = self.fetch_period {
                tokio::time::sleep_until(next_slot).await;
                next_slot = (next_slot + period).max(Instant::now());
            }

            let result = self.source.next_frame().await;

            // a fetch that straddles stop must not touch shared state
            if !self.shared.is_running() {
                debug!("Discarding fetch result after stop");
                break;
            }

            match result {
                Ok(frame) => {
                    self.shared.stats.add_fetched(1);
                    let sequence = frame.sequence();
                    let depth = {
                        let mut buffer = lock(&self.shared.buffer);
                        if buffer.push(frame).is_some() {
                            self.shared.stats.add_dropped(1);
                        }
                        buffer.len()
                    };
                    trace!(sequence, depth, "frame buffered");
                }
                Err(e) => {
                    warn!("Fetch failed: {}", e);
                    self.shared.stats.add_fetch_errors(1);
                    let e = Arc::new(e);
                    self.shared.last_error.store(Some(e.clone()));
                    emit(&self.shared.events, PipelineEvent::FetchFailed(e));
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }

        info!("Producer stopped");
    }
}
