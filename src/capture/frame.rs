use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Encoded camera snapshot with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable encoded image (JPEG from the camera) - shared across tasks without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Arrival timestamp, taken when the body finished downloading
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Monotonic per-source counter, starting at 1
    pub sequence: u64,
    pub content_type: Option<String>,
    /// Request start to body complete
    pub fetch_latency: Duration,
}

impl Frame {
    pub fn new(sequence: u64, data: Bytes, content_type: Option<String>, fetch_latency: Duration) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                content_type,
                fetch_latency,
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("bytes", &self.data.len())
            .field("content_type", &self.meta.content_type)
            .finish()
    }
}
