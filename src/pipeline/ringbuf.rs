//! Bounded jitter buffer between the producer and the display consumer

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Newest-wins frame buffer.
///
/// The producer appends and the oldest frame is evicted once `max_frames` is
/// reached. The consumer does not dequeue one frame at a time: it takes the
/// newest frame and flushes everything older.
pub struct JitterBuffer {
    ring: HeapRb<Frame>,
    max_frames: usize,
}

impl JitterBuffer {
    pub fn new(max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            ring: HeapRb::new(max_frames),
            max_frames,
        }
    }

    /// Producer: append a frame, returning the evicted oldest frame if the buffer was full
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        self.ring.push_overwrite(frame)
    }

    /// Consumer: take the newest frame and discard the rest.
    /// Returns the frame and how many older frames were flushed with it.
    pub fn take_latest(&mut self) -> Option<(Frame, u64)> {
        let mut latest = None;
        let mut taken = 0u64;
        for frame in self.ring.pop_iter() {
            latest = Some(frame);
            taken += 1;
        }
        latest.map(|frame| (frame, taken - 1))
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }
}
