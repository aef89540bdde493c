// SPDX-License-Identifier: GPL-3.0-only

//! Delivery of composited frames to the encoder and the preview
//!
//! The encoder write is mandatory and may block on pipe backpressure. The
//! preview is best effort: when its queue is full the new frame is dropped
//! and the frames already queued are kept.

use super::stats::StreamStats;
use crate::backends::camera::types::Frame;
use crate::backends::virtual_camera::EncoderLifecycle;
use crate::constants::PREVIEW_QUEUE_CAPACITY;
use crate::errors::BackendResult;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Result of offering a frame to the preview queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; the offered frame was discarded
    Dropped,
}

/// Bounded single-producer/single-consumer preview queue
///
/// Neither side ever waits for the other beyond the few instructions the
/// lock is held for.
#[derive(Debug)]
pub struct PreviewQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
}

impl PreviewQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Queue a frame unless the queue is full
    pub fn try_push(&self, frame: Frame) -> PushOutcome {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        if frames.len() >= self.capacity {
            return PushOutcome::Dropped;
        }
        frames.push_back(frame);
        PushOutcome::Queued
    }

    /// Oldest queued frame, if any
    pub fn try_pop(&self) -> Option<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Most recent frame, discarding anything older
    pub fn pop_latest(&self) -> Option<Frame> {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let latest = frames.pop_back();
        frames.clear();
        latest
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for PreviewQueue {
    fn default() -> Self {
        Self::new(PREVIEW_QUEUE_CAPACITY)
    }
}

/// Publishes each composited frame to the encoder and the preview queue
pub struct OutputFanout {
    encoder: EncoderLifecycle,
    preview: Arc<PreviewQueue>,
    stats: Arc<StreamStats>,
}

impl OutputFanout {
    pub fn new(
        encoder: EncoderLifecycle,
        preview: Arc<PreviewQueue>,
        stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            encoder,
            preview,
            stats,
        }
    }

    /// Write to the encoder, then offer to the preview
    ///
    /// An encoder error is returned without touching the preview.
    pub fn publish(&mut self, frame: Frame, show_preview: bool) -> BackendResult<()> {
        self.encoder.feed(&frame)?;

        if show_preview && self.preview.try_push(frame) == PushOutcome::Dropped {
            self.stats.record_preview_drop();
        }
        Ok(())
    }

    pub fn encoder(&self) -> &EncoderLifecycle {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut EncoderLifecycle {
        &mut self.encoder
    }

    /// Stop the encoder (flush and close its input)
    pub fn close(&mut self) {
        self.encoder.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_push_dropped() {
        let queue = PreviewQueue::new(2);
        assert_eq!(queue.try_push(Frame::black(2, 2)), PushOutcome::Queued);
        assert_eq!(queue.try_push(Frame::black(2, 2)), PushOutcome::Queued);
        assert_eq!(queue.try_push(Frame::black(4, 4)), PushOutcome::Dropped);
        assert_eq!(queue.len(), 2);
        // The queued frames are the originals
        assert_eq!(queue.try_pop().map(|f| f.width), Some(2));
    }

    #[test]
    fn test_fifo_order() {
        let queue = PreviewQueue::new(2);
        let mut first = Frame::black(2, 2);
        first.sequence = 1;
        let mut second = Frame::black(2, 2);
        second.sequence = 2;
        queue.try_push(first);
        queue.try_push(second);

        assert_eq!(queue.try_pop().map(|f| f.sequence), Some(1));
        assert_eq!(queue.try_pop().map(|f| f.sequence), Some(2));
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_latest_clears() {
        let queue = PreviewQueue::new(2);
        let mut newest = Frame::black(2, 2);
        newest.sequence = 9;
        queue.try_push(Frame::black(2, 2));
        queue.try_push(newest);
        assert_eq!(queue.pop_latest().map(|f| f.sequence), Some(9));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let queue = PreviewQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.try_push(Frame::black(1, 1)), PushOutcome::Queued);
    }
}
