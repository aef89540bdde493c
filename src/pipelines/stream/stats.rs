// SPDX-License-Identifier: GPL-3.0-only

//! Streaming counters shared between the worker and the UI

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the pipeline worker
#[derive(Debug, Default)]
pub struct StreamStats {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    preview_drops: AtomicU64,
    encoder_restarts: AtomicU64,
    segmentation_fallbacks: AtomicU64,
    last_frame_us: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub preview_drops: u64,
    pub encoder_restarts: u64,
    pub segmentation_fallbacks: u64,
    /// Processing time of the most recent frame in microseconds
    pub last_frame_us: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, elapsed_us: u64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.last_frame_us.store(elapsed_us, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preview_drop(&self) {
        self.preview_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.encoder_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segmentation_fallback(&self) {
        self.segmentation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            preview_drops: self.preview_drops.load(Ordering::Relaxed),
            encoder_restarts: self.encoder_restarts.load(Ordering::Relaxed),
            segmentation_fallbacks: self.segmentation_fallbacks.load(Ordering::Relaxed),
            last_frame_us: self.last_frame_us.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} skipped, {} preview drops, {} restarts, {} passthrough",
            self.frames_processed,
            self.frames_skipped,
            self.preview_drops,
            self.encoder_restarts,
            self.segmentation_fallbacks
        )
    }
}
