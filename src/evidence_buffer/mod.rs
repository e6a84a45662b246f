//! Video Evidence Buffer
//!
//! Bounded FIFO of (raw, annotated) frame pairs owned by one camera session.
//! Capacity tracks the measured frame rate (ten seconds of evidence); while
//! the rate is unknown a fixed frame count is used. `append` becomes a no-op
//! once full until the clip is flushed.

use std::sync::Arc;

use image::RgbImage;

/// Frames captured when fps is unknown.
pub const FALLBACK_CAPACITY: usize = 40;

/// Seconds of evidence a full clip covers.
const CLIP_SECONDS: usize = 10;

/// A completed clip: parallel raw/annotated sequences plus the capture rate.
#[derive(Debug, Clone)]
pub struct EvidenceClip {
    pub raw_frames: Vec<Arc<RgbImage>>,
    pub annotated_frames: Vec<Arc<RgbImage>>,
    pub fps: u32,
}

/// Capacity for a measured frame rate.
pub fn capacity_for_fps(fps: u32) -> usize {
    if fps == 0 {
        FALLBACK_CAPACITY
    } else {
        fps as usize * CLIP_SECONDS
    }
}

/// EvidenceBuffer instance.
pub struct EvidenceBuffer {
    raw: Vec<Arc<RgbImage>>,
    annotated: Vec<Arc<RgbImage>>,
    capacity: usize,
    fps: u32,
}

impl EvidenceBuffer {
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            annotated: Vec::new(),
            capacity: FALLBACK_CAPACITY,
            fps: 0,
        }
    }

    /// Update the measured frame rate; the new capacity applies from the
    /// next append.
    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
        self.capacity = capacity_for_fps(fps);
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.raw.len() >= self.capacity
    }

    /// Append a frame pair. No-op at capacity; returns whether the buffer is
    /// full after the call.
    pub fn append(&mut self, raw: Arc<RgbImage>, annotated: Arc<RgbImage>) -> bool {
        if self.raw.len() < self.capacity {
            self.raw.push(raw);
            self.annotated.push(annotated);
        }
        self.is_full()
    }

    /// Hand out the accumulated clip and reset to empty. Never blocks.
    pub fn flush(&mut self) -> EvidenceClip {
        EvidenceClip {
            raw_frames: std::mem::take(&mut self.raw),
            annotated_frames: std::mem::take(&mut self.annotated),
            fps: self.fps,
        }
    }
}

impl Default for EvidenceBuffer {
    fn default() -> Self {
        Self::new()
    }
}
