//! Per-connection frame cadence

use std::time::Instant;

/// Interval between two successful frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInterval {
    pub elapsed_ms: u64,

    /// `None` when both frames landed within the same millisecond
    pub fps: Option<f64>,
}

impl FrameInterval {
    pub fn from_millis(elapsed_ms: u64) -> Self {
        let fps = (elapsed_ms > 0).then(|| 1000.0 / elapsed_ms as f64);
        Self { elapsed_ms, fps }
    }
}

/// Timestamp of the previous successful frame on a connection
#[derive(Debug, Clone, Default)]
pub struct StreamTiming {
    last_frame: Option<Instant>,
}

impl StreamTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful frame at `now`.
    ///
    /// The first frame after construction or [`reset`](Self::reset) only sets
    /// the reference point and yields no interval.
    pub fn mark(&mut self, now: Instant) -> Option<FrameInterval> {
        let previous = self.last_frame.replace(now)?;
        let elapsed = now.saturating_duration_since(previous);
        Some(FrameInterval::from_millis(elapsed.as_millis() as u64))
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }

    pub fn is_set(&self) -> bool {
        self.last_frame.is_some()
    }
}
