//! Streaming statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time statistics across all MJPEG connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerStats {
    /// Parts written completely
    pub frames_sent: u64,

    /// Frames re-encoded from raw pixels
    pub frames_encoded: u64,

    /// Bytes written to transports, framing included
    pub bytes_sent: u64,

    /// Frames whose encode failed
    pub encode_errors: u64,

    /// Transport write failures
    pub write_errors: u64,

    /// Connections currently streaming
    pub active_streams: u64,
}

impl StreamerStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Failed frames over all attempted frames
    pub fn error_rate(&self) -> f64 {
        let errors = self.encode_errors + self.write_errors;
        let total = self.frames_sent + errors;
        if total == 0 {
            return 0.0;
        }

        errors as f64 / total as f64
    }
}

/// Shared counters updated by every streaming connection
#[derive(Debug, Default)]
pub struct StreamCounters {
    frames_sent: AtomicU64,
    frames_encoded: AtomicU64,
    bytes_sent: AtomicU64,
    encode_errors: AtomicU64,
    write_errors: AtomicU64,
    active_streams: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self, bytes: u64, encoded: bool) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        if encoded {
            self.frames_encoded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_closed(&self) {
        // never wraps below zero if a close is reported twice
        let _ = self
            .active_streams
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self) -> StreamerStats {
        StreamerStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
        }
    }
}
