//! Synthetic test-pattern frame producer
//!
//! Publishes moving colour bars into the shared [`FrameHolder`] at a fixed
//! rate, packed in whichever pixel format and addressing the configuration
//! asks for. Stands in for a camera when none is attached.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::convert::yuv;
use crate::encode::{self, EncodeError};
use crate::frame::{Frame, FrameBuffer, FrameError, FrameHolder, PixelFormat, RowAddressing};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("JPEG compression failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("render task failed: {0}")]
    Render(#[from] tokio::task::JoinError),

    #[error("source already running")]
    AlreadyRunning,
}

/// SMPTE-style bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 16),
    (16, 235, 235),
    (16, 235, 16),
    (235, 16, 235),
    (235, 16, 16),
    (16, 16, 235),
    (16, 16, 16),
];

/// Colour of pixel (`x`, `y`) in frame number `index`.
///
/// The top three quarters scroll the bars by two pixels per frame; the bottom
/// quarter is a static grey ramp.
pub fn pattern_pixel(width: usize, height: usize, x: usize, y: usize, index: u64) -> (u8, u8, u8) {
    if y >= height - height / 4 {
        let level = (x * 255 / width.max(2).saturating_sub(1)).min(255) as u8;
        return (level, level, level);
    }
    let bar_width = (width / BARS.len()).max(1);
    let shifted = (x + (index as usize * 2) % width) % width;
    BARS[(shifted / bar_width).min(BARS.len() - 1)]
}

fn pack_row(format: PixelFormat, width: usize, height: usize, y: usize, index: u64) -> Vec<u8> {
    let px = |x: usize| pattern_pixel(width, height, x, y, index);
    let mut row = Vec::with_capacity(width * format.bytes_per_pixel().unwrap_or(3));

    match format {
        PixelFormat::Grayscale => {
            row.extend((0..width).map(|x| {
                let (r, g, b) = px(x);
                yuv::rgb_to_yuv(r, g, b).0
            }));
        }
        PixelFormat::Rgb888 => {
            for x in 0..width {
                let (r, g, b) = px(x);
                row.extend_from_slice(&[b, g, r]);
            }
        }
        PixelFormat::Rgb565 => {
            for x in 0..width {
                let (r, g, b) = px(x);
                row.push((r & 0xF8) | (g >> 5));
                row.push(((g & 0x1C) << 3) | (b >> 3));
            }
        }
        PixelFormat::Yuv422 => {
            for x in (0..width).step_by(2) {
                let (r0, g0, b0) = px(x);
                let (r1, g1, b1) = px((x + 1).min(width - 1));
                let (y0, u0, v0) = yuv::rgb_to_yuv(r0, g0, b0);
                let (y1, u1, v1) = yuv::rgb_to_yuv(r1, g1, b1);
                let u = ((u0 as u16 + u1 as u16) / 2) as u8;
                let v = ((v0 as u16 + v1 as u16) / 2) as u8;
                row.extend_from_slice(&[y0, u, y1, v]);
            }
        }
        // JPEG frames are compressed from BGR rows
        PixelFormat::Jpeg => return pack_row(PixelFormat::Rgb888, width, height, y, index),
    }
    row
}

/// Renders frame number `index` as configured.
pub fn render_frame(config: &SourceConfig, index: u64) -> Result<Frame, SourceError> {
    let (width, height) = (config.width, config.height);
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimension { width, height }.into());
    }

    if config.format.is_jpeg() {
        let rows: Vec<Bytes> = (0..height)
            .map(|y| Bytes::from(pack_row(PixelFormat::Rgb888, width, height, y, index)))
            .collect();
        let raw = Frame::new(PixelFormat::Rgb888, FrameBuffer::Rows(rows), width, height)?;
        // sized for an uncompressed frame so nothing is ever clipped
        let image = encode::to_jpeg(&raw, config.quality, width * height * 3 + 4096)?;
        return Ok(Frame::jpeg(image.into_bytes(), width, height)?);
    }

    let rows = (0..height).map(|y| pack_row(config.format, width, height, y, index));
    let buffer = match config.addressing {
        RowAddressing::Rows => FrameBuffer::Rows(rows.map(Bytes::from).collect()),
        RowAddressing::Flat => FrameBuffer::Flat(Bytes::from(rows.flatten().collect::<Vec<u8>>())),
    };

    Ok(Frame::new(config.format, buffer, width, height)?)
}

/// Statistics for the pattern source
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pub frames_published: u64,
    pub render_errors: u64,
    pub is_running: bool,
}

/// Publishes test-pattern frames into a [`FrameHolder`]
pub struct PatternSource {
    config: SourceConfig,
    holder: Arc<FrameHolder>,
    task: Option<JoinHandle<()>>,

    // State
    is_running: Arc<AtomicBool>,

    // Statistics
    frame_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
}

impl PatternSource {
    pub fn new(config: SourceConfig, holder: Arc<FrameHolder>) -> Self {
        Self {
            config,
            holder,
            task: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes the first frame, then keeps publishing at the configured rate
    pub async fn start(&mut self) -> Result<(), SourceError> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(SourceError::AlreadyRunning);
        }

        info!(
            format = %self.config.format,
            addressing = ?self.config.addressing,
            resolution = %format!("{}x{}", self.config.width, self.config.height),
            fps = %self.config.fps,
            "Starting test-pattern source"
        );

        // rendering may compress a whole frame, so it stays off the async workers
        let config = Arc::new(self.config.clone());

        // a stream opened right after start must find a frame
        let first = {
            let config = Arc::clone(&config);
            tokio::task::spawn_blocking(move || render_frame(&config, 0)).await??
        };
        self.holder.publish(first);
        self.frame_count.store(1, Ordering::Relaxed);
        self.is_running.store(true, Ordering::Relaxed);

        let holder = Arc::clone(&self.holder);
        let is_running = Arc::clone(&self.is_running);
        let frame_count = Arc::clone(&self.frame_count);
        let error_count = Arc::clone(&self.error_count);
        let period = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            let mut index = 1u64;
            while is_running.load(Ordering::Relaxed) {
                ticker.tick().await;
                let config = Arc::clone(&config);
                match tokio::task::spawn_blocking(move || render_frame(&config, index)).await {
                    Ok(Ok(frame)) => {
                        holder.publish(frame);
                        frame_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, frame = index, "Failed to render test frame");
                        error_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(error = %e, frame = index, "Render task failed");
                        error_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
                index += 1;

                if index % 100 == 0 {
                    debug!(frames = %frame_count.load(Ordering::Relaxed), "Test-pattern progress");
                }
            }
        }));

        Ok(())
    }

    /// Stops publishing; the last frame stays in the holder
    pub async fn stop(&mut self) {
        if !self.is_running.swap(false, Ordering::Relaxed) {
            return;
        }

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        let stats = self.get_stats();
        info!(
            frames = %stats.frames_published,
            errors = %stats.render_errors,
            "Test-pattern source stopped"
        );
    }

    /// Gets source statistics
    pub fn get_stats(&self) -> SourceStats {
        SourceStats {
            frames_published: self.frame_count.load(Ordering::Relaxed),
            render_errors: self.error_count.load(Ordering::Relaxed),
            is_running: self.is_running.load(Ordering::Relaxed),
        }
    }

    /// Checks if the source is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl Drop for PatternSource {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
