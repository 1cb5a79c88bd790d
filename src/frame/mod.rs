//! Current-frame model: descriptors, immutable snapshots and the shared slot

mod format;
mod holder;

pub use format::{PixelFormat, RowAddressing};
pub use holder::FrameHolder;

use bytes::Bytes;
use std::time::Instant;
use thiserror::Error;

use crate::jpeg::{self, JpegParseError};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame dimensions must be > 0, got {width}x{height}")]
    ZeroDimension { width: usize, height: usize },

    #[error("frame buffer is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("frame has {actual} rows, expected {expected}")]
    RowCount { expected: usize, actual: usize },

    #[error("row {line} is {actual} bytes, expected at least {expected}")]
    ShortRow {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("YUV422 frames need an even width, got {0}")]
    OddWidth(usize),

    #[error("JPEG frames must use flat addressing")]
    JpegRows,

    #[error("invalid JPEG frame: {0}")]
    Jpeg(#[from] JpegParseError),

    #[error("JPEG frame declared as {}x{}, header says {}x{}", declared.0, declared.1, actual.0, actual.1)]
    JpegGeometry {
        declared: (usize, usize),
        actual: (u16, u16),
    },
}

/// Pixel storage of a frame. Both variants share the producer's buffers.
#[derive(Debug, Clone)]
pub enum FrameBuffer {
    /// Rows packed back to back
    Flat(Bytes),

    /// One buffer per row
    Rows(Vec<Bytes>),
}

impl FrameBuffer {
    pub fn addressing(&self) -> RowAddressing {
        match self {
            FrameBuffer::Flat(_) => RowAddressing::Flat,
            FrameBuffer::Rows(_) => RowAddressing::Rows,
        }
    }
}

/// Metadata of a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub format: PixelFormat,
    pub width: usize,
    pub height: usize,
    pub byte_size: usize,
    pub addressing: RowAddressing,
}

/// Immutable frame snapshot
///
/// A `Frame` is built once by the producer and never mutated afterwards, so a
/// reader holding an `Arc<Frame>` always sees a descriptor that matches its
/// buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    descriptor: FrameDescriptor,
    buffer: FrameBuffer,
    captured_at: Instant,
}

impl Frame {
    /// Builds a raw (non-JPEG) frame after checking the buffer against the
    /// descriptor.
    pub fn new(
        format: PixelFormat,
        buffer: FrameBuffer,
        width: usize,
        height: usize,
    ) -> Result<Self, FrameError> {
        let Some(bpp) = format.bytes_per_pixel() else {
            return match buffer {
                FrameBuffer::Flat(data) => Self::jpeg(data, width, height),
                FrameBuffer::Rows(_) => Err(FrameError::JpegRows),
            };
        };

        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        if format == PixelFormat::Yuv422 && width % 2 != 0 {
            return Err(FrameError::OddWidth(width));
        }

        let stride = width * bpp;
        let byte_size = stride * height;

        match &buffer {
            FrameBuffer::Flat(data) => {
                if data.len() != byte_size {
                    return Err(FrameError::SizeMismatch {
                        expected: byte_size,
                        actual: data.len(),
                    });
                }
            }
            FrameBuffer::Rows(rows) => {
                if rows.len() != height {
                    return Err(FrameError::RowCount {
                        expected: height,
                        actual: rows.len(),
                    });
                }
                if let Some((line, row)) = rows.iter().enumerate().find(|(_, r)| r.len() < stride) {
                    return Err(FrameError::ShortRow {
                        line,
                        expected: stride,
                        actual: row.len(),
                    });
                }
            }
        }

        Ok(Self {
            descriptor: FrameDescriptor {
                format,
                width,
                height,
                byte_size,
                addressing: buffer.addressing(),
            },
            buffer,
            captured_at: Instant::now(),
        })
    }

    /// Wraps an already compressed JPEG image whose SOF header matches the
    /// declared geometry.
    pub fn jpeg(data: Bytes, width: usize, height: usize) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        jpeg::validate_jpeg(&data)?;
        let info = jpeg::read_header(&data)?;
        if (info.width as usize, info.height as usize) != (width, height) {
            return Err(FrameError::JpegGeometry {
                declared: (width, height),
                actual: (info.width, info.height),
            });
        }

        Ok(Self {
            descriptor: FrameDescriptor {
                format: PixelFormat::Jpeg,
                width,
                height,
                byte_size: data.len(),
                addressing: RowAddressing::Flat,
            },
            buffer: FrameBuffer::Flat(data),
            captured_at: Instant::now(),
        })
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.descriptor
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    pub fn width(&self) -> usize {
        self.descriptor.width
    }

    pub fn height(&self) -> usize {
        self.descriptor.height
    }

    pub fn is_jpeg(&self) -> bool {
        self.descriptor.format.is_jpeg()
    }

    /// The compressed bitstream of a JPEG frame
    pub fn jpeg_data(&self) -> Option<&Bytes> {
        match (&self.buffer, self.is_jpeg()) {
            (FrameBuffer::Flat(data), true) => Some(data),
            _ => None,
        }
    }

    /// Time the snapshot was built
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}
