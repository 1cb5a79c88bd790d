//! JPEG encoder pipeline
//!
//! Pushes a row-addressed frame scanline by scanline through the `mozjpeg-rs`
//! streaming encoder, or hands flat frames to the `image` crate. Both write
//! through an [`OutputSink`] in fixed-size chunks.

mod flat;
pub mod sink;

pub use sink::{BoundedMemorySink, CallbackSink, OutputSink, SinkError, SinkWriter};

use bytes::Bytes;
use mozjpeg_rs::Subsampling;
use std::io::{self, BufWriter, Write};
use thiserror::Error;
use tracing::debug;

use crate::convert::{self, ConvertError, RowSource};
use crate::frame::{Frame, FrameBuffer, PixelFormat};
use sink::CHUNK_SIZE;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("{0} frames cannot be encoded")]
    UnsupportedFormat(PixelFormat),

    #[error("failed to allocate {0} bytes")]
    Allocation(usize),

    #[error("scanline {line} conversion failed: {source}")]
    Scanline {
        line: usize,
        #[source]
        source: ConvertError,
    },

    #[error("encoder output rejected: {0}")]
    Output(#[from] SinkError),

    #[error("compression failed: {0}")]
    Compress(#[from] mozjpeg_rs::Error),

    #[error("flat buffer encode failed: {0}")]
    Flat(#[from] image::ImageError),

    #[error("encoder write failed: {0}")]
    Write(#[source] io::Error),
}

/// Clamps a requested quality into 1..=100.
pub fn clamp_quality(quality: u32) -> u8 {
    quality.clamp(1, 100) as u8
}

/// Runs `compress` against a chunking writer over `sink`, then signals end
/// of image. A rejecting sink surfaces as [`EncodeError::Output`] whatever
/// error the encoder wrapped it in.
fn write_through<S, F>(sink: &mut S, compress: F) -> Result<(), EncodeError>
where
    S: OutputSink + ?Sized,
    F: FnOnce(&mut dyn Write) -> Result<(), EncodeError>,
{
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, SinkWriter::new(&mut *sink));
    let result = compress(&mut writer).and_then(|()| writer.flush().map_err(EncodeError::Write));

    // unflushed bytes are dropped on failure rather than offered to the sink again
    let (inner, _) = writer.into_parts();
    if let Some(err) = inner.into_error() {
        return Err(EncodeError::Output(err));
    }
    result?;

    sink.accept(None)?;
    Ok(())
}

/// Encodes a row-addressed frame into `sink`.
///
/// Every row is converted into one scratch line and pushed to the streaming
/// encoder; the first failing row aborts the encode. Output size is whatever
/// the sink recorded.
pub fn encode_rows<R, S>(
    rows: &R,
    format: PixelFormat,
    width: usize,
    height: usize,
    quality: u32,
    sink: &mut S,
) -> Result<(), EncodeError>
where
    R: RowSource + ?Sized,
    S: OutputSink + ?Sized,
{
    if format.is_jpeg() {
        return Err(EncodeError::UnsupportedFormat(format));
    }
    let w = u32::try_from(width).map_err(|_| EncodeError::InvalidDimensions { width, height })?;
    let h = u32::try_from(height).map_err(|_| EncodeError::InvalidDimensions { width, height })?;
    if w == 0 || h == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let len = width * format.channels();
    let mut line = Vec::new();
    line.try_reserve_exact(len)
        .map_err(|_| EncodeError::Allocation(len))?;
    line.resize(len, 0);

    write_through(sink, |writer| {
        let encoder = mozjpeg_rs::Encoder::streaming().quality(clamp_quality(quality));
        let mut stream = match format.subsampling() {
            Subsampling::Gray => encoder.start_gray(w, h, writer)?,
            subsampling => encoder.subsampling(subsampling).start_rgb(w, h, writer)?,
        };

        for y in 0..height {
            convert::convert_line(rows, format, width, y, &mut line)
                .map_err(|source| EncodeError::Scanline { line: y, source })?;
            stream.write_scanlines(&line)?;
        }
        stream.finish()?;
        Ok(())
    })
}

/// Encodes any non-JPEG frame into `sink`, picking the path by addressing.
pub fn encode_frame<S: OutputSink + ?Sized>(
    frame: &Frame,
    quality: u32,
    sink: &mut S,
) -> Result<(), EncodeError> {
    let format = frame.format();
    if format.is_jpeg() {
        return Err(EncodeError::UnsupportedFormat(format));
    }

    match frame.buffer() {
        FrameBuffer::Rows(rows) => {
            encode_rows(rows.as_slice(), format, frame.width(), frame.height(), quality, sink)
        }
        FrameBuffer::Flat(data) => {
            flat::encode_flat(data, format, frame.width(), frame.height(), quality, sink)
        }
    }
}

/// A compressed frame owned by the caller
#[derive(Debug, Clone, Default)]
pub struct EncodedImage {
    buffer: Vec<u8>,
    truncated: usize,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes lost because the output buffer was too small
    pub fn truncated_bytes(&self) -> usize {
        self.truncated
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }
}

/// Compresses `frame` into a buffer of at most `capacity` bytes.
///
/// Output that does not fit is clipped, not reported as an error; check
/// [`EncodedImage::truncated_bytes`].
pub fn to_jpeg(frame: &Frame, quality: u32, capacity: usize) -> Result<EncodedImage, EncodeError> {
    let mut sink = BoundedMemorySink::with_capacity(capacity)?;
    encode_frame(frame, quality, &mut sink)?;

    let truncated = sink.truncated_bytes();
    let buffer = sink.into_inner();
    debug!(
        format = %frame.format(),
        width = frame.width(),
        height = frame.height(),
        len = buffer.len(),
        truncated,
        "Frame compressed"
    );

    Ok(EncodedImage { buffer, truncated })
}

/// Compresses `frame`, passing every produced chunk to `emit` as it is made.
///
/// `emit` returns how many bytes it took; anything short of the whole chunk
/// fails the encode. Returns the total number of bytes emitted.
pub fn to_jpeg_with<F>(frame: &Frame, quality: u32, emit: F) -> Result<usize, EncodeError>
where
    F: FnMut(&[u8]) -> usize,
{
    let mut sink = CallbackSink::new(emit);
    encode_frame(frame, quality, &mut sink)?;
    Ok(sink.cumulative_len())
}
