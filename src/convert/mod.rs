//! Scanline conversion from camera pixel layouts to RGB or luma rows
//!
//! Every supported raw layout is turned into the canonical row the JPEG
//! encoder consumes: 3 bytes per pixel in R, G, B order, or 1 byte of luma
//! for grayscale sources.

pub mod yuv;

use bytes::Bytes;
use thiserror::Error;

use crate::frame::PixelFormat;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("row {0} is missing")]
    MissingRow(usize),

    #[error("source row is {len} bytes, expected {expected}")]
    ShortSource { len: usize, expected: usize },

    #[error("destination row is {len} bytes, expected {expected}")]
    ShortDestination { len: usize, expected: usize },

    #[error("YUV422 rows need an even width, got {0}")]
    OddWidth(usize),

    #[error("{0} data cannot be converted per scanline")]
    Unsupported(PixelFormat),
}

/// A frame whose rows are reached through separate buffers.
pub trait RowSource {
    /// Bytes of row `line`, or `None` past the last row
    fn row(&self, line: usize) -> Option<&[u8]>;
}

impl RowSource for [Bytes] {
    fn row(&self, line: usize) -> Option<&[u8]> {
        self.get(line).map(|row| row.as_ref())
    }
}

impl RowSource for [Vec<u8>] {
    fn row(&self, line: usize) -> Option<&[u8]> {
        self.get(line).map(Vec::as_slice)
    }
}

impl RowSource for [&[u8]] {
    fn row(&self, line: usize) -> Option<&[u8]> {
        self.get(line).copied()
    }
}

/// Converts row `line` of a row-addressed source into `dst`.
///
/// `dst` must hold `width * format.channels()` bytes.
pub fn convert_line<R: RowSource + ?Sized>(
    src: &R,
    format: PixelFormat,
    width: usize,
    line: usize,
    dst: &mut [u8],
) -> Result<(), ConvertError> {
    let row = src.row(line).ok_or(ConvertError::MissingRow(line))?;
    convert_pixels(format, row, width, dst)
}

/// Converts `width` pixels of one packed row into RGB (or luma) bytes.
pub fn convert_pixels(
    format: PixelFormat,
    src: &[u8],
    width: usize,
    dst: &mut [u8],
) -> Result<(), ConvertError> {
    let bpp = format
        .bytes_per_pixel()
        .ok_or(ConvertError::Unsupported(format))?;

    let src_len = width * bpp;
    if src.len() < src_len {
        return Err(ConvertError::ShortSource {
            len: src.len(),
            expected: src_len,
        });
    }
    let dst_len = width * format.channels();
    if dst.len() < dst_len {
        return Err(ConvertError::ShortDestination {
            len: dst.len(),
            expected: dst_len,
        });
    }

    let src = &src[..src_len];
    let dst = &mut dst[..dst_len];

    match format {
        PixelFormat::Grayscale => dst.copy_from_slice(src),
        PixelFormat::Rgb888 => {
            for (out, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
            }
        }
        PixelFormat::Rgb565 => {
            for (out, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(2)) {
                out[0] = px[0] & 0xF8;
                out[1] = (px[0] & 0x07) << 5 | (px[1] & 0xE0) >> 3;
                out[2] = (px[1] & 0x1F) << 3;
            }
        }
        PixelFormat::Yuv422 => {
            if width % 2 != 0 {
                return Err(ConvertError::OddWidth(width));
            }
            for (out, px) in dst.chunks_exact_mut(6).zip(src.chunks_exact(4)) {
                let (y0, u, y1, v) = (px[0], px[1], px[2], px[3]);
                let (r, g, b) = yuv::yuv_to_rgb(y0, u, v);
                out[..3].copy_from_slice(&[r, g, b]);
                let (r, g, b) = yuv::yuv_to_rgb(y1, u, v);
                out[3..].copy_from_slice(&[r, g, b]);
            }
        }
        PixelFormat::Jpeg => return Err(ConvertError::Unsupported(format)),
    }

    Ok(())
}
