//! Flat-buffer path through the `image` crate's JPEG encoder

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::sink::OutputSink;
use super::{clamp_quality, write_through, EncodeError};
use crate::convert::{self, ConvertError};
use crate::frame::PixelFormat;

/// Encodes a packed frame into `sink`, then signals end of image.
pub(crate) fn encode_flat<S: OutputSink + ?Sized>(
    data: &[u8],
    format: PixelFormat,
    width: usize,
    height: usize,
    quality: u32,
    sink: &mut S,
) -> Result<(), EncodeError> {
    let Some(bpp) = format.bytes_per_pixel() else {
        return Err(EncodeError::UnsupportedFormat(format));
    };
    let w = u32::try_from(width).map_err(|_| EncodeError::InvalidDimensions { width, height })?;
    let h = u32::try_from(height).map_err(|_| EncodeError::InvalidDimensions { width, height })?;
    if w == 0 || h == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let stride = width * bpp;
    let needed = stride * height;
    if data.len() < needed {
        let line = data.len() / stride;
        return Err(EncodeError::Scanline {
            line,
            source: ConvertError::ShortSource {
                len: data.len() - line * stride,
                expected: stride,
            },
        });
    }
    let data = &data[..needed];

    let expanded;
    let (pixels, color): (&[u8], _) = match format {
        PixelFormat::Grayscale => (data, ExtendedColorType::L8),
        _ => {
            let len = width * height * 3;
            let mut rgb = Vec::new();
            rgb.try_reserve_exact(len)
                .map_err(|_| EncodeError::Allocation(len))?;
            rgb.resize(len, 0);

            for (line, (src, dst)) in data
                .chunks_exact(stride)
                .zip(rgb.chunks_exact_mut(width * 3))
                .enumerate()
            {
                convert::convert_pixels(format, src, width, dst)
                    .map_err(|source| EncodeError::Scanline { line, source })?;
            }
            expanded = rgb;
            (expanded.as_slice(), ExtendedColorType::Rgb8)
        }
    };

    write_through(sink, |writer| {
        JpegEncoder::new_with_quality(writer, clamp_quality(quality)).write_image(pixels, w, h, color)?;
        Ok(())
    })
}
