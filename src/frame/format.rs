//! Pixel layouts accepted by the frame holder

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use mozjpeg_rs::Subsampling;

/// Pixel format of a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Ready-made JPEG bitstream, streamed as-is
    Jpeg,

    /// 8-bit luma
    Grayscale,

    /// 3 bytes per pixel, stored blue first
    Rgb888,

    /// 16-bit 5-6-5, high byte first
    Rgb565,

    /// YUYV: Y0 U Y1 V per pixel pair
    Yuv422,
}

impl PixelFormat {
    /// Bytes per source pixel, `None` for compressed data
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Jpeg => None,
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
        }
    }

    /// Channels of a converted scanline (luma or RGB)
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Grayscale => 1,
            _ => 3,
        }
    }

    /// Chroma subsampling used when this format is compressed
    pub fn subsampling(self) -> Subsampling {
        match self {
            PixelFormat::Grayscale => Subsampling::Gray,
            _ => Subsampling::S420,
        }
    }

    pub fn is_jpeg(self) -> bool {
        self == PixelFormat::Jpeg
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "jpeg",
            PixelFormat::Grayscale => "grayscale",
            PixelFormat::Rgb888 => "rgb888",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Yuv422 => "yuv422",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "mjpeg" => Ok(PixelFormat::Jpeg),
            "grayscale" | "gray" => Ok(PixelFormat::Grayscale),
            "rgb888" => Ok(PixelFormat::Rgb888),
            "rgb565" => Ok(PixelFormat::Rgb565),
            "yuv422" | "yuyv" => Ok(PixelFormat::Yuv422),
            other => Err(format!("unknown pixel format: {other}")),
        }
    }
}

/// How rows of a frame buffer are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAddressing {
    /// One contiguous buffer, fixed stride
    #[default]
    Flat,

    /// One buffer per row
    Rows,
}
