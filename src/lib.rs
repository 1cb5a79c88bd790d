//! Motion-JPEG over HTTP from a single current frame
//!
//! This library serves a `multipart/x-mixed-replace` stream to any number of
//! clients, compressing raw camera frames on the fly:
//! - Lock-free current-frame slot (`arc_swap`) with immutable snapshots
//! - Scanline converters for grayscale, RGB888, RGB565 and YUV422 rows
//! - Scanline-streamed JPEG compression writing through bounded or streaming sinks
//! - Length-delimited or chunked multipart framing per connection
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use mjpeg_streamer::{FrameBuffer, FrameHolder, IoTransport, MjpegStream, PixelFormat, StreamConfig};
//!
//! let holder = Arc::new(FrameHolder::new());
//! let rows = vec![Bytes::from(vec![128u8; 64]); 48];
//! holder.set_frame(PixelFormat::Grayscale, FrameBuffer::Rows(rows), 64, 48)?;
//!
//! let socket = std::net::TcpStream::connect("127.0.0.1:9000")?;
//! let mut stream = MjpegStream::new(holder, IoTransport::new(socket), StreamConfig::default());
//! let err = stream.run();
//! eprintln!("stream ended: {err}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod convert;
pub mod encode;
pub mod frame;
pub mod jpeg;
pub mod server;
pub mod source;
pub mod streamer;

// Re-exports for convenience
pub use config::Config;
pub use encode::{to_jpeg, to_jpeg_with, EncodeError, EncodedImage};
pub use frame::{Frame, FrameBuffer, FrameHolder, PixelFormat, RowAddressing};
pub use source::PatternSource;
pub use streamer::{
    IoTransport, MjpegStream, StreamConfig, StreamCounters, StreamError, StreamMode, StreamerStats,
    Transport,
};
