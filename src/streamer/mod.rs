//! MJPEG streaming engine
//!
//! One [`MjpegStream`] drives one client connection: it snapshots the current
//! frame, compresses it when the producer did not hand over a JPEG, and
//! writes a `multipart/x-mixed-replace` part through its [`Transport`]. The
//! loop runs until a frame fails; every failure ends the connection.

mod framing;
mod stats;
mod timing;

pub use framing::PartFraming;
pub use stats::{StreamCounters, StreamerStats};
pub use timing::{FrameInterval, StreamTiming};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::encode::{self, EncodeError, EncodedImage};
use crate::frame::{Frame, FrameHolder};

pub const DEFAULT_BOUNDARY: &str = "123456789000000000000987654321";

/// Response content type for a stream using `boundary`
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={}", boundary)
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("no frame has been published")]
    FrameUnavailable,

    #[error("JPEG compression failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("write failed: {0}")]
    Write(#[from] TransportError),
}

/// Ordered, blocking byte sink of one connection.
pub trait Transport {
    /// Writes one chunk. An empty chunk is the zero-length terminator of a
    /// chunked part.
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Writes a shared buffer, for transports that can keep it without copying.
    fn write_bytes(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.write_chunk(&data)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_chunk(data)
    }

    fn write_bytes(&mut self, data: Bytes) -> Result<(), TransportError> {
        (**self).write_bytes(data)
    }
}

/// Transport over any blocking writer. The chunk terminator only flushes.
pub struct IoTransport<W> {
    writer: W,
}

impl<W: Write> IoTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for IoTransport<W> {
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            self.writer.flush()?;
        } else {
            self.writer.write_all(data)?;
        }
        Ok(())
    }
}

/// Framing used for re-encoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Compress into a bounded buffer, then send with `Content-Length`
    #[default]
    LengthDelimited,

    /// Stream compressor output as it is produced
    Chunked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub mode: StreamMode,
    pub quality: u32,
    /// Capacity of the buffer used in length-delimited mode
    pub jpeg_buffer_size: usize,
    pub boundary: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::LengthDelimited,
            quality: 80,
            jpeg_buffer_size: 64 * 1024,
            boundary: DEFAULT_BOUNDARY.to_string(),
        }
    }
}

/// Body of one part; only an owned body is released after the write.
#[derive(Debug)]
pub enum FrameBody {
    /// Shared with the frame snapshot
    Borrowed(Bytes),

    /// Compressed for this part
    Owned(EncodedImage),
}

impl FrameBody {
    pub fn len(&self) -> usize {
        match self {
            FrameBody::Borrowed(data) => data.len(),
            FrameBody::Owned(image) => image.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_bytes(self) -> Bytes {
        match self {
            FrameBody::Borrowed(data) => data,
            FrameBody::Owned(image) => image.into_bytes(),
        }
    }
}

/// Outcome of one successfully streamed part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// JPEG bytes in the part body
    pub jpeg_len: usize,

    /// Bytes written including boundary and header
    pub part_len: usize,

    /// Whether the frame was compressed for this part
    pub encoded: bool,

    /// Time since the previous part, absent for the first one
    pub interval: Option<FrameInterval>,

    /// How old the snapshot was once its part was written
    pub frame_age: Duration,
}

/// Streaming loop of one connection
pub struct MjpegStream<T> {
    holder: Arc<FrameHolder>,
    transport: T,
    config: StreamConfig,
    timing: StreamTiming,
    counters: Arc<StreamCounters>,
}

impl<T: Transport> MjpegStream<T> {
    pub fn new(holder: Arc<FrameHolder>, transport: T, config: StreamConfig) -> Self {
        Self::with_counters(holder, transport, config, Arc::new(StreamCounters::new()))
    }

    /// Creates a stream reporting into shared `counters`.
    pub fn with_counters(
        holder: Arc<FrameHolder>,
        transport: T,
        config: StreamConfig,
        counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            holder,
            transport,
            config,
            timing: StreamTiming::new(),
            counters,
        }
    }

    pub fn counters(&self) -> &Arc<StreamCounters> {
        &self.counters
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Streams parts until one fails and returns the error that ended the
    /// connection.
    pub fn run(&mut self) -> StreamError {
        self.timing.reset();
        self.counters.stream_opened();
        info!(mode = ?self.config.mode, "MJPEG stream started");

        let err = loop {
            if let Err(e) = self.next_frame() {
                break e;
            }
        };

        self.counters.stream_closed();
        match &err {
            StreamError::Write(e) => info!(error = %e, "MJPEG client disconnected"),
            e => warn!(error = %e, "MJPEG stream stopped"),
        }
        err
    }

    /// Streams the current frame as one multipart part.
    ///
    /// Fails with [`StreamError::FrameUnavailable`] before writing anything
    /// when no frame has been published. Any failure resets frame timing.
    pub fn next_frame(&mut self) -> Result<FrameReport, StreamError> {
        let result = self.send_current();

        match &result {
            Ok(report) => {
                self.counters.record_frame(report.part_len as u64, report.encoded);
            }
            Err(e) => {
                self.timing.reset();
                match e {
                    StreamError::Encode(_) => self.counters.record_encode_error(),
                    StreamError::Write(_) => self.counters.record_write_error(),
                    StreamError::FrameUnavailable => {}
                }
            }
        }
        result
    }

    fn send_current(&mut self) -> Result<FrameReport, StreamError> {
        let frame = self.holder.current().ok_or(StreamError::FrameUnavailable)?;

        let (jpeg_len, part_len, encoded) = match (frame.jpeg_data(), self.config.mode) {
            (Some(data), _) => {
                let (jpeg_len, part_len) = self.send_sized(FrameBody::Borrowed(data.clone()))?;
                (jpeg_len, part_len, false)
            }
            (None, StreamMode::LengthDelimited) => {
                let image = encode::to_jpeg(&frame, self.config.quality, self.config.jpeg_buffer_size)?;
                let (jpeg_len, part_len) = self.send_sized(FrameBody::Owned(image))?;
                (jpeg_len, part_len, true)
            }
            (None, StreamMode::Chunked) => {
                let (jpeg_len, part_len) = self.send_chunked(&frame)?;
                (jpeg_len, part_len, true)
            }
        };

        let now = Instant::now();
        let interval = self.timing.mark(now);
        let frame_age = now.saturating_duration_since(frame.captured_at());
        trace!(age_ms = frame_age.as_millis() as u64, "Frame age");
        match interval {
            Some(FrameInterval {
                elapsed_ms,
                fps: Some(fps),
            }) => trace!(
                "MJPEG: {}KB ({} B) {}ms ({:.1}fps)",
                jpeg_len / 1024,
                jpeg_len,
                elapsed_ms,
                fps
            ),
            Some(FrameInterval { elapsed_ms, .. }) => {
                trace!("MJPEG: {}KB ({} B) {}ms", jpeg_len / 1024, jpeg_len, elapsed_ms)
            }
            None => trace!("MJPEG: {}KB ({} B)", jpeg_len / 1024, jpeg_len),
        }

        Ok(FrameReport {
            jpeg_len,
            part_len,
            encoded,
            interval,
            frame_age,
        })
    }

    /// Sends a part whose length is known; the body is dropped after the write.
    fn send_sized(&mut self, body: FrameBody) -> Result<(usize, usize), StreamError> {
        let jpeg_len = body.len();
        let framing = PartFraming::Sized(jpeg_len);

        let header_len = framing.write_header(&mut self.transport, &self.config.boundary)?;
        framing.write_body(&mut self.transport, body.into_bytes())?;
        framing.finalize(&mut self.transport)?;

        Ok((jpeg_len, header_len + jpeg_len))
    }

    /// Compresses straight into the transport. The terminator chunk is sent
    /// whether or not compression succeeded.
    fn send_chunked(&mut self, frame: &Frame) -> Result<(usize, usize), StreamError> {
        let framing = PartFraming::Chunked;
        let quality = self.config.quality;

        let header = framing.write_header(&mut self.transport, &self.config.boundary);
        let mut write_err = None;
        let encoded = match header {
            Ok(_) => {
                let transport = &mut self.transport;
                let result = encode::to_jpeg_with(frame, quality, |chunk| {
                    match framing.write_body_chunk(transport, chunk) {
                        Ok(()) => chunk.len(),
                        Err(e) => {
                            write_err.get_or_insert(e);
                            0
                        }
                    }
                });
                Some(result)
            }
            Err(_) => None,
        };
        let finalized = framing.finalize(&mut self.transport);

        let header_len = header?;
        if let Some(e) = write_err {
            return Err(e.into());
        }
        let jpeg_len = match encoded {
            Some(Ok(len)) => len,
            Some(Err(e)) => return Err(e.into()),
            None => 0,
        };
        finalized?;

        Ok((jpeg_len, header_len + jpeg_len))
    }
}

impl MjpegStream<IoTransport<std::io::Sink>> {
    /// Stream that discards its output, for measuring encode throughput.
    pub fn discarding(holder: Arc<FrameHolder>, config: StreamConfig) -> Self {
        Self::new(holder, IoTransport::new(std::io::sink()), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameBuffer, PixelFormat};

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.chunks.push(data.to_vec());
            Ok(())
        }
    }

    fn gray_holder() -> Arc<FrameHolder> {
        let holder = Arc::new(FrameHolder::new());
        holder
            .set_frame(
                PixelFormat::Grayscale,
                FrameBuffer::Flat(Bytes::from(vec![100u8; 16 * 8])),
                16,
                8,
            )
            .unwrap();
        holder
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            content_type("abc"),
            "multipart/x-mixed-replace; boundary=abc"
        );
    }

    #[test]
    fn test_stream_mode_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: StreamMode,
        }
        let w: Wrapper = toml::from_str("mode = \"chunked\"").unwrap();
        assert_eq!(w.mode, StreamMode::Chunked);
        let w: Wrapper = toml::from_str("mode = \"length-delimited\"").unwrap();
        assert_eq!(w.mode, StreamMode::LengthDelimited);
    }

    #[test]
    fn test_frame_body_len() {
        let borrowed = FrameBody::Borrowed(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(borrowed.len(), 3);
        assert!(FrameBody::Owned(EncodedImage::default()).is_empty());
    }

    #[test]
    fn test_first_frame_reports_no_interval() {
        let mut stream = MjpegStream::new(gray_holder(), Recorder::default(), StreamConfig::default());

        let first = stream.next_frame().unwrap();
        assert!(first.encoded);
        assert!(first.interval.is_none());

        let second = stream.next_frame().unwrap();
        assert!(second.interval.is_some());
        assert_eq!(stream.counters().snapshot().frames_sent, 2);
    }

    #[test]
    fn test_failure_resets_timing() {
        let holder = gray_holder();
        let mut stream = MjpegStream::new(Arc::clone(&holder), Recorder::default(), StreamConfig::default());
        stream.next_frame().unwrap();

        holder.clear();
        assert!(matches!(stream.next_frame(), Err(StreamError::FrameUnavailable)));

        holder
            .set_frame(
                PixelFormat::Grayscale,
                FrameBuffer::Flat(Bytes::from(vec![7u8; 8 * 8])),
                8,
                8,
            )
            .unwrap();
        let report = stream.next_frame().unwrap();
        assert!(report.interval.is_none());
    }

    #[test]
    fn test_io_transport() {
        let mut stream = MjpegStream::new(
            gray_holder(),
            IoTransport::new(Vec::new()),
            StreamConfig {
                mode: StreamMode::Chunked,
                ..Default::default()
            },
        );
        let report = stream.next_frame().unwrap();
        let written = stream.into_transport().into_inner();
        assert_eq!(written.len(), report.part_len);
    }

    #[test]
    fn test_discarding_stream() {
        let mut stream = MjpegStream::discarding(gray_holder(), StreamConfig::default());
        assert!(stream.next_frame().is_ok());
    }
}
