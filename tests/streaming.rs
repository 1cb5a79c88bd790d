//! Streaming engine tests against a recording transport

use bytes::Bytes;
use mjpeg_streamer::streamer::{TransportError, DEFAULT_BOUNDARY};
use mjpeg_streamer::{
    to_jpeg, FrameBuffer, FrameHolder, MjpegStream, PixelFormat, StreamConfig, StreamError,
    StreamMode, Transport,
};
use std::sync::Arc;

/// Records every write; optionally fails after a number of successful ones.
#[derive(Default)]
struct RecordingTransport {
    chunks: Vec<Vec<u8>>,
    fail_after: Option<usize>,
    attempts: usize,
}

impl RecordingTransport {
    fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Default::default()
        }
    }

    fn output(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    fn terminators(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_empty()).count()
    }
}

impl Transport for RecordingTransport {
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.attempts += 1;
        if let Some(limit) = self.fail_after {
            if self.attempts > limit {
                // the terminator is still recorded so tests can see it was attempted
                if data.is_empty() {
                    self.chunks.push(Vec::new());
                }
                return Err(TransportError::Closed);
            }
        }
        self.chunks.push(data.to_vec());
        Ok(())
    }
}

fn config(mode: StreamMode) -> StreamConfig {
    StreamConfig {
        mode,
        ..Default::default()
    }
}

fn raw_holder() -> Arc<FrameHolder> {
    let holder = Arc::new(FrameHolder::new());
    let rows = (0..24u8)
        .map(|y| {
            let row: Vec<u8> = (0..32u8)
                .map(|x| x.wrapping_mul(7).wrapping_add(y.wrapping_mul(3)))
                .collect();
            Bytes::from(row)
        })
        .collect();
    holder
        .set_frame(PixelFormat::Grayscale, FrameBuffer::Rows(rows), 32, 24)
        .unwrap();
    holder
}

fn jpeg_holder() -> (Arc<FrameHolder>, Bytes) {
    let source = raw_holder().current().unwrap();
    let jpeg = to_jpeg(&source, 75, 16 * 1024).unwrap().into_bytes();

    let holder = Arc::new(FrameHolder::new());
    holder.set_frame_jpeg(jpeg.clone(), 32, 24).unwrap();
    (holder, jpeg)
}

/// Splits one recorded part into (header block, body).
fn split_part(output: &[u8]) -> (String, Vec<u8>) {
    let end = output
        .windows(4)
        .enumerate()
        .find(|(_, w)| *w == b"\r\n\r\n")
        .map(|(i, _)| i + 4)
        .expect("header terminator");
    (
        String::from_utf8(output[..end].to_vec()).unwrap(),
        output[end..].to_vec(),
    )
}

#[test]
fn test_empty_holder_writes_nothing() {
    let holder = Arc::new(FrameHolder::new());
    let mut stream = MjpegStream::new(holder, RecordingTransport::default(), config(StreamMode::LengthDelimited));

    assert!(matches!(stream.next_frame(), Err(StreamError::FrameUnavailable)));
    assert!(matches!(stream.run(), StreamError::FrameUnavailable));
    assert!(stream.into_transport().chunks.is_empty());
}

#[test]
fn test_jpeg_frame_sent_verbatim_in_both_modes() {
    for mode in [StreamMode::LengthDelimited, StreamMode::Chunked] {
        let (holder, jpeg) = jpeg_holder();
        let mut stream = MjpegStream::new(holder, RecordingTransport::default(), config(mode));

        let report = stream.next_frame().unwrap();
        assert!(!report.encoded);
        assert_eq!(report.jpeg_len, jpeg.len());
        assert_eq!(stream.counters().snapshot().frames_encoded, 0);

        let transport = stream.into_transport();
        let output = transport.output();
        assert_eq!(output.len(), report.part_len);

        let (header, body) = split_part(&output);
        assert_eq!(
            header,
            format!(
                "\r\n--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                DEFAULT_BOUNDARY,
                jpeg.len()
            )
        );
        assert_eq!(body, jpeg.as_ref());
        assert_eq!(transport.terminators(), 0, "{mode:?}");
    }
}

#[test]
fn test_length_delimited_reencode() {
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::default(), config(StreamMode::LengthDelimited));

    let report = stream.next_frame().unwrap();
    assert!(report.encoded);

    let transport = stream.into_transport();
    let (header, body) = split_part(&transport.output());
    assert!(header.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert_eq!(body.len(), report.jpeg_len);
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
    assert_eq!(&body[body.len() - 2..], &[0xFF, 0xD9]);
    assert_eq!(transport.terminators(), 0);
}

#[test]
fn test_chunked_reencode() {
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::default(), config(StreamMode::Chunked));

    let report = stream.next_frame().unwrap();
    assert!(report.encoded);

    let transport = stream.into_transport();
    assert_eq!(transport.terminators(), 1);
    assert!(transport.chunks.last().unwrap().is_empty());

    let (header, body) = split_part(&transport.output());
    assert_eq!(
        header,
        format!(
            "\r\n--{}\r\nContent-Type: image/jpeg\r\nTransfer-Encoding: chunked\r\n\r\n",
            DEFAULT_BOUNDARY
        )
    );
    assert!(!header.contains("Content-Length"));
    assert_eq!(body.len(), report.jpeg_len);
    assert_eq!(&body[body.len() - 2..], &[0xFF, 0xD9]);
}

#[test]
fn test_chunked_terminator_sent_after_body_failure() {
    // boundary and header succeed, the first body chunk fails
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::failing_after(2), config(StreamMode::Chunked));

    assert!(matches!(
        stream.next_frame(),
        Err(StreamError::Write(TransportError::Closed))
    ));
    let stats = stream.counters().snapshot();
    assert_eq!(stats.write_errors, 1);
    assert_eq!(stats.frames_sent, 0);

    let transport = stream.into_transport();
    assert_eq!(transport.terminators(), 1);
}

#[test]
fn test_run_ends_when_client_goes_away() {
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::failing_after(9), config(StreamMode::LengthDelimited));

    let err = stream.run();
    assert!(matches!(err, StreamError::Write(TransportError::Closed)));

    // three writes per part: boundary, header, body
    let stats = stream.counters().snapshot();
    assert_eq!(stats.frames_sent, 3);
    assert_eq!(stats.frames_encoded, 3);
    assert_eq!(stats.active_streams, 0);
}

#[test]
fn test_new_frames_are_picked_up() {
    let holder = raw_holder();
    let mut stream = MjpegStream::new(Arc::clone(&holder), RecordingTransport::default(), config(StreamMode::LengthDelimited));
    let first = stream.next_frame().unwrap();

    let (_, jpeg) = jpeg_holder();
    holder.set_frame_jpeg(jpeg.clone(), 32, 24).unwrap();
    let second = stream.next_frame().unwrap();

    assert!(first.encoded);
    assert!(!second.encoded);
    assert_eq!(second.jpeg_len, jpeg.len());
}

#[test]
fn test_custom_boundary() {
    let cfg = StreamConfig {
        boundary: "frame".to_string(),
        ..config(StreamMode::LengthDelimited)
    };
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::default(), cfg);
    stream.next_frame().unwrap();

    let output = stream.into_transport().output();
    assert!(output.starts_with(b"\r\n--frame\r\n"));
}

#[test]
fn test_frame_age_grows_while_snapshot_is_reused() {
    let mut stream = MjpegStream::new(raw_holder(), RecordingTransport::default(), config(StreamMode::LengthDelimited));
    let first = stream.next_frame().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let second = stream.next_frame().unwrap();

    assert!(second.frame_age >= first.frame_age + std::time::Duration::from_millis(20));
}
