//! Destinations for encoder output

use std::io;
use thiserror::Error;
use tracing::warn;

use super::EncodeError;

// encoders may write byte by byte; sinks see chunks of this size instead
pub(crate) const CHUNK_SIZE: usize = 2048;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("output rejected: {accepted} of {requested} bytes accepted")]
    Rejected { accepted: usize, requested: usize },
}

/// Receives encoded bytes as the encoder produces them.
pub trait OutputSink {
    /// Takes one chunk of output; `None` marks the end of the image and never
    /// fails. Returns how many bytes were kept.
    fn accept(&mut self, data: Option<&[u8]>) -> Result<usize, SinkError>;

    /// Total bytes kept so far
    fn size(&self) -> usize;
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn accept(&mut self, data: Option<&[u8]>) -> Result<usize, SinkError> {
        (**self).accept(data)
    }

    fn size(&self) -> usize {
        (**self).size()
    }
}

/// Fixed-capacity in-memory sink. Output past the capacity is dropped with a
/// warning instead of failing the encode.
#[derive(Debug)]
pub struct BoundedMemorySink {
    buf: Vec<u8>,
    capacity: usize,
    truncated: usize,
}

impl BoundedMemorySink {
    /// Allocates the whole capacity up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, EncodeError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| EncodeError::Allocation(capacity))?;

        Ok(Self {
            buf,
            capacity,
            truncated: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes dropped because the buffer was full
    pub fn truncated_bytes(&self) -> usize {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl OutputSink for BoundedMemorySink {
    fn accept(&mut self, data: Option<&[u8]>) -> Result<usize, SinkError> {
        let Some(data) = data else {
            return Ok(0);
        };

        let remaining = self.capacity - self.buf.len();
        let take = data.len().min(remaining);
        if take < data.len() {
            let dropped = data.len() - take;
            self.truncated += dropped;
            warn!(dropped, capacity = self.capacity, "JPEG output overflow");
        }

        self.buf.extend_from_slice(&data[..take]);
        Ok(take)
    }

    fn size(&self) -> usize {
        self.buf.len()
    }
}

/// Forwards every chunk to `emit`, which reports how many bytes it took.
///
/// A chunk that is not taken in full fails the encode. The end-of-image
/// signal is not forwarded; framing is up to the caller.
pub struct CallbackSink<F> {
    emit: F,
    len: usize,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&[u8]) -> usize,
{
    pub fn new(emit: F) -> Self {
        Self { emit, len: 0 }
    }

    /// Bytes forwarded so far
    pub fn cumulative_len(&self) -> usize {
        self.len
    }
}

impl<F> OutputSink for CallbackSink<F>
where
    F: FnMut(&[u8]) -> usize,
{
    fn accept(&mut self, data: Option<&[u8]>) -> Result<usize, SinkError> {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => return Ok(0),
        };

        let accepted = (self.emit)(data).min(data.len());
        self.len += accepted;

        if accepted < data.len() {
            return Err(SinkError::Rejected {
                accepted,
                requested: data.len(),
            });
        }
        Ok(accepted)
    }

    fn size(&self) -> usize {
        self.len
    }
}

/// `io::Write` view of a sink, for encoders that write through `Write`.
pub struct SinkWriter<'a, S: OutputSink + ?Sized> {
    sink: &'a mut S,
    error: Option<SinkError>,
}

impl<'a, S: OutputSink + ?Sized> SinkWriter<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink, error: None }
    }

    /// The sink error behind a failed write, if one happened.
    pub fn into_error(self) -> Option<SinkError> {
        self.error
    }
}

impl<S: OutputSink + ?Sized> io::Write for SinkWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // a bounded sink may keep less than `buf`; that still counts as written
        match self.sink.accept(Some(buf)) {
            Ok(_) => Ok(buf.len()),
            Err(e) => {
                self.error = Some(e.clone());
                Err(io::Error::new(io::ErrorKind::BrokenPipe, e))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bounded_sink_truncates() {
        let mut sink = BoundedMemorySink::with_capacity(10).unwrap();

        assert_eq!(sink.accept(Some(&[1; 6])), Ok(6));
        assert_eq!(sink.accept(Some(&[2; 6])), Ok(4));

        assert_eq!(sink.size(), 10);
        assert_eq!(sink.truncated_bytes(), 2);
        assert_eq!(sink.as_bytes(), &[1, 1, 1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_bounded_sink_never_exceeds_capacity() {
        for capacity in [0usize, 1, 7, 64, 100] {
            let mut sink = BoundedMemorySink::with_capacity(capacity).unwrap();
            let mut accepted = 0;
            let mut requested = 0;

            for len in [3usize, 0, 17, 1, 40, 9, 33] {
                let chunk = vec![0xAB; len];
                accepted += sink.accept(Some(&chunk)).unwrap();
                requested += len;
                assert!(sink.size() <= capacity);
            }

            assert_eq!(accepted, sink.size());
            assert_eq!(sink.truncated_bytes(), requested - accepted);
        }
    }

    #[test]
    fn test_bounded_sink_end_of_image() {
        let mut sink = BoundedMemorySink::with_capacity(4).unwrap();
        assert_eq!(sink.accept(None), Ok(0));
        assert_eq!(sink.size(), 0);
    }

    #[test]
    fn test_callback_sink_tracks_length() {
        let mut forwarded = Vec::new();
        let mut calls = 0;
        {
            let mut sink = CallbackSink::new(|chunk: &[u8]| {
                calls += 1;
                forwarded.extend_from_slice(chunk);
                chunk.len()
            });

            sink.accept(Some(&[1, 2, 3])).unwrap();
            sink.accept(Some(&[4])).unwrap();
            sink.accept(Some(&[])).unwrap();
            sink.accept(None).unwrap();

            assert_eq!(sink.cumulative_len(), 4);
            assert_eq!(sink.size(), 4);
        }
        assert_eq!(forwarded, vec![1, 2, 3, 4]);
        // empty chunks and the end marker are not forwarded
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_callback_sink_rejection() {
        let mut sink = CallbackSink::new(|chunk: &[u8]| chunk.len() / 2);
        let err = sink.accept(Some(&[0; 8])).unwrap_err();
        assert_eq!(
            err,
            SinkError::Rejected {
                accepted: 4,
                requested: 8
            }
        );
        assert_eq!(sink.cumulative_len(), 4);
    }

    #[test]
    fn test_sink_writer() {
        let mut sink = BoundedMemorySink::with_capacity(4).unwrap();
        {
            let mut writer = SinkWriter::new(&mut sink);
            writer.write_all(&[9; 6]).unwrap();
        }
        assert_eq!(sink.as_bytes(), &[9; 4]);
        assert_eq!(sink.truncated_bytes(), 2);

        let mut failing = CallbackSink::new(|_: &[u8]| 0);
        let mut writer = SinkWriter::new(&mut failing);
        assert!(writer.write_all(&[1]).is_err());
        assert_eq!(
            writer.into_error(),
            Some(SinkError::Rejected {
                accepted: 0,
                requested: 1
            })
        );
    }
}
