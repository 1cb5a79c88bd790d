//! Multipart part framing

use bytes::Bytes;

use super::{Transport, TransportError};

/// How the body of one multipart part is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartFraming {
    /// Body length known upfront, sent as `Content-Length`
    Sized(usize),

    /// Body streamed as it is produced, closed by a zero-length chunk
    Chunked,
}

impl PartFraming {
    /// Writes the boundary line and the part header; returns the bytes written.
    pub fn write_header<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        boundary: &str,
    ) -> Result<usize, TransportError> {
        let delimiter = format!("\r\n--{}\r\n", boundary);
        transport.write_chunk(delimiter.as_bytes())?;

        let header = match self {
            PartFraming::Sized(len) => format!(
                "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                len
            ),
            PartFraming::Chunked => {
                "Content-Type: image/jpeg\r\nTransfer-Encoding: chunked\r\n\r\n".to_string()
            }
        };
        transport.write_chunk(header.as_bytes())?;

        Ok(delimiter.len() + header.len())
    }

    /// Writes part of the body.
    pub fn write_body_chunk<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        data: &[u8],
    ) -> Result<(), TransportError> {
        if data.is_empty() {
            // an empty write would read as the terminator
            return Ok(());
        }
        transport.write_chunk(data)
    }

    /// Writes a whole body held in shared memory.
    pub fn write_body<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        data: Bytes,
    ) -> Result<(), TransportError> {
        if data.is_empty() {
            return Ok(());
        }
        transport.write_bytes(data)
    }

    /// Closes the part; chunked parts get their zero-length terminator.
    pub fn finalize<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<(), TransportError> {
        match self {
            PartFraming::Sized(_) => Ok(()),
            PartFraming::Chunked => transport.write_chunk(&[]),
        }
    }
}
