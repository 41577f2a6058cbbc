//! Framed I/O for the filter protocol.
//!
//! The protocol is LF-terminated text. Reading accumulates bytes into an
//! owned buffer and only ever removes whole frames from its front, so a
//! read that is cancelled mid-frame (a command timeout, a dropped future)
//! leaves the partial frame in place for the next read to finish.

#![allow(clippy::missing_errors_doc)]

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::response::frame_end;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum response frame length. Real frames are a few dozen bytes.
const MAX_FRAME_LENGTH: usize = 1024;

/// Framed connection for the filter protocol.
///
/// Handles exact frame boundaries on read and buffered line writes.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            read_buffer: BytesMut::with_capacity(256),
            write_buffer: BytesMut::with_capacity(256),
        }
    }

    /// Reads one complete response frame.
    ///
    /// `expects_body` selects the probe framing (status line, blank
    /// separator, membership line) over the single status line used by
    /// everything else.
    ///
    /// Returns [`Error::Closed`] if the service closes the connection
    /// before a full frame arrives.
    pub async fn read_response(&mut self, expects_body: bool) -> Result<Vec<u8>> {
        loop {
            if let Some(end) = frame_end(&self.read_buffer, expects_body) {
                let frame = self.read_buffer.split_to(end);
                return Ok(frame.to_vec());
            }

            if self.read_buffer.len() > MAX_FRAME_LENGTH {
                return Err(Error::Protocol(format!(
                    "response frame exceeds {MAX_FRAME_LENGTH} bytes"
                )));
            }

            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Closed);
            }
            let len = buf.len();
            self.read_buffer.extend_from_slice(buf);
            self.reader.consume(len);
        }
    }

    /// Writes one command line to the stream and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_read_status_frame() {
        let mock = Builder::new().read(b"201 Created\n").build();
        let mut framed = FramedStream::new(mock);

        let frame = framed.read_response(false).await.unwrap();
        assert_eq!(frame, b"201 Created\n");
    }

    #[tokio::test]
    async fn test_read_probe_frame_across_chunks() {
        let mock = Builder::new().read(b"200 Ok\n").read(b"\ntrue ").read(b"true\n").build();
        let mut framed = FramedStream::new(mock);

        let frame = framed.read_response(true).await.unwrap();
        assert_eq!(frame, b"200 Ok\n\ntrue true\n");
    }

    #[tokio::test]
    async fn test_read_two_frames_from_one_chunk() {
        let mock = Builder::new().read(b"204 No Content\n404 Not Found\n").build();
        let mut framed = FramedStream::new(mock);

        let first = framed.read_response(false).await.unwrap();
        assert_eq!(first, b"204 No Content\n");

        let second = framed.read_response(false).await.unwrap();
        assert_eq!(second, b"404 Not Found\n");
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let mock = Builder::new().read(b"200 Ok\n\n").build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response(true).await;
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let long = vec![b'x'; MAX_FRAME_LENGTH + 64];
        let mock = Builder::new().read(&long).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response(false).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"GET example.com\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"GET example.com\n").await.unwrap();
    }
}
