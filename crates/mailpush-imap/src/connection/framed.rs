//! Framed I/O for IMAP protocol.
//!
//! Reads go through the streaming [`ResponseParser`] on top of a buffered
//! reader; writes are whole command lines flushed immediately.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::Result;
use crate::parser::{LiteralCallback, Response, ResponseParser};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    parser: ResponseParser<BufReader<S>>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            parser: ResponseParser::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream)),
        }
    }

    /// Reads one complete response, literals included.
    pub async fn read_response(
        &mut self,
        callback: Option<&mut dyn LiteralCallback>,
    ) -> Result<Response> {
        self.parser.read_response(callback).await
    }

    /// Waits until the server has sent something. Cancel-safe.
    pub async fn wait_for_data(&mut self) -> Result<()> {
        self.parser.wait_for_data().await
    }

    /// Writes a command line and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.parser.get_mut().get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Returns true if response bytes are already buffered.
    pub fn has_buffered_data(&self) -> bool {
        !self.parser.get_ref().buffer().is_empty()
    }

    /// Shuts down the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.parser.get_mut().get_mut().shutdown().await?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.parser.get_ref().get_ref()
    }

    /// Consumes the framed stream, returning the inner stream together with
    /// any bytes that were read ahead but not parsed yet.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        let reader = self.parser.into_inner();
        let buffered = reader.buffer().to_vec();
        (reader.into_inner(), buffered)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::parser::Value;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response(None).await.unwrap();
        assert!(response.is_untagged());
        assert_eq!(response.status_text(), Some("ready"));
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response(None).await.unwrap();
        let items = response.get_list(2).unwrap();
        assert!(matches!(items.get(1), Some(Value::Literal(bytes)) if &bytes[..] == b"hello"));
    }

    #[tokio::test]
    async fn test_framed_write_command() {
        let mock = Builder::new().write(b"A1 LOGIN user pass\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed
            .write_command(b"A1 LOGIN user pass\r\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_into_parts_keeps_read_ahead() {
        let mock = Builder::new()
            .read(b"A1 OK go\r\n\x01\x02\x03")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response(None).await.unwrap();
        assert_eq!(response.tag(), Some("A1"));
        assert!(framed.has_buffered_data());

        let (_stream, buffered) = framed.into_parts();
        assert_eq!(buffered, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response(None).await.unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
