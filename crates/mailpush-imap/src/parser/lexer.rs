//! Byte-level reader for the IMAP response grammar.
//!
//! The lexer sits directly on a buffered async stream and hands out the
//! primitive pieces of a response (atoms, quoted strings, literal headers and
//! literal payloads) without ever reading past the bytes it needs. That keeps
//! the stream in sync even when a literal is streamed to a caller-supplied
//! sink instead of being buffered.

#![allow(clippy::missing_errors_doc)]

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{Error, Result};

/// Maximum size of a single atom, quoted string or text run.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Byte reader that tracks its position within the current response.
#[derive(Debug)]
pub struct Lexer<R> {
    reader: R,
    pos: usize,
}

impl<R> Lexer<R> {
    /// Creates a new lexer over the given reader.
    #[must_use]
    pub const fn new(reader: R) -> Self {
        Self { reader, pos: 0 }
    }

    /// Returns the number of bytes consumed since the last reset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Marks the start of a new response.
    pub const fn reset_position(&mut self) {
        self.pos = 0;
    }

    /// Gets a reference to the underlying reader.
    pub const fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Gets a mutable reference to the underlying reader.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the lexer and returns the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Creates a parse error at the current position.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(self.pos, message)
    }
}

impl<R> Lexer<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Waits until at least one byte is buffered.
    ///
    /// Nothing is consumed, so dropping the future is harmless.
    pub async fn fill(&mut self) -> Result<()> {
        let buf = self.reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(eof());
        }
        Ok(())
    }

    /// Peeks at the next byte without consuming it.
    pub async fn peek(&mut self) -> Result<u8> {
        let buf = self.reader.fill_buf().await?;
        buf.first().copied().ok_or_else(eof)
    }

    /// Consumes and returns the next byte.
    pub async fn advance(&mut self) -> Result<u8> {
        let byte = self.peek().await?;
        self.consume(1);
        Ok(byte)
    }

    /// Consumes the next byte, which must be `expected`.
    pub async fn expect(&mut self, expected: u8) -> Result<()> {
        let byte = self.peek().await?;
        if byte != expected {
            return Err(self.error(format!(
                "expected {:?}, found {:?}",
                char::from(expected),
                char::from(byte)
            )));
        }
        self.consume(1);
        Ok(())
    }

    /// Consumes a line terminator. A bare LF is accepted as well.
    pub async fn expect_crlf(&mut self) -> Result<()> {
        if self.peek().await? == b'\r' {
            self.consume(1);
        }
        self.expect(b'\n').await
    }

    /// Consumes bytes while `keep` holds and returns them.
    pub async fn take_while<F>(&mut self, mut keep: F) -> Result<Vec<u8>>
    where
        F: FnMut(u8) -> bool,
    {
        let mut out = Vec::new();
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(eof());
            }
            let n = buf.iter().position(|&b| !keep(b)).unwrap_or(buf.len());
            out.extend_from_slice(&buf[..n]);
            let done = n < buf.len();
            self.consume(n);

            if out.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            if done {
                return Ok(out);
            }
        }
    }

    /// Reads a bare token.
    ///
    /// With `allow_brackets` the token may contain `[` and `]`, which is how
    /// mailbox names such as `[Gmail]/Sent Mail` arrive in LIST responses.
    pub async fn read_atom(&mut self, allow_brackets: bool) -> Result<Vec<u8>> {
        self.take_while(|b| is_atom_char(b) || (allow_brackets && (b == b'[' || b == b']')))
            .await
    }

    /// Reads a command tag, which ends at the first space.
    pub async fn read_tag(&mut self) -> Result<String> {
        let tag = self
            .take_while(|b| b != b' ' && b != b'\r' && b != b'\n')
            .await?;
        if tag.is_empty() {
            return Err(self.error("empty tag"));
        }
        Ok(into_string(tag))
    }

    /// Reads a quoted string, including the surrounding quotes.
    ///
    /// A backslash escapes the byte that follows it.
    pub async fn read_quoted(&mut self) -> Result<Vec<u8>> {
        self.expect(b'"').await?;
        let mut out = Vec::new();
        loop {
            match self.advance().await? {
                b'"' => return Ok(out),
                b'\\' => out.push(self.advance().await?),
                byte => out.push(byte),
            }
            if out.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("quoted string too long".to_string()));
            }
        }
    }

    /// Reads everything up to the end of the line and consumes the terminator.
    pub async fn read_to_eol(&mut self) -> Result<Vec<u8>> {
        let text = self.take_while(|b| b != b'\r' && b != b'\n').await?;
        self.expect_crlf().await?;
        Ok(text)
    }

    /// Reads a literal header `{n}` or `{n+}` and its line terminator.
    pub async fn read_literal_size(&mut self) -> Result<usize> {
        self.expect(b'{').await?;
        let digits = self.take_while(|b| b.is_ascii_digit()).await?;
        if self.peek().await? == b'+' {
            self.consume(1);
        }
        self.expect(b'}').await?;

        let size = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| self.error("invalid literal size"))?;

        self.expect_crlf().await?;
        Ok(size)
    }

    /// Reads exactly `size` raw bytes.
    pub async fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(size.min(64 * 1024));
        while out.len() < size {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(eof());
            }
            let n = buf.len().min(size - out.len());
            out.extend_from_slice(&buf[..n]);
            self.consume(n);
        }
        Ok(out)
    }

    /// Copies exactly `size` raw bytes into `sink`.
    ///
    /// The bytes are always consumed from the stream. A failing sink stops
    /// receiving data and its first error is returned as the inner result.
    pub async fn stream_bytes(
        &mut self,
        size: usize,
        sink: &mut (dyn Write + Send),
    ) -> Result<io::Result<()>> {
        let mut remaining = size;
        let mut outcome = Ok(());
        while remaining > 0 {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(eof());
            }
            let n = buf.len().min(remaining);
            if outcome.is_ok() {
                outcome = sink.write_all(&buf[..n]);
            }
            self.consume(n);
            remaining -= n;
        }
        if outcome.is_ok() {
            outcome = sink.flush();
        }
        Ok(outcome)
    }

    fn consume(&mut self, n: usize) {
        self.reader.consume(n);
        self.pos += n;
    }
}

/// Returns true for bytes that may appear in a bare token.
#[must_use]
pub const fn is_atom_char(byte: u8) -> bool {
    !matches!(
        byte,
        b'(' | b')' | b'[' | b']' | b'{' | b'"' | b' ' | b'\r' | b'\n' | 0x00..=0x1f | 0x7f
    )
}

/// Converts wire bytes to a string, replacing invalid UTF-8.
pub fn into_string(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn eof() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "end of stream while reading response",
    ))
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

    #[tokio::test]
    async fn test_read_atom_stops_at_delimiters() {
        let mut lexer = Lexer::new(&b"\\Seen)"[..]);
        assert_eq!(lexer.read_atom(false).await.unwrap(), b"\\Seen");
        assert_eq!(lexer.peek().await.unwrap(), b')');

        let mut lexer = Lexer::new(&b"BODY[TEXT] "[..]);
        assert_eq!(lexer.read_atom(false).await.unwrap(), b"BODY");
    }

    #[tokio::test]
    async fn test_read_atom_with_brackets() {
        let mut lexer = Lexer::new(&b"[Gmail]/Sent\r\n"[..]);
        assert_eq!(lexer.read_atom(true).await.unwrap(), b"[Gmail]/Sent");
    }

    #[tokio::test]
    async fn test_quoted_string_escaped() {
        let mut lexer = Lexer::new(&b"\"hello \\\"world\\\" \\\\\" rest"[..]);
        assert_eq!(
            lexer.read_quoted().await.unwrap(),
            b"hello \"world\" \\".to_vec()
        );
        assert_eq!(lexer.position(), 20);
    }

    #[tokio::test]
    async fn test_literal_size() {
        let mut lexer = Lexer::new(&b"{5}\r\nhello"[..]);
        assert_eq!(lexer.read_literal_size().await.unwrap(), 5);
        assert_eq!(lexer.read_bytes(5).await.unwrap(), b"hello");

        let mut lexer = Lexer::new(&b"{12+}\r\n"[..]);
        assert_eq!(lexer.read_literal_size().await.unwrap(), 12);

        let mut lexer = Lexer::new(&b"{abc}\r\n"[..]);
        assert!(lexer.read_literal_size().await.is_err());
    }

    #[tokio::test]
    async fn test_literal_split_across_reads() {
        use tokio::io::BufReader;
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"{10}\r\nhel").read(b"lo world").build();
        let mut lexer = Lexer::new(BufReader::new(mock));
        let size = lexer.read_literal_size().await.unwrap();
        assert_eq!(lexer.read_bytes(size).await.unwrap(), b"hello worl");
        assert_eq!(lexer.advance().await.unwrap(), b'd');
    }

    #[tokio::test]
    async fn test_stream_bytes_drains_on_sink_error() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut lexer = Lexer::new(&b"abcdefX"[..]);
        let outcome = lexer.stream_bytes(6, &mut Broken).await.unwrap();
        assert!(outcome.is_err());
        assert_eq!(lexer.advance().await.unwrap(), b'X');
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mut lexer = Lexer::new(&b""[..]);
        assert!(matches!(lexer.peek().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_to_eol_accepts_bare_lf() {
        let mut lexer = Lexer::new(&b"some text\nnext"[..]);
        assert_eq!(lexer.read_to_eol().await.unwrap(), b"some text");
        assert_eq!(lexer.advance().await.unwrap(), b'n');
    }

    #[test]
    fn test_is_atom_char() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b'0'));
        assert!(is_atom_char(b':'));
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b'*'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b']'));
        assert!(!is_atom_char(b'{'));
        assert!(!is_atom_char(0x01));
    }
}
