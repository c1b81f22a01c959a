//! COMPRESS=DEFLATE stream layer (RFC 4978).
//!
//! Both directions carry a raw DEFLATE stream without zlib headers. Every
//! flush of the writer ends in a sync flush so the server can decode each
//! command as soon as it arrives.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const BUFFER_SIZE: usize = 8192;

/// Compressing and decompressing wrapper around a byte stream.
pub struct DeflateStream<S> {
    inner: S,
    compress: Compress,
    decompress: Decompress,
    read_buf: Vec<u8>,
    read_pos: usize,
    read_len: usize,
    write_buf: Vec<u8>,
    write_pos: usize,
    needs_flush: bool,
    read_eof: bool,
}

impl<S> DeflateStream<S> {
    /// Wraps `inner`.
    ///
    /// `buffered` holds compressed bytes that were already read from `inner`
    /// by an outer buffer before compression was switched on.
    #[must_use]
    pub fn new(inner: S, buffered: Vec<u8>) -> Self {
        let read_len = buffered.len();
        let mut read_buf = buffered;
        if read_buf.len() < BUFFER_SIZE {
            read_buf.resize(BUFFER_SIZE, 0);
        }
        Self {
            inner,
            compress: Compress::new(Compression::fast(), false),
            decompress: Decompress::new(false),
            read_buf,
            read_pos: 0,
            read_len,
            write_buf: Vec::with_capacity(BUFFER_SIZE),
            write_pos: 0,
            needs_flush: false,
            read_eof: false,
        }
    }

    /// Returns the wrapped stream.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }
}

fn deflate_error(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[allow(clippy::cast_possible_truncation)]
fn delta(after: u64, before: u64) -> usize {
    (after - before) as usize
}

impl<S: AsyncRead + Unpin> AsyncRead for DeflateStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            let input = &this.read_buf[this.read_pos..this.read_len];
            let before_in = this.decompress.total_in();
            let before_out = this.decompress.total_out();
            let status = this
                .decompress
                .decompress(input, buf.initialize_unfilled(), FlushDecompress::None)
                .map_err(deflate_error)?;
            let consumed = delta(this.decompress.total_in(), before_in);
            let produced = delta(this.decompress.total_out(), before_out);
            this.read_pos += consumed;
            buf.advance(produced);

            if produced > 0 || status == Status::StreamEnd || this.read_eof {
                return Poll::Ready(Ok(()));
            }
            if this.read_pos < this.read_len && consumed > 0 {
                continue;
            }

            // Keep any unconsumed tail and refill behind it.
            this.read_buf.copy_within(this.read_pos..this.read_len, 0);
            this.read_len -= this.read_pos;
            this.read_pos = 0;
            if this.read_len == this.read_buf.len() {
                this.read_buf.resize(this.read_len + BUFFER_SIZE, 0);
            }
            let mut raw = ReadBuf::new(&mut this.read_buf[this.read_len..]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut raw))?;
            let filled = raw.filled().len();
            if filled == 0 {
                this.read_eof = true;
            }
            this.read_len += filled;
        }
    }
}

impl<S: AsyncWrite + Unpin> DeflateStream<S> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.write_pos < self.write_buf.len() {
            let n = ready!(
                Pin::new(&mut self.inner).poll_write(cx, &self.write_buf[self.write_pos..])
            )?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_pos += n;
        }
        self.write_buf.clear();
        self.write_pos = 0;
        Poll::Ready(Ok(()))
    }

    fn compress_into_buffer(&mut self, mut input: &[u8], flush: FlushCompress) -> io::Result<()> {
        loop {
            self.write_buf.reserve(input.len() / 2 + 64);
            let before_in = self.compress.total_in();
            self.compress
                .compress_vec(input, &mut self.write_buf, flush)
                .map_err(deflate_error)?;
            input = &input[delta(self.compress.total_in(), before_in)..];
            // Spare room left over means the compressor has nothing pending.
            if input.is_empty() && self.write_buf.len() < self.write_buf.capacity() {
                return Ok(());
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeflateStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.compress_into_buffer(buf, FlushCompress::None)?;
        this.needs_flush = true;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.needs_flush {
            this.compress_into_buffer(&[], FlushCompress::Sync)?;
            this.needs_flush = false;
        }
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// The connection transport, optionally compressed.
pub enum Transport<S> {
    /// Bytes pass through unchanged.
    Plain(S),
    /// COMPRESS=DEFLATE is active.
    Deflate(Box<DeflateStream<S>>),
}

impl<S> Transport<S> {
    /// Returns true if compression is active.
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        matches!(self, Self::Deflate(_))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Transport<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Deflate(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Transport<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Deflate(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Deflate(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Deflate(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
