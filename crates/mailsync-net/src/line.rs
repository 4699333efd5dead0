//! Line-oriented I/O with timeouts.
//!
//! Both POP3 and IMAP exchange CRLF-terminated lines, with IMAP additionally
//! embedding counted literals. [`LineStream`] wraps any async stream in a
//! buffered reader and bounds every operation by the I/O timeout.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::{Error, Result};

/// Default maximum line length accepted from the server.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Buffered line reader and writer over a stream.
#[derive(Debug)]
pub struct LineStream<S> {
    inner: BufReader<S>,
    io_timeout: Duration,
    max_line_length: usize,
}

impl<S> LineStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with the default timeout of 60 seconds.
    pub fn new(stream: S) -> Self {
        Self::with_timeout(stream, Duration::from_secs(60))
    }

    /// Wraps a stream with the given I/O timeout.
    pub fn with_timeout(stream: S, io_timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(stream),
            io_timeout,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Sets the maximum accepted line length.
    #[must_use]
    pub const fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Reads one line including its terminator.
    ///
    /// # Errors
    ///
    /// Returns an `UnexpectedEof` I/O error if the peer closes the connection,
    /// [`Error::LineTooLong`] if no newline arrives within the length limit
    /// and [`Error::Timeout`] if the read stalls.
    pub async fn read_line_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let limit = self.max_line_length as u64 + 1;
        let mut limited = (&mut self.inner).take(limit);
        let n = with_timeout(self.io_timeout, limited.read_until(b'\n', &mut buf)).await?;

        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if !buf.ends_with(b"\n") {
            if buf.len() > self.max_line_length {
                return Err(Error::LineTooLong(self.max_line_length));
            }
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of a line",
            )));
        }
        Ok(buf)
    }

    /// Reads one line and strips the trailing CRLF (or bare LF).
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// See [`read_line_bytes`](Self::read_line_bytes).
    pub async fn read_line(&mut self) -> Result<String> {
        let bytes = self.read_line_bytes().await?;
        let line = String::from_utf8_lossy(&bytes);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Reads exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on EOF and [`Error::Timeout`] if the read stalls.
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        with_timeout(self.io_timeout, self.inner.read_exact(&mut buf)).await?;
        Ok(buf)
    }

    /// Writes a line and appends CRLF, then flushes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or [`Error::Timeout`].
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.write_all(&data).await
    }

    /// Writes raw bytes and flushes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or [`Error::Timeout`].
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.inner.get_mut();
        with_timeout(self.io_timeout, stream.write_all(data)).await?;
        with_timeout(self.io_timeout, stream.flush()).await?;
        Ok(())
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Unwraps the underlying stream.
    ///
    /// Any buffered but unread data is discarded, which is safe right after a
    /// STARTTLS reply because the server waits for the handshake.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

async fn with_timeout<T, F>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Timeout(duration)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_lines_crlf_and_lf() {
        let mock = Builder::new().read(b"+OK ready\r\nnext\nlast\r\n").build();
        let mut stream = LineStream::new(mock);

        assert_eq!(stream.read_line().await.unwrap(), "+OK ready");
        assert_eq!(stream.read_line().await.unwrap(), "next");
        assert_eq!(stream.read_line().await.unwrap(), "last");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = Builder::new().build();
        let mut stream = LineStream::new(mock);

        let err = stream.read_line().await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let cursor = std::io::Cursor::new(b"0123456789abcdef\r\n".to_vec());
        let mut stream = LineStream::new(cursor).max_line_length(8);

        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::LineTooLong(8)));
    }

    #[tokio::test]
    async fn test_read_exact_after_line() {
        let mock = Builder::new().read(b"* 1 FETCH {5}\r\nhello)\r\n").build();
        let mut stream = LineStream::new(mock);

        assert_eq!(stream.read_line().await.unwrap(), "* 1 FETCH {5}");
        assert_eq!(stream.read_exact(5).await.unwrap(), b"hello");
        assert_eq!(stream.read_line().await.unwrap(), ")");
    }

    #[tokio::test]
    async fn test_write_line_appends_crlf() {
        let mock = Builder::new().write(b"STAT\r\n").build();
        let mut stream = LineStream::new(mock);

        stream.write_line("STAT").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let mock = Builder::new().wait(Duration::from_secs(120)).build();
        let mut stream = LineStream::with_timeout(mock, Duration::from_secs(1));

        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
