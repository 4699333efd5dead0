//! Framed I/O for the IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines that may embed literals
//! (`{n}\r\n` followed by `n` raw bytes). The framed stream reassembles a
//! complete response before it is handed to the parser.

#![allow(clippy::missing_errors_doc)]

use mailsync_net::LineStream;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::command::Command;
use crate::{Error, Result};

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for the IMAP protocol.
///
/// Handles line-based reading with literal support; every read and write
/// is bounded by the I/O timeout of the underlying [`LineStream`].
#[derive(Debug)]
pub struct FramedStream<S> {
    lines: LineStream<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a framed stream with the given I/O timeout.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            lines: LineStream::with_timeout(stream, io_timeout),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.lines.read_line_bytes().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let literal = self.lines.read_exact(literal_len).await?;
            response.extend_from_slice(&literal);
        }

        trace!(
            response = %String::from_utf8_lossy(response.get(..response.len().min(200)).unwrap_or_default()),
            "IMAP <"
        );
        Ok(response)
    }

    /// Writes a tagged command.
    ///
    /// Only the redacted form is logged.
    pub async fn write_command(&mut self, tag: &str, command: &Command) -> Result<()> {
        debug!(command = %command.redacted(tag), "IMAP >");
        self.lines.write_all(&command.serialize(tag)).await?;
        Ok(())
    }

    /// Writes a continuation line such as a SASL response.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.lines.write_line(line).await?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.lines.get_ref()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Buffered data is lost; only call this when the server is waiting on
    /// the client, e.g. right after a STARTTLS reply.
    pub fn into_inner(self) -> S {
        self.lines.into_inner()
    }
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line
        .strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;

    let digits = line.get(open + 1..)?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Reads responses until the tagged completion for one command.
#[derive(Debug)]
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
        }
    }

    /// Reads responses until a tagged response matching our tag is found.
    ///
    /// The tagged response is the last element.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let done = is_tagged(&response, &self.tag);
            self.responses.push(response);
            if done {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
    }
}

/// Returns true if `response` starts with `tag` followed by a space.
pub(crate) fn is_tagged(response: &[u8], tag: &str) -> bool {
    response
        .strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}
