//! Type-state POP3 client.

use std::marker::PhantomData;
use std::time::Duration;

use mailsync_net::LineStream;
use mailsync_net::sasl::{self, mechanism};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::AuthMethod;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{
    greeting_timestamp, is_terminator, parse_list_line, parse_stat, parse_uidl_line, unstuff,
};
use crate::types::{Capabilities, Reply};

/// Type-state marker for the AUTHORIZATION state (before login).
#[derive(Debug)]
pub struct Authorization;

/// Type-state marker for the TRANSACTION state (logged in).
#[derive(Debug)]
pub struct Transaction;

/// POP3 connection with type-state pattern.
///
/// Only a `Pop3Connection<S, Transaction>` can list or retrieve messages,
/// and the only way to get one is a successful [`authenticate`].
///
/// [`authenticate`]: Pop3Connection::authenticate
#[derive(Debug)]
pub struct Pop3Connection<S, State = Transaction> {
    lines: LineStream<S>,
    capabilities: Capabilities,
    timestamp: Option<String>,
    top_supported: Option<bool>,
    _state: PhantomData<State>,
}

impl<S> Pop3Connection<S, Authorization>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a connection from a stream, reads the greeting and discovers
    /// capabilities with `AUTH` and `CAPA`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the greeting is not `+OK`.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut conn = Self::new(stream, io_timeout, None);

        let greeting = conn.read_reply().await?;
        if !greeting.ok {
            return Err(Error::Protocol(format!(
                "server refused connection: {}",
                greeting.text
            )));
        }
        conn.timestamp = greeting_timestamp(&greeting.text);

        conn.discover_capabilities().await?;
        Ok(conn)
    }

    /// Continues on a stream that was just upgraded to TLS.
    ///
    /// Capabilities are discovered again; the APOP timestamp from the
    /// original greeting is carried over.
    ///
    /// # Errors
    ///
    /// Returns transport errors from the capability exchange.
    pub async fn resume_after_tls(
        stream: S,
        io_timeout: Duration,
        timestamp: Option<String>,
    ) -> Result<Self> {
        let mut conn = Self::new(stream, io_timeout, timestamp);
        conn.discover_capabilities().await?;
        Ok(conn)
    }

    fn new(stream: S, io_timeout: Duration, timestamp: Option<String>) -> Self {
        Self {
            lines: LineStream::with_timeout(stream, io_timeout),
            capabilities: Capabilities::default(),
            timestamp,
            top_supported: None,
            _state: PhantomData,
        }
    }

    async fn discover_capabilities(&mut self) -> Result<()> {
        let mut capabilities = Capabilities::default();

        let auth = self
            .send(&Command::Auth {
                mechanism: None,
                initial_response: None,
            })
            .await?;
        if auth.ok {
            let lines = self.read_text_lines().await?;
            capabilities.add_auth_lines(lines.iter().map(String::as_str));
        }

        let capa = self.send(&Command::Capa).await?;
        if capa.ok {
            let lines = self.read_text_lines().await?;
            capabilities.add_capa_lines(lines.iter().map(String::as_str));
            if capabilities.has("TOP") {
                self.top_supported = Some(true);
            }
        }

        debug!(sasl = ?capabilities.sasl, capa = ?capabilities.keywords, "POP3 capabilities");
        self.capabilities = capabilities;
        Ok(())
    }

    /// Returns the APOP timestamp from the greeting, if any.
    #[must_use]
    pub fn greeting_timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Issues STLS and returns the raw stream for the TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartTlsUnavailable`] if STLS is not advertised or
    /// the server refuses it.
    pub async fn stls(mut self) -> Result<S> {
        if !self.capabilities.supports_stls() {
            return Err(Error::StartTlsUnavailable);
        }
        let reply = self.send(&Command::Stls).await?;
        if !reply.ok {
            debug!(text = %reply.text, "STLS refused");
            return Err(Error::StartTlsUnavailable);
        }
        Ok(self.lines.into_inner())
    }

    /// Authenticates and moves to the TRANSACTION state.
    ///
    /// - Plain: `AUTH PLAIN` if offered, else `USER`/`PASS`
    /// - CRAM-MD5: `AUTH CRAM-MD5` if offered, else APOP if the greeting had
    ///   a timestamp
    /// - External and XOAUTH2: only if offered
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server rejects the credentials or no
    /// usable mechanism is offered.
    pub async fn authenticate(mut self, method: &AuthMethod) -> Result<Pop3Connection<S>> {
        match method {
            AuthMethod::Plain { username, password } => {
                if self.capabilities.supports_sasl(mechanism::PLAIN) {
                    let mut pending = Some(sasl::plain_response(username, password));
                    self.sasl(mechanism::PLAIN, None, move |_| {
                        Ok(pending.take().unwrap_or_default())
                    })
                    .await?;
                } else {
                    self.expect_auth_ok(&Command::User {
                        username: username.clone(),
                    })
                    .await?;
                    self.expect_auth_ok(&Command::Pass {
                        password: password.clone(),
                    })
                    .await?;
                }
            }
            AuthMethod::CramMd5 { username, password } => {
                if self.capabilities.supports_sasl(mechanism::CRAM_MD5) {
                    self.sasl(mechanism::CRAM_MD5, None, |challenge| {
                        Ok(sasl::cram_md5_response(username, password, challenge)?)
                    })
                    .await?;
                } else if let Some(timestamp) = self.timestamp.clone() {
                    self.expect_auth_ok(&Command::Apop {
                        username: username.clone(),
                        digest: sasl::apop_digest(&timestamp, password),
                    })
                    .await?;
                } else {
                    return Err(Error::Auth(
                        "server offers neither CRAM-MD5 nor APOP".to_string(),
                    ));
                }
            }
            AuthMethod::External { username } => {
                self.require_mechanism(mechanism::EXTERNAL)?;
                let response = sasl::external_response(username);
                self.sasl(mechanism::EXTERNAL, Some(response), |_| Ok(String::new()))
                    .await?;
            }
            AuthMethod::XOAuth2 {
                username,
                access_token,
            } => {
                self.require_mechanism(mechanism::XOAUTH2)?;
                let response = sasl::xoauth2_response(username, access_token);
                self.sasl(mechanism::XOAUTH2, Some(response), |_| Ok(String::new()))
                    .await?;
            }
        }

        Ok(Pop3Connection {
            lines: self.lines,
            capabilities: self.capabilities,
            timestamp: self.timestamp,
            top_supported: self.top_supported,
            _state: PhantomData,
        })
    }

    fn require_mechanism(&self, name: &str) -> Result<()> {
        if self.capabilities.supports_sasl(name) {
            Ok(())
        } else {
            Err(Error::Auth(format!("server does not offer {name}")))
        }
    }

    async fn expect_auth_ok(&mut self, command: &Command) -> Result<()> {
        let reply = self.send(command).await?;
        if reply.ok {
            Ok(())
        } else {
            Err(Error::Auth(reply.text))
        }
    }

    /// Runs an `AUTH <mechanism>` exchange (RFC 5034).
    async fn sasl<F>(
        &mut self,
        mechanism: &str,
        initial_response: Option<String>,
        mut responder: F,
    ) -> Result<()>
    where
        F: FnMut(&str) -> Result<String>,
    {
        self.send_only(&Command::Auth {
            mechanism: Some(mechanism.to_string()),
            initial_response,
        })
        .await?;

        loop {
            let line = self.lines.read_line().await?;
            if let Some(challenge) = continuation(&line) {
                let response = responder(challenge)?;
                self.lines.write_line(&response).await?;
                continue;
            }
            let reply = Reply::parse(&line)?;
            return if reply.ok {
                Ok(())
            } else {
                Err(Error::Auth(reply.text))
            };
        }
    }
}

/// Returns the challenge text of a SASL continuation line (`+ ...`).
fn continuation(line: &str) -> Option<&str> {
    if line == "+" {
        Some("")
    } else {
        line.strip_prefix("+ ")
    }
}

impl<S> Pop3Connection<S, Transaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns (message count, mailbox size) from `STAT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR` and [`Error::Protocol`] for a
    /// malformed reply.
    pub async fn stat(&mut self) -> Result<(i64, u64)> {
        let reply = self.send(&Command::Stat).await?.into_ok()?;
        parse_stat(&reply.text)
    }

    /// Returns (message number, unique id) pairs from `UIDL`.
    ///
    /// Malformed listing lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR`.
    pub async fn uidl(&mut self) -> Result<Vec<(u32, String)>> {
        self.send(&Command::Uidl).await?.into_ok()?;
        let lines = self.read_text_lines().await?;
        Ok(lines
            .iter()
            .filter_map(|line| {
                let parsed = parse_uidl_line(line);
                if parsed.is_none() {
                    debug!(line, "Skipping malformed UIDL line");
                }
                parsed
            })
            .collect())
    }

    /// Returns (message number, size) pairs from `LIST`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR`.
    pub async fn list(&mut self) -> Result<Vec<(u32, u64)>> {
        self.send(&Command::List).await?.into_ok()?;
        let lines = self.read_text_lines().await?;
        Ok(lines.iter().filter_map(|line| parse_list_line(line)).collect())
    }

    /// Retrieves a whole message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR`.
    pub async fn retr(&mut self, msg: u32) -> Result<Vec<u8>> {
        self.send(&Command::Retr(msg)).await?.into_ok()?;
        self.read_body().await
    }

    /// Retrieves the headers and the first `lines` body lines with `TOP`.
    ///
    /// Returns `None` when the server does not support TOP. The first
    /// `-ERR` from a server that did not list TOP in CAPA is remembered,
    /// and later calls return `None` without a round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR` from a server known to support TOP.
    pub async fn top(&mut self, msg: u32, lines: u32) -> Result<Option<Vec<u8>>> {
        if self.top_supported == Some(false) {
            return Ok(None);
        }
        let reply = self.send(&Command::Top { msg, lines }).await?;
        if !reply.ok {
            if self.top_supported.is_none() {
                debug!("TOP not supported, falling back to RETR");
                self.top_supported = Some(false);
                return Ok(None);
            }
            return Err(Error::Server(reply.text));
        }
        self.top_supported = Some(true);
        self.read_body().await.map(Some)
    }

    /// Marks a message deleted. Deletion happens at QUIT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] on `-ERR`.
    pub async fn dele(&mut self, msg: u32) -> Result<()> {
        self.send(&Command::Dele(msg)).await?.into_ok()?;
        Ok(())
    }

    async fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for line in self.read_multiline().await? {
            body.extend_from_slice(&line);
            body.extend_from_slice(b"\r\n");
        }
        Ok(body)
    }
}

// Common implementation for all states
impl<S, State> Pop3Connection<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the discovered capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn send_only(&mut self, command: &Command) -> Result<()> {
        debug!(command = %command.redacted(), "POP3 >");
        self.lines.write_line(&command.serialize()).await?;
        Ok(())
    }

    async fn send(&mut self, command: &Command) -> Result<Reply> {
        self.send_only(command).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let line = self.lines.read_line().await?;
        trace!(line, "POP3 <");
        Reply::parse(&line)
    }

    /// Reads a multi-line block up to the lone `.`, unstuffing each line.
    async fn read_multiline(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let raw = self.lines.read_line_bytes().await?;
            let line = raw
                .strip_suffix(b"\r\n")
                .or_else(|| raw.strip_suffix(b"\n"))
                .unwrap_or(&raw);
            if is_terminator(line) {
                return Ok(lines);
            }
            lines.push(unstuff(line).to_vec());
        }
    }

    async fn read_text_lines(&mut self) -> Result<Vec<String>> {
        Ok(self
            .read_multiline()
            .await?
            .into_iter()
            .map(|line| String::from_utf8_lossy(&line).into_owned())
            .collect())
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// In the TRANSACTION state this commits `DELE` marks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the server answers `-ERR`.
    pub async fn quit(mut self) -> Result<()> {
        self.send(&Command::Quit).await?.into_ok()?;
        Ok(())
    }
}
