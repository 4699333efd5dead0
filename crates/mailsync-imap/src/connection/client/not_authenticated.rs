//! Implementation for the not-authenticated state.

use std::time::Duration;

use mailsync_net::sasl::{self, mechanism};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting. If the greeting carries no capabilities, a
    /// CAPABILITY command is issued.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut framed = FramedStream::new(stream, io_timeout);

        let greeting = framed.read_response().await?;
        let mut capabilities = Vec::new();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Status { status, code, text }) => match status {
                Status::Ok | Status::PreAuth => {
                    if let Some(ResponseCode::Capability(caps)) = code {
                        capabilities = caps;
                    }
                }
                Status::Bye => return Err(Error::Bye(text)),
                Status::No | Status::Bad => {
                    return Err(Error::Protocol(format!("server refused connection: {text}")));
                }
            },
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        let mut client = Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            state: NotAuthenticated,
        };
        if client.capabilities.is_empty() {
            client.capability().await?;
        }
        Ok(client)
    }

    /// Continues on a stream that was just upgraded to TLS.
    ///
    /// No greeting is sent after STARTTLS; capabilities are requested again
    /// because the server may advertise different ones over TLS.
    pub async fn resume_after_tls(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream, io_timeout),
            tag_gen: TagGenerator::default(),
            capabilities: Vec::new(),
            state: NotAuthenticated,
        };
        client.capability().await?;
        Ok(client)
    }

    /// Issues STARTTLS and returns the raw stream for the TLS handshake.
    ///
    /// Fails with [`Error::StartTlsUnavailable`] without sending anything if
    /// the server does not advertise STARTTLS.
    pub async fn starttls(mut self) -> Result<S> {
        if !self.supports_starttls() {
            return Err(Error::StartTlsUnavailable);
        }
        self.execute(&Command::StartTls).await?.into_result()?;
        Ok(self.stream.into_inner())
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.login_disabled() {
            return Err(Error::Auth("LOGIN is disabled by the server".to_string()));
        }
        let exchange = self
            .execute(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        if !exchange.status.is_ok() {
            return Err(Error::Auth(exchange.text));
        }
        let refreshed = matches!(exchange.code, Some(ResponseCode::Capability(_)))
            || exchange.untagged.iter().any(|response| {
                matches!(
                    response,
                    UntaggedResponse::Capability(_)
                        | UntaggedResponse::Status {
                            code: Some(ResponseCode::Capability(_)),
                            ..
                        }
                )
            });
        self.into_authenticated(refreshed).await
    }

    /// Authenticates with a plaintext password.
    ///
    /// Uses `AUTHENTICATE PLAIN` when `AUTH=PLAIN` is advertised and falls
    /// back to LOGIN otherwise.
    pub async fn authenticate_plain(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if !self.supports_auth(mechanism::PLAIN) {
            return self.login(username, password).await;
        }

        let response = sasl::plain_response(username, password);
        if self.has_capability(&crate::types::Capability::SaslIr) {
            self.authenticate(mechanism::PLAIN, Some(response), |_| Ok(String::new()))
                .await
        } else {
            let mut pending = Some(response);
            self.authenticate(mechanism::PLAIN, None, move |_| {
                Ok(pending.take().unwrap_or_default())
            })
            .await
        }
    }

    /// Authenticates with CRAM-MD5 (RFC 2195).
    pub async fn authenticate_cram_md5(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        self.require_mechanism(mechanism::CRAM_MD5)?;
        self.authenticate(mechanism::CRAM_MD5, None, |challenge| {
            sasl::cram_md5_response(username, password, challenge).map_err(Error::from)
        })
        .await
    }

    /// Authenticates with the TLS client certificate (SASL EXTERNAL).
    pub async fn authenticate_external(self, username: &str) -> Result<Client<S, Authenticated>> {
        self.require_mechanism(mechanism::EXTERNAL)?;
        let response = sasl::external_response(username);
        self.authenticate(mechanism::EXTERNAL, Some(response), |_| Ok(String::new()))
            .await
    }

    /// Authenticates with an `OAuth2` bearer token (XOAUTH2).
    ///
    /// A failure arrives as a continuation carrying a JSON error; it is
    /// answered with an empty line so the server sends the tagged NO.
    pub async fn authenticate_xoauth2(
        self,
        username: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        self.require_mechanism(mechanism::XOAUTH2)?;
        let response = sasl::xoauth2_response(username, access_token);
        self.authenticate(mechanism::XOAUTH2, Some(response), |challenge| {
            debug!(
                error = sasl::decode_challenge(challenge).as_deref().unwrap_or(challenge),
                "XOAUTH2 rejected"
            );
            Ok(String::new())
        })
        .await
    }

    /// Runs an AUTHENTICATE exchange.
    ///
    /// Each continuation is answered with the line returned by `responder`,
    /// which receives the raw (base64) challenge text. A tagged NO or BAD is
    /// reported as [`Error::Auth`].
    pub async fn authenticate<F>(
        mut self,
        mechanism: &str,
        initial_response: Option<String>,
        mut responder: F,
    ) -> Result<Client<S, Authenticated>>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let tag = self.tag_gen.next_tag();
        self.stream
            .write_command(
                &tag,
                &Command::Authenticate {
                    mechanism: mechanism.to_string(),
                    initial_response,
                },
            )
            .await?;

        let mut refreshed = false;
        loop {
            let bytes = self.stream.read_response().await?;
            match ResponseParser::parse(&bytes)? {
                Response::Continuation { text } => {
                    let reply = responder(&text)?;
                    self.stream.write_line(&reply).await?;
                }
                Response::Tagged {
                    tag: resp_tag,
                    status,
                    code,
                    text,
                } if resp_tag == tag => {
                    if !status.is_ok() {
                        return Err(Error::Auth(text));
                    }
                    if let Some(ResponseCode::Capability(caps)) = code {
                        self.capabilities = caps;
                        refreshed = true;
                    }
                    return self.into_authenticated(refreshed).await;
                }
                Response::Untagged(untagged) => {
                    refreshed |= self.absorb_capabilities(&untagged);
                }
                Response::Tagged { tag: other, .. } => {
                    return Err(Error::Protocol(format!("unexpected tag {other}")));
                }
            }
        }
    }

    /// Completes authentication. Servers may advertise different
    /// capabilities once logged in, so they are requested again unless the
    /// login response already carried them.
    async fn into_authenticated(self, refreshed: bool) -> Result<Client<S, Authenticated>> {
        let mut client = self.into_state(Authenticated);
        if !refreshed {
            client.capability().await?;
        }
        Ok(client)
    }

    fn require_mechanism(&self, name: &str) -> Result<()> {
        if self.supports_auth(name) {
            Ok(())
        } else {
            Err(Error::Auth(format!("server does not support AUTH={name}")))
        }
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        self.send_logout().await
    }
}
