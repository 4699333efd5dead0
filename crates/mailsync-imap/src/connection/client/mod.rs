//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time.
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: Initial state after connection
//! - `Authenticated`: After successful LOGIN/AUTHENTICATE
//! - `Selected`: After successful SELECT/EXAMINE
//!
//! Each state only exposes methods that are valid for that state, so a
//! half-authenticated connection can never be used for mailbox commands.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection with type-state.
///
/// The type parameter `State` tracks the connection state at compile time.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Outcome of one tagged command.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub(crate) untagged: Vec<UntaggedResponse>,
    pub(crate) status: Status,
    pub(crate) code: Option<ResponseCode>,
    pub(crate) text: String,
}

impl Exchange {
    /// Maps a non-OK completion to the matching error.
    pub(crate) fn into_result(self) -> Result<Vec<UntaggedResponse>> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self.untagged),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Returns true if the server advertises `AUTH=<mechanism>`.
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.capabilities.iter().any(|c| c.is_auth(mechanism))
    }

    /// Returns true if the server supports STARTTLS.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.has_capability(&Capability::StartTls)
    }

    /// Returns true if the server supports NAMESPACE (RFC 2342).
    #[must_use]
    pub fn supports_namespace(&self) -> bool {
        self.has_capability(&Capability::Namespace)
    }

    /// Returns true if LOGIN is disabled (e.g., before STARTTLS).
    #[must_use]
    pub fn login_disabled(&self) -> bool {
        self.has_capability(&Capability::LoginDisabled)
    }

    /// Sends a CAPABILITY command and updates the stored capabilities.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        self.execute(&Command::Capability).await?.into_result()?;
        Ok(self.capabilities.clone())
    }

    /// Sends one command and collects everything up to its tagged completion.
    ///
    /// Capability updates in untagged data or response codes are applied.
    /// Untagged lines that fail to parse are logged and skipped.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Exchange> {
        let tag = self.tag_gen.next_tag();
        self.stream.write_command(&tag, command).await?;

        let responses = ResponseAccumulator::new(tag.as_str())
            .read_until_tagged(&mut self.stream)
            .await?;

        let mut untagged = Vec::new();
        let mut completion = None;
        for bytes in &responses {
            match ResponseParser::parse(bytes) {
                Ok(Response::Tagged {
                    tag: resp_tag,
                    status,
                    code,
                    text,
                }) if resp_tag == tag => {
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities.clone_from(caps);
                    }
                    completion = Some((status, code, text));
                }
                Ok(Response::Untagged(response)) => {
                    self.absorb_capabilities(&response);
                    untagged.push(response);
                }
                Ok(other) => warn!(?other, "Unexpected response"),
                Err(e) => warn!(error = %e, "Skipping unparsable response"),
            }
        }

        let (status, code, text) =
            completion.ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;
        Ok(Exchange {
            untagged,
            status,
            code,
            text,
        })
    }

    /// Returns true if the response carried a capability list.
    pub(crate) fn absorb_capabilities(&mut self, response: &UntaggedResponse) -> bool {
        match response {
            UntaggedResponse::Capability(caps)
            | UntaggedResponse::Status {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => {
                self.capabilities.clone_from(caps);
                true
            }
            _ => false,
        }
    }

    /// Moves the connection into another state.
    pub(crate) fn into_state<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            state,
        }
    }

    /// Sends LOGOUT and waits for the completion, ignoring the outcome.
    pub(crate) async fn send_logout(&mut self) -> Result<()> {
        self.execute(&Command::Logout).await?;
        Ok(())
    }
}
