//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{MailboxStatus, Namespaces, ResponseCode};
use crate::{Error, Result};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Queries the server namespaces (RFC 2342).
    pub async fn namespace(&mut self) -> Result<Namespaces> {
        let untagged = self.execute(&Command::Namespace).await?.into_result()?;
        untagged
            .into_iter()
            .find_map(|response| match response {
                UntaggedResponse::Namespace(ns) => Some(ns),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("NAMESPACE returned no data".to_string()))
    }

    /// Selects a mailbox for read-write access.
    ///
    /// Consumes self and returns a selected client on success. A tagged NO
    /// (typically a missing mailbox) is [`Error::No`].
    pub async fn select(self, mailbox: &str) -> Result<Client<S, Selected>> {
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        self.open_mailbox(mailbox, command, false).await
    }

    /// Examines a mailbox for read-only access.
    pub async fn examine(self, mailbox: &str) -> Result<Client<S, Selected>> {
        let command = Command::Examine {
            mailbox: mailbox.to_string(),
        };
        self.open_mailbox(mailbox, command, true).await
    }

    async fn open_mailbox(
        mut self,
        mailbox: &str,
        command: Command,
        read_only: bool,
    ) -> Result<Client<S, Selected>> {
        let exchange = self.execute(&command).await?;
        let granted_read_only =
            read_only || matches!(exchange.code, Some(ResponseCode::ReadOnly));
        let untagged = exchange.into_result()?;

        let mut status = parse_mailbox_status(&untagged);
        status.read_only = granted_read_only;
        Ok(self.into_state(Selected::new(mailbox, granted_read_only, status)))
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        self.send_logout().await
    }
}

/// Builds the mailbox status from the untagged data of SELECT/EXAMINE.
pub(crate) fn parse_mailbox_status(responses: &[UntaggedResponse]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response in responses {
        match response {
            UntaggedResponse::Exists(n) => status.exists = Some(*n),
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Flags(flags) => status.flags.clone_from(flags),
            UntaggedResponse::Status {
                code: Some(code), ..
            } => match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
                ResponseCode::UidNext(v) => status.uid_next = Some(*v),
                ResponseCode::PermanentFlags(flags) => status.permanent_flags.clone_from(flags),
                ResponseCode::ReadOnly => status.read_only = true,
                _ => {}
            },
            _ => {}
        }
    }

    status
}
