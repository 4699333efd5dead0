//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use super::{Client, Exchange};
use super::states::{Authenticated, Selected};
use crate::command::{Command, FetchAttribute};
use crate::connection::framed::is_tagged;
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::MailboxStatus;
use crate::{Error, Result};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the selected mailbox name.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Returns true if the mailbox was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.state.is_read_only()
    }

    /// Returns the mailbox status, updated by every command's untagged data.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        self.state.status()
    }

    /// Searches with the given criteria and returns matching UIDs.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let untagged = self
            .execute_selected(&Command::Search {
                criteria: criteria.to_string(),
                uid: true,
            })
            .await?;

        Ok(untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Fetches by UID set and hands each message to `on_message` as soon as
    /// its FETCH response has been read.
    pub async fn uid_fetch_with<F>(
        &mut self,
        set: &str,
        items: Vec<FetchAttribute>,
        mut on_message: F,
    ) -> Result<()>
    where
        F: FnMut(u32, Vec<FetchItem>),
    {
        let tag = self.tag_gen.next_tag();
        let command = Command::Fetch {
            set: set.to_string(),
            items,
            uid: true,
        };
        self.stream.write_command(&tag, &command).await?;

        loop {
            let bytes = self.stream.read_response().await?;
            if is_tagged(&bytes, &tag) {
                return match ResponseParser::parse(&bytes)? {
                    Response::Tagged {
                        status, code, text, ..
                    } => Exchange {
                        untagged: Vec::new(),
                        status,
                        code,
                        text,
                    }
                    .into_result()
                    .map(drop),
                    other => Err(Error::Protocol(format!("unexpected completion: {other:?}"))),
                };
            }
            match ResponseParser::parse(&bytes) {
                Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items })) => {
                    on_message(seq, items);
                }
                Ok(Response::Untagged(other)) => self.track(&other),
                Ok(other) => warn!(?other, "Unexpected response during FETCH"),
                Err(e) => warn!(error = %e, "Skipping unparsable FETCH response"),
            }
        }
    }

    /// Permanently removes messages flagged `\Deleted`.
    ///
    /// Returns the expunged sequence numbers.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        let untagged = self.execute_selected(&Command::Expunge).await?;
        Ok(untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }

    /// Closes the current mailbox and returns to authenticated state.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?.into_result()?;
        Ok(self.into_state(Authenticated))
    }

    /// Gracefully disconnects from the server.
    pub async fn logout(mut self) -> Result<()> {
        self.send_logout().await
    }

    async fn execute_selected(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let untagged = self.execute(command).await?.into_result()?;
        for response in &untagged {
            self.track(response);
        }
        Ok(untagged)
    }

    /// Applies mailbox size changes reported in untagged data.
    fn track(&mut self, response: &UntaggedResponse) {
        let status = &mut self.state.status;
        match response {
            UntaggedResponse::Exists(n) => status.exists = Some(*n),
            UntaggedResponse::Expunge(_) => {
                status.exists = status.exists.map(|n| n.saturating_sub(1));
            }
            _ => {}
        }
    }
}
