//! Type-state markers for IMAP client connection states.
//!
//! `Selected` carries the runtime state of the selected mailbox; the other
//! states are plain markers.

use std::sync::Arc;

use crate::types::MailboxStatus;

/// Marker type for the not-authenticated state.
///
/// In this state, only STARTTLS and authentication commands are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker type for the authenticated state.
///
/// In this state, NAMESPACE, SELECT and EXAMINE are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// State for a selected mailbox.
#[derive(Debug, Clone)]
pub struct Selected {
    /// The selected mailbox name.
    pub(crate) mailbox: Arc<str>,
    /// Whether the mailbox was opened read-only (via EXAMINE).
    pub(crate) read_only: bool,
    /// Mailbox status, kept current from untagged EXISTS and EXPUNGE.
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// Creates a new Selected state.
    #[must_use]
    pub fn new(mailbox: impl Into<Arc<str>>, read_only: bool, status: MailboxStatus) -> Self {
        Self {
            mailbox: mailbox.into(),
            read_only,
            status,
        }
    }

    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Returns true if the mailbox was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the current mailbox status.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// Returns the message count, if the server reported one.
    #[must_use]
    pub const fn exists(&self) -> Option<u32> {
        self.status.exists
    }

    /// Returns the UID validity value.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<u32> {
        self.status.uid_validity
    }
}
