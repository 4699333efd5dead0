//! Remote folders.
//!
//! A [`RemoteStore`] hands out [`RemoteFolder`] values, one implementation
//! per protocol. A folder owns its connection while open; the synchronizer
//! drives it through `open → list → fetch → close`.

mod imap;
mod pop3;
#[cfg(test)]
mod scripted;
mod state;

pub use imap::{ImapFolder, ImapStore, resolve_path};
pub use pop3::{Pop3Folder, Pop3Store};
pub use state::FolderState;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::{AuthType, ServerSettings};

/// Returns the password, or for XOAUTH2 the access token with the password
/// as fallback.
pub(crate) fn required_secret<'a>(
    settings: &'a ServerSettings,
    access_token: Option<&'a str>,
) -> Result<&'a str> {
    let secret = match settings.auth_type {
        AuthType::XOAuth2 => access_token.or(settings.password.as_deref()),
        AuthType::Plain | AuthType::CramMd5 | AuthType::External => settings.password.as_deref(),
    };
    secret.ok_or_else(|| {
        Error::AuthenticationFailed(format!(
            "no credentials configured for {}",
            settings.username
        ))
    })
}

/// Message flag tracked by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// Any other keyword, e.g. `$Forwarded`.
    Keyword(String),
}

impl Flag {
    /// Returns the flag as written on the wire and in the cache.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Keyword(k) => k,
        }
    }

    /// Parses a flag, case-insensitively for system flags.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

/// Access mode requested when opening a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// EXAMINE on IMAP.
    ReadOnly,
    /// SELECT on IMAP.
    ReadWrite,
}

/// A message attribute group requested by a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchItem {
    /// Flags.
    Flags,
    /// Size, dates and envelope headers.
    Envelope,
    /// MIME structure.
    Structure,
    /// The complete message.
    Body,
    /// The first `max_body_size` octets, enough for a preview.
    BodySane,
}

/// The attribute groups to fetch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchProfile {
    items: Vec<FetchItem>,
    max_body_size: Option<u64>,
}

impl FetchProfile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item. Adding an item twice keeps the first position.
    #[must_use]
    pub fn with(mut self, item: FetchItem) -> Self {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
        self
    }

    /// Sets the byte limit for [`FetchItem::BodySane`].
    #[must_use]
    pub const fn with_max_body_size(mut self, size: u64) -> Self {
        self.max_body_size = Some(size);
        self
    }

    /// Returns the requested items in order.
    #[must_use]
    pub fn items(&self) -> &[FetchItem] {
        &self.items
    }

    /// Returns true if `item` was requested.
    #[must_use]
    pub fn contains(&self, item: FetchItem) -> bool {
        self.items.contains(&item)
    }

    /// Returns the [`FetchItem::BodySane`] limit.
    #[must_use]
    pub const fn max_body_size(&self) -> Option<u64> {
        self.max_body_size
    }
}

impl<const N: usize> From<[FetchItem; N]> for FetchProfile {
    fn from(items: [FetchItem; N]) -> Self {
        items.into_iter().fold(Self::new(), Self::with)
    }
}

/// Envelope headers of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// `Date:` header.
    pub date: Option<DateTime<Utc>>,
    /// `Subject:` header.
    pub subject: Option<String>,
    /// `From:` addresses.
    pub from: Vec<String>,
    /// `Message-ID:` header.
    pub message_id: Option<String>,
}

/// One message in a remote folder, filled in as profiles are fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHandle {
    /// Unique id within the folder.
    pub uid: String,
    /// Current flags.
    pub flags: BTreeSet<Flag>,
    /// Size in octets.
    pub size: u64,
    /// Rendered MIME structure.
    pub structure: Option<String>,
    /// Message content, complete or truncated.
    pub body: Option<Vec<u8>>,
    /// Envelope headers.
    pub envelope: Option<Envelope>,
    /// Server arrival date.
    pub internal_date: Option<DateTime<Utc>>,
}

impl MessageHandle {
    /// Creates a handle carrying only a uid.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    /// Sets the size.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Returns the earlier of the arrival and envelope dates.
    #[must_use]
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        let sent = self.envelope.as_ref().and_then(|e| e.date);
        match (self.internal_date, sent) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Hands out folders for one configured server.
pub trait RemoteStore: Send + Sync {
    /// Folder type of this store.
    type Folder: RemoteFolder;

    /// Returns a closed folder handle. Nothing is sent until `open`.
    fn folder(&self, name: &str) -> Self::Folder;
}

/// A folder on the server.
///
/// State machine: `Closed → Opening → Open(mode) → Closed`. Listing,
/// counting, fetching and expunging require `Open`.
#[async_trait]
pub trait RemoteFolder: Send {
    /// Folder name as configured.
    fn name(&self) -> &str;

    /// Current state.
    fn state(&self) -> FolderState;

    /// Returns true if the folder is open.
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Connects, authenticates and opens the folder.
    ///
    /// # Errors
    ///
    /// `NotFound` if the folder does not exist, or a connection,
    /// security or authentication error.
    async fn open(&mut self, mode: OpenMode) -> Result<()>;

    /// Closes the folder and the connection. Never fails, may be repeated.
    async fn close(&mut self);

    /// Number of messages. A negative value is a server defect passed
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// `IllegalState` if not open.
    fn message_count(&self) -> Result<i64>;

    /// UID validity reported on open, if the protocol has one.
    fn uid_validity(&self) -> Option<u32>;

    /// Lists messages in the 1-based sequence range `start..=end`.
    ///
    /// With `since` set, the server may leave out messages that arrived
    /// before that date.
    ///
    /// # Errors
    ///
    /// `IllegalState` if not open, or a protocol error.
    async fn messages(
        &mut self,
        start: u32,
        end: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>>;

    /// Fills in the attributes named by `profile`, calling `on_message` as
    /// each message completes. An empty slice sends nothing.
    ///
    /// # Errors
    ///
    /// `IllegalState` if not open, or a protocol error.
    async fn fetch(
        &mut self,
        messages: &mut [MessageHandle],
        profile: &FetchProfile,
        on_message: &mut (dyn for<'m> FnMut(&'m MessageHandle) + Send),
    ) -> Result<()>;

    /// Permanently removes messages marked deleted.
    ///
    /// # Errors
    ///
    /// `IllegalState` if not open, or a protocol error.
    async fn expunge(&mut self) -> Result<()>;
}
