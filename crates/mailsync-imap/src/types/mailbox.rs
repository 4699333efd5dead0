//! Mailbox state and response codes.

use super::{Capability, Flag};

/// Response code carried in `[...]` after a status keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`
    Alert,
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`
    TryCreate,
    /// `NONEXISTENT` (RFC 5530)
    NonExistent,
    /// `UIDVALIDITY n`
    UidValidity(u32),
    /// `UIDNEXT n`
    UidNext(u32),
    /// `UNSEEN n`
    Unseen(u32),
    /// `PERMANENTFLAGS (...)`
    PermanentFlags(Vec<Flag>),
    /// `CAPABILITY ...`
    Capability(Vec<Capability>),
    /// Any other code, with its raw text.
    Unknown(String),
}

/// Mailbox status collected from a SELECT or EXAMINE exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Message count from `* n EXISTS`, if the server sent one.
    pub exists: Option<u32>,
    /// Recent count from `* n RECENT`.
    pub recent: u32,
    /// `UIDVALIDITY` value.
    pub uid_validity: Option<u32>,
    /// `UIDNEXT` value.
    pub uid_next: Option<u32>,
    /// Flags defined in the mailbox.
    pub flags: Vec<Flag>,
    /// Flags that can be changed permanently.
    pub permanent_flags: Vec<Flag>,
    /// True when the server granted read-only access.
    pub read_only: bool,
}

/// One namespace entry from a NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Prefix prepended to mailbox names, e.g. `INBOX.`.
    pub prefix: String,
    /// Hierarchy delimiter, if any.
    pub delimiter: Option<char>,
}

/// Personal, other-users and shared namespaces (RFC 2342).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Vec<Namespace>,
    /// Other users' namespaces.
    pub other: Vec<Namespace>,
    /// Shared namespaces.
    pub shared: Vec<Namespace>,
}
