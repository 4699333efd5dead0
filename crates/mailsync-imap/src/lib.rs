//! # mailsync-imap
//!
//! The IMAP client driver used by the folder synchronizer. It covers the
//! subset of RFC 3501 / RFC 9051 that a one-way sync needs:
//!
//! - **Type-state connection management**: compile-time enforcement of
//!   `NotAuthenticated` → `Authenticated` → `Selected`
//! - **Authentication**: LOGIN, `AUTHENTICATE PLAIN`, CRAM-MD5, EXTERNAL
//!   and XOAUTH2, chosen against the advertised capabilities
//! - **STARTTLS** with no plaintext fallback
//! - **Sans-I/O parser** for greetings, status responses, NAMESPACE, SEARCH
//!   and FETCH data, literals included
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_net::{Security, TransportConfig};
//!
//! let config = TransportConfig::default();
//! let client = mailsync_imap::connect("imap.example.com", 993, Security::Implicit, &config).await?;
//! let client = client.authenticate_plain("user@example.com", "password").await?;
//! let mut inbox = client.examine("INBOX").await?;
//! let uids = inbox.uid_search("ALL").await?;
//! inbox.logout().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login()/authenticate_*() ──→ Authenticated
//! Authenticated    ── select()/examine() ────────→ Selected
//! Selected         ── close() ───────────────────→ Authenticated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, TagGenerator, uid_set};
pub use connection::{
    Authenticated, Client, FramedStream, NotAuthenticated, ResponseAccumulator, Selected, connect,
};
pub use error::{Error, Result};
pub use parser::{Address, Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{Capability, Flag, MailboxStatus, Namespace, Namespaces, ResponseCode, Status};
