//! # mailsync-pop3
//!
//! A POP3 client (RFC 1939) for the folder synchronizer, with the
//! extensions it relies on:
//!
//! - **CAPA** (RFC 2449) and **AUTH** (RFC 5034) capability discovery
//! - **STLS** (RFC 2595), never falling back to plaintext
//! - **Authentication**: `AUTH PLAIN` or `USER`/`PASS`, `AUTH CRAM-MD5` or
//!   APOP, `AUTH EXTERNAL`, `AUTH XOAUTH2`
//! - **Transaction commands**: STAT, UIDL, LIST, RETR, TOP, DELE, QUIT
//!
//! ## Connection States
//!
//! ```text
//! ┌───────────────┐
//! │ Authorization │ ─── authenticate() ───→ Transaction
//! └───────────────┘
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

pub use command::Command;
pub use connection::{AuthMethod, Authorization, Pop3Connection, Transaction, connect};
pub use error::{Error, Result};
pub use types::{Capabilities, Reply};
