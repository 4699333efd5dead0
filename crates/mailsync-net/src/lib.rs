//! # mailsync-net
//!
//! Transport primitives shared by the POP3 and IMAP drivers:
//!
//! - [`MailStream`]: a TCP socket that is either plaintext or wrapped in TLS
//!   (rustls), with in-place STARTTLS upgrade
//! - [`connect`]: address resolution with per-address connect timeouts
//! - [`LineStream`]: buffered CRLF line I/O and counted reads, every
//!   operation bounded by an I/O timeout
//! - [`sasl`]: PLAIN, CRAM-MD5, EXTERNAL and XOAUTH2 encoders plus APOP
//!
//! Certificate failures are reported as [`Error::CertificateValidation`],
//! separate from other TLS errors, so callers can ask the user for a trust
//! decision.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod line;
pub mod sasl;
pub mod stream;
pub mod tls;

pub use error::{Error, Result};
pub use line::LineStream;
pub use stream::{MailStream, Security, TransportConfig, TransportConfigBuilder, connect};
pub use tls::{ClientIdentity, TlsConfig, TrustPolicy};
