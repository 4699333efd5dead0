//! POP3 connection management with type-state pattern.

mod client;

pub use client::{Authorization, Pop3Connection, Transaction};

use mailsync_net::{MailStream, Security, TransportConfig};
use tracing::debug;

use crate::error::Result;

/// Credentials and the mechanism family to use with them.
#[derive(Clone)]
pub enum AuthMethod {
    /// `AUTH PLAIN`, falling back to `USER`/`PASS`.
    Plain {
        /// Mailbox name
        username: String,
        /// Password
        password: String,
    },
    /// `AUTH CRAM-MD5`, falling back to APOP.
    CramMd5 {
        /// Mailbox name
        username: String,
        /// Password
        password: String,
    },
    /// `AUTH EXTERNAL` with the TLS client certificate.
    External {
        /// Authorization identity
        username: String,
    },
    /// `AUTH XOAUTH2` with a bearer token.
    XOAuth2 {
        /// Account name
        username: String,
        /// `OAuth2` access token
        access_token: String,
    },
}

// Secrets stay out of logs and panic messages.
impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, username) = match self {
            Self::Plain { username, .. } => ("Plain", username),
            Self::CramMd5 { username, .. } => ("CramMd5", username),
            Self::External { username } => ("External", username),
            Self::XOAuth2 { username, .. } => ("XOAuth2", username),
        };
        f.debug_struct(name)
            .field("username", username)
            .finish_non_exhaustive()
    }
}

/// Connects, negotiates security and authenticates.
///
/// With [`Security::StartTls`] the session is upgraded with STLS before any
/// credentials are sent.
///
/// # Errors
///
/// Returns transport errors for connect and TLS failures,
/// [`Error::StartTlsUnavailable`](crate::Error::StartTlsUnavailable) and
/// [`Error::Auth`](crate::Error::Auth).
pub async fn connect(
    host: &str,
    port: u16,
    security: Security,
    config: &TransportConfig,
    auth: &AuthMethod,
) -> Result<Pop3Connection<MailStream>> {
    debug!(host, port, ?security, "Connecting to POP3 server");
    let stream = mailsync_net::connect(host, port, security, config).await?;
    let mut conn = Pop3Connection::from_stream(stream, config.io_timeout).await?;

    if security == Security::StartTls {
        let timestamp = conn.greeting_timestamp().map(ToString::to_string);
        let plain = conn.stls().await?;
        let tls = plain.upgrade_to_tls(host, config).await?;
        conn = Pop3Connection::resume_after_tls(tls, config.io_timeout, timestamp).await?;
    }

    conn.authenticate(auth).await
}
