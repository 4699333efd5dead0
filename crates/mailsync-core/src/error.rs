//! Error types for the sync engine.

use std::io;

use thiserror::Error;

/// Errors that can occur while configuring, connecting or synchronizing.
#[derive(Debug, Error)]
pub enum Error {
    /// DNS resolution or socket connect failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// TLS negotiation failed, or TLS is required but unavailable.
    #[error("Security error: {0}")]
    Security(String),

    /// The server certificate is not trusted.
    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),

    /// The server rejected the credentials or offers no usable mechanism.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Malformed or unexpected server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation invoked in the wrong folder or connection state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Invalid server URI.
    #[error("Invalid server URI: {0}")]
    Format(String),

    /// The remote folder does not exist.
    #[error("Folder not found: {0}")]
    NotFound(String),

    /// I/O error on an open connection, timeouts included.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Local cache operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The sync pass was cancelled.
    #[error("Sync cancelled")]
    Cancelled,
}

impl Error {
    /// Short name of the error kind, used in sync failure messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "Connect",
            Self::Security(_) => "Security",
            Self::CertificateValidation(_) => "CertificateValidation",
            Self::AuthenticationFailed(_) => "AuthenticationFailed",
            Self::Protocol(_) => "Protocol",
            Self::IllegalState(_) => "IllegalState",
            Self::Format(_) => "Format",
            Self::NotFound(_) => "NotFound",
            Self::Io(_) => "Io",
            Self::Storage(_) => "Storage",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Message of the innermost cause, without the kind prefix.
    #[must_use]
    pub fn root_cause(&self) -> String {
        match self {
            Self::Connect(msg)
            | Self::Security(msg)
            | Self::CertificateValidation(msg)
            | Self::AuthenticationFailed(msg)
            | Self::Protocol(msg)
            | Self::IllegalState(msg)
            | Self::Format(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::Io(err) => err.to_string(),
            Self::Storage(err) => err.to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }

    /// Renders the error as `"<Kind>: <root cause>"`.
    #[must_use]
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.kind(), self.root_cause())
    }
}

impl From<mailsync_net::Error> for Error {
    fn from(err: mailsync_net::Error) -> Self {
        use mailsync_net::Error as Net;

        match err {
            Net::Io(e) => Self::Io(e),
            Net::Timeout(duration) => Self::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("operation timed out after {duration:?}"),
            )),
            Net::LineTooLong(max) => Self::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {max} bytes"),
            )),
            e @ (Net::Connect { .. } | Net::InvalidDnsName(_)) => Self::Connect(e.to_string()),
            Net::Tls(e) => Self::Security(e.to_string()),
            Net::CertificateValidation(msg) => Self::CertificateValidation(msg),
            Net::InvalidChallenge(msg) => Self::AuthenticationFailed(msg),
            Net::InvalidState(msg) => Self::IllegalState(msg),
        }
    }
}

impl From<mailsync_imap::Error> for Error {
    fn from(err: mailsync_imap::Error) -> Self {
        use mailsync_imap::Error as Imap;

        match err {
            Imap::Transport(e) => e.into(),
            Imap::Auth(msg) => Self::AuthenticationFailed(msg),
            Imap::StartTlsUnavailable => {
                Self::Security("TLS required but unavailable".to_string())
            }
            Imap::InvalidState(msg) => Self::IllegalState(msg),
            e @ (Imap::Parse { .. }
            | Imap::No(_)
            | Imap::Bad(_)
            | Imap::Bye(_)
            | Imap::Protocol(_)) => Self::Protocol(e.to_string()),
        }
    }
}

impl From<mailsync_pop3::Error> for Error {
    fn from(err: mailsync_pop3::Error) -> Self {
        use mailsync_pop3::Error as Pop3;

        match err {
            Pop3::Transport(e) => e.into(),
            Pop3::Auth(msg) => Self::AuthenticationFailed(msg),
            Pop3::StartTlsUnavailable => {
                Self::Security("TLS required but unavailable".to_string())
            }
            e @ (Pop3::Server(_) | Pop3::Protocol(_)) => Self::Protocol(e.to_string()),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
