//! Error types for POP3 operations.

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket, TLS or timeout failure from the transport.
    #[error(transparent)]
    Transport(#[from] mailsync_net::Error),

    /// Server answered `-ERR`.
    #[error("Server returned -ERR: {0}")]
    Server(String),

    /// Credentials or mechanism rejected, or no usable mechanism offered.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// TLS was required but the server does not offer STLS.
    #[error("STLS is required but not advertised by the server")]
    StartTlsUnavailable,

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(mailsync_net::Error::Io(err))
    }
}
