//! Error types for the transport layer.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while connecting, upgrading or exchanging lines.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an established socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// DNS resolution or TCP connect failed.
    #[error("Cannot connect to {host}:{port}: {source}")]
    Connect {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// TLS negotiation failed for a reason other than certificate trust.
    #[error("TLS error: {0}")]
    Tls(rustls::Error),

    /// The server certificate was rejected.
    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A read, write or connect did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer sent a line longer than the configured limit.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// A SASL challenge could not be decoded.
    #[error("Invalid SASL challenge: {0}")]
    InvalidChallenge(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns true for failures that happened on an already open socket.
    ///
    /// Timeouts count as I/O failures.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_) | Self::LineTooLong(_))
    }

    /// Classifies an error returned by a TLS handshake.
    ///
    /// `tokio-rustls` reports handshake failures as `io::Error` wrapping a
    /// `rustls::Error`; certificate problems are split out so callers can
    /// offer a trust decision.
    #[must_use]
    pub fn from_handshake(err: io::Error) -> Self {
        let tls = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            .cloned();
        match tls {
            Some(cert @ rustls::Error::InvalidCertificate(_)) => {
                Self::CertificateValidation(cert.to_string())
            }
            Some(other) => Self::Tls(other),
            None => Self::Io(err),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
