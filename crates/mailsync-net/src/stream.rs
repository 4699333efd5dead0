//! Socket types and connection establishment.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::tls::{ClientIdentity, TlsConfig, TrustPolicy, create_tls_connector};
use crate::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption. **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade in-band (STARTTLS or STLS).
    StartTls,
    /// TLS from the first byte. **Recommended.**
    #[default]
    Implicit,
}

/// Timeouts and TLS settings for a connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect timeout, applied per resolved address.
    pub connect_timeout: Duration,
    /// Timeout for every individual read or write.
    pub io_timeout: Duration,
    /// TLS settings.
    pub tls: TlsConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            tls: TlsConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Sets the certificate trust policy.
    #[must_use]
    pub const fn trust(mut self, trust: TrustPolicy) -> Self {
        self.config.tls.trust = trust;
        self
    }

    /// Sets the client certificate.
    #[must_use]
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.config.tls.identity = Some(identity);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// A stream that can be either plaintext or TLS.
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("MailStream::Plain"),
            Self::Tls(_) => f.write_str("MailStream::Tls"),
        }
    }
}

impl MailStream {
    /// Upgrades a plaintext stream to TLS after a successful STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CertificateValidation`] if the server certificate is
    /// rejected, [`Error::Tls`] for other handshake failures and
    /// [`Error::InvalidState`] if the stream is already encrypted.
    pub async fn upgrade_to_tls(self, host: &str, config: &TransportConfig) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                debug!(host, "Upgrading connection to TLS");
                let tls = handshake(tcp, host, config).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens a connection to `host:port`.
///
/// With [`Security::Implicit`] the socket is wrapped in TLS before any
/// protocol bytes are exchanged. With [`Security::StartTls`] the plaintext
/// stream is returned and the protocol driver is responsible for the upgrade.
///
/// # Errors
///
/// Returns [`Error::Connect`] if no resolved address accepts the connection
/// and a TLS classification error if the handshake fails.
pub async fn connect(
    host: &str,
    port: u16,
    security: Security,
    config: &TransportConfig,
) -> Result<MailStream> {
    let tcp = connect_tcp(host, port, config.connect_timeout).await?;
    match security {
        Security::Implicit => {
            let tls = handshake(tcp, host, config).await?;
            Ok(MailStream::Tls(Box::new(tls)))
        }
        Security::None | Security::StartTls => Ok(MailStream::Plain(tcp)),
    }
}

async fn connect_tcp(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let connect_error = |source: io::Error| Error::Connect {
        host: host.to_string(),
        port,
        source,
    };

    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(connect_error)?
        .collect();

    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for addr in addrs {
        debug!(%addr, "Connecting");
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(tcp)) => return Ok(tcp),
            Ok(Err(e)) => last_error = e,
            Err(_) => {
                last_error = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out"),
                );
            }
        }
    }
    Err(connect_error(last_error))
}

async fn handshake(
    tcp: TcpStream,
    host: &str,
    config: &TransportConfig,
) -> Result<TlsStream<TcpStream>> {
    let connector = create_tls_connector(&config.tls)?;
    let server_name = ServerName::try_from(host.to_string())?;
    match timeout(config.io_timeout, connector.connect(server_name, tcp)).await {
        Ok(Ok(tls)) => Ok(tls),
        Ok(Err(e)) => Err(Error::from_handshake(e)),
        Err(_) => Err(Error::Timeout(config.io_timeout)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TransportConfig::builder()
            .connect_timeout(Duration::from_secs(5))
            .io_timeout(Duration::from_secs(7))
            .trust(TrustPolicy::AcceptInvalidCertificates)
            .build();

        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(7));
        assert_eq!(config.tls.trust, TrustPolicy::AcceptInvalidCertificates);
        assert!(config.tls.identity.is_none());
    }

    #[test]
    fn test_default_security() {
        assert_eq!(Security::default(), Security::Implicit);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Bind then drop to find a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port, Security::None, &TransportConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port, Security::StartTls, &TransportConfig::default())
            .await
            .unwrap();
        assert!(!stream.is_tls());
    }
}
