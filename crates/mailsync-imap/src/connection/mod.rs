//! IMAP connection management.
//!
//! - Framed I/O for the IMAP protocol
//! - Type-state client wrapper
//! - [`connect`], which opens the transport and performs STARTTLS when asked

mod client;
mod framed;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use framed::{FramedStream, ResponseAccumulator};

use mailsync_net::{MailStream, Security, TransportConfig};
use tracing::debug;

use crate::Result;

/// Connects to an IMAP server and reads its greeting.
///
/// With [`Security::StartTls`] the connection is upgraded before it is
/// returned; a server that does not advertise STARTTLS fails with
/// [`Error::StartTlsUnavailable`](crate::Error::StartTlsUnavailable).
///
/// # Errors
///
/// Returns transport errors for connect and TLS failures and protocol
/// errors for a bad greeting.
pub async fn connect(
    host: &str,
    port: u16,
    security: Security,
    config: &TransportConfig,
) -> Result<Client<MailStream, NotAuthenticated>> {
    debug!(host, port, ?security, "Connecting to IMAP server");
    let stream = mailsync_net::connect(host, port, security, config).await?;
    let client = Client::from_stream(stream, config.io_timeout).await?;

    match security {
        Security::StartTls => {
            let plain = client.starttls().await?;
            let tls = plain.upgrade_to_tls(host, config).await?;
            Client::resume_after_tls(tls, config.io_timeout).await
        }
        Security::None | Security::Implicit => Ok(client),
    }
}
