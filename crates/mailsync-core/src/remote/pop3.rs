//! POP3 folders. POP3 has exactly one folder, INBOX.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailparse::MailAddr;
use mailsync_net::{MailStream, TransportConfig};
use mailsync_pop3::{AuthMethod, Pop3Connection};
use tracing::{debug, info, warn};

use super::imap::parse_header_date;
use super::{
    Envelope, FetchItem, FetchProfile, FolderState, MessageHandle, OpenMode, RemoteFolder,
    RemoteStore, required_secret,
};
use crate::error::{Error, Result};
use crate::settings::{AuthType, ServerSettings};

/// Average line length used to turn a byte limit into a TOP line count.
const AVERAGE_LINE_LENGTH: u64 = 76;

/// POP3 server from which the INBOX is opened.
#[derive(Debug, Clone)]
pub struct Pop3Store {
    settings: Arc<ServerSettings>,
    transport: Arc<TransportConfig>,
    access_token: Option<Arc<str>>,
}

impl Pop3Store {
    /// Creates a store for the given server.
    #[must_use]
    pub fn new(settings: ServerSettings, transport: TransportConfig) -> Self {
        Self {
            settings: Arc::new(settings),
            transport: Arc::new(transport),
            access_token: None,
        }
    }

    /// Sets the `OAuth2` access token used with XOAUTH2.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn auth_method(&self) -> Result<AuthMethod> {
        let settings = &self.settings;
        let username = settings.username.clone();
        let token = self.access_token.as_deref();
        Ok(match settings.auth_type {
            AuthType::Plain => AuthMethod::Plain {
                username,
                password: required_secret(settings, token)?.to_string(),
            },
            AuthType::CramMd5 => AuthMethod::CramMd5 {
                username,
                password: required_secret(settings, token)?.to_string(),
            },
            AuthType::External => AuthMethod::External { username },
            AuthType::XOAuth2 => AuthMethod::XOAuth2 {
                username,
                access_token: required_secret(settings, token)?.to_string(),
            },
        })
    }
}

impl RemoteStore for Pop3Store {
    type Folder = Pop3Folder;

    fn folder(&self, name: &str) -> Pop3Folder {
        Pop3Folder {
            name: name.to_string(),
            store: self.clone(),
            state: FolderState::Closed,
            connection: None,
            count: 0,
            listing: None,
        }
    }
}

/// One entry of the UIDL/LIST listing.
#[derive(Debug, Clone)]
struct Listed {
    number: u32,
    uid: String,
    size: u64,
}

/// The INBOX of a POP3 server.
pub struct Pop3Folder {
    name: String,
    store: Pop3Store,
    state: FolderState,
    connection: Option<Pop3Connection<MailStream>>,
    count: i64,
    listing: Option<Vec<Listed>>,
}

impl std::fmt::Debug for Pop3Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Folder")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl Pop3Folder {
    /// Marks messages for deletion with DELE. The server removes them when
    /// the folder is closed.
    ///
    /// Unknown uids are skipped.
    ///
    /// # Errors
    ///
    /// `IllegalState` if not open, or a protocol error.
    pub async fn delete(&mut self, uids: &[String]) -> Result<()> {
        self.state.require_open("delete", &self.name)?;
        let numbers = self.numbers().await?;
        let connection = self.connection()?;
        for uid in uids {
            match numbers.get(uid) {
                Some(&number) => connection.dele(number).await?,
                None => debug!(%uid, "Not deleting unknown message"),
            }
        }
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut Pop3Connection<MailStream>> {
        self.connection
            .as_mut()
            .ok_or_else(|| Error::IllegalState(format!("folder {} has no connection", self.name)))
    }

    /// Loads UIDL and LIST once per open and returns them joined by
    /// message number.
    async fn listing(&mut self) -> Result<&[Listed]> {
        if self.listing.is_none() {
            let connection = self.connection()?;
            let uids = connection.uidl().await?;
            let sizes: HashMap<u32, u64> = connection.list().await?.into_iter().collect();
            let listing = uids
                .into_iter()
                .map(|(number, uid)| Listed {
                    number,
                    size: sizes.get(&number).copied().unwrap_or(0),
                    uid,
                })
                .collect();
            self.listing = Some(listing);
        }
        Ok(self.listing.as_deref().unwrap_or_default())
    }

    async fn numbers(&mut self) -> Result<HashMap<String, u32>> {
        Ok(self
            .listing()
            .await?
            .iter()
            .map(|listed| (listed.uid.clone(), listed.number))
            .collect())
    }
}

#[async_trait]
impl RemoteFolder for Pop3Folder {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> FolderState {
        self.state
    }

    async fn open(&mut self, mode: OpenMode) -> Result<()> {
        if self.state == FolderState::Open(mode) {
            return Ok(());
        }
        if !self.name.eq_ignore_ascii_case("INBOX") {
            return Err(Error::NotFound(format!(
                "POP3 has no folder named {}",
                self.name
            )));
        }
        self.close().await;

        self.state = FolderState::Opening;
        let settings = Arc::clone(&self.store.settings);
        let port = settings.effective_port();
        info!(host = %settings.host, port, "Opening POP3 inbox");

        let opened = async {
            let auth = self.store.auth_method()?;
            let mut connection = mailsync_pop3::connect(
                &settings.host,
                port,
                settings.connection_security.into(),
                &self.store.transport,
                &auth,
            )
            .await?;
            let (count, size) = connection.stat().await?;
            debug!(count, size, "STAT");
            Ok::<_, Error>((connection, count))
        }
        .await;

        match opened {
            Ok((connection, count)) => {
                self.connection = Some(connection);
                self.count = count;
                self.state = FolderState::Open(mode);
                Ok(())
            }
            Err(e) => {
                self.state = FolderState::Closed;
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.quit().await {
                warn!(error = %e, "QUIT failed");
            }
        }
        self.listing = None;
        self.count = 0;
        self.state = FolderState::Closed;
    }

    fn message_count(&self) -> Result<i64> {
        self.state.require_open("message_count", &self.name)?;
        Ok(self.count)
    }

    fn uid_validity(&self) -> Option<u32> {
        None
    }

    async fn messages(
        &mut self,
        start: u32,
        end: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>> {
        self.state.require_open("messages", &self.name)?;
        if since.is_some() {
            debug!("POP3 cannot search by date, listing the whole range");
        }
        Ok(self
            .listing()
            .await?
            .iter()
            .filter(|listed| (start..=end).contains(&listed.number))
            .map(|listed| MessageHandle::new(listed.uid.clone()).with_size(listed.size))
            .collect())
    }

    async fn fetch(
        &mut self,
        messages: &mut [MessageHandle],
        profile: &FetchProfile,
        on_message: &mut (dyn for<'m> FnMut(&'m MessageHandle) + Send),
    ) -> Result<()> {
        self.state.require_open("fetch", &self.name)?;
        if messages.is_empty() {
            return Ok(());
        }
        let numbers = self.numbers().await?;
        let connection = self.connection()?;

        for message in messages.iter_mut() {
            let Some(&number) = numbers.get(&message.uid) else {
                warn!(uid = %message.uid, "Message is no longer on the server");
                continue;
            };

            for item in profile.items() {
                match item {
                    FetchItem::Flags | FetchItem::Structure => {}
                    FetchItem::Envelope => {
                        let headers = match connection.top(number, 0).await? {
                            Some(headers) => headers,
                            None => connection.retr(number).await?,
                        };
                        message.envelope = Some(parse_envelope(&headers));
                    }
                    FetchItem::Body => message.body = Some(connection.retr(number).await?),
                    FetchItem::BodySane => {
                        let partial = match profile.max_body_size().filter(|&max| max > 0) {
                            Some(max) => {
                                let lines =
                                    u32::try_from(max / AVERAGE_LINE_LENGTH).unwrap_or(u32::MAX);
                                connection.top(number, lines).await?
                            }
                            None => None,
                        };
                        let body = match partial {
                            Some(body) => body,
                            None => connection.retr(number).await?,
                        };
                        message.body = Some(body);
                    }
                }
            }
            on_message(message);
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        self.state.require_open("expunge", &self.name)?;
        debug!("POP3 removes deleted messages at QUIT");
        Ok(())
    }
}

/// Extracts envelope fields from a raw header block. Encoded words are
/// decoded; unparseable headers leave the envelope empty.
fn parse_envelope(raw: &[u8]) -> Envelope {
    let mut envelope = Envelope::default();
    let Ok((headers, _)) = mailparse::parse_headers(raw) else {
        return envelope;
    };

    for header in &headers {
        let value = header.get_value();
        match header.get_key().to_ascii_lowercase().as_str() {
            "date" => envelope.date = parse_header_date(&value),
            "subject" => envelope.subject = Some(value),
            "from" => envelope.from = parse_addresses(&value),
            "message-id" => envelope.message_id = Some(value.trim().to_string()),
            _ => {}
        }
    }
    envelope
}

fn parse_addresses(value: &str) -> Vec<String> {
    let Ok(list) = mailparse::addrparse(value) else {
        return Vec::new();
    };
    list.iter()
        .flat_map(|entry| match entry {
            MailAddr::Single(single) => vec![single.addr.clone()],
            MailAddr::Group(group) => group.addrs.iter().map(|s| s.addr.clone()).collect(),
        })
        .collect()
}
