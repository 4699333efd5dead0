//! IMAP folders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsync_imap::parser::Value;
use mailsync_imap::{Authenticated, Client, FetchAttribute, NotAuthenticated, Selected, uid_set};
use mailsync_net::{MailStream, TransportConfig};
use tracing::{debug, info, warn};

use super::{
    Envelope, FetchItem, FetchProfile, Flag, FolderState, MessageHandle, OpenMode, RemoteFolder,
    RemoteStore,
};
use crate::error::{Error, Result};
use crate::remote::required_secret;
use crate::settings::{AuthType, ServerSettings};

/// IMAP server from which folders are opened.
#[derive(Debug, Clone)]
pub struct ImapStore {
    settings: Arc<ServerSettings>,
    transport: Arc<TransportConfig>,
    access_token: Option<Arc<str>>,
}

impl ImapStore {
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
}

impl RemoteStore for ImapStore {
    type Folder = ImapFolder;

    fn folder(&self, name: &str) -> ImapFolder {
        ImapFolder {
            name: name.to_string(),
            store: self.clone(),
            state: FolderState::Closed,
            path: None,
            client: None,
        }
    }
}

/// A mailbox on an IMAP server.
pub struct ImapFolder {
    name: String,
    store: ImapStore,
    state: FolderState,
    path: Option<String>,
    client: Option<Client<MailStream, Selected>>,
}

impl std::fmt::Debug for ImapFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapFolder")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ImapFolder {
    async fn connect_and_open(&mut self, mode: OpenMode) -> Result<Client<MailStream, Selected>> {
        let settings = &self.store.settings;
        let port = settings.effective_port();
        info!(host = %settings.host, port, folder = %self.name, "Opening IMAP folder");

        let client = mailsync_imap::connect(
            &settings.host,
            port,
            settings.connection_security.into(),
            &self.store.transport,
        )
        .await?;
        let mut client = self.authenticate(client).await?;

        let path = self.remote_path(&mut client).await?;
        debug!(folder = %self.name, %path, ?mode, "Resolved folder path");
        let selected = match mode {
            OpenMode::ReadOnly => client.examine(&path).await,
            OpenMode::ReadWrite => client.select(&path).await,
        };
        let selected = selected.map_err(|e| open_error(e, &path))?;
        self.path = Some(path);
        Ok(selected)
    }

    async fn authenticate(
        &self,
        client: Client<MailStream, NotAuthenticated>,
    ) -> Result<Client<MailStream, Authenticated>> {
        let settings = &self.store.settings;
        let username = settings.username.as_str();
        let token = self.store.access_token.as_deref();

        let authenticated = match settings.auth_type {
            AuthType::Plain => {
                client
                    .authenticate_plain(username, required_secret(settings, token)?)
                    .await?
            }
            AuthType::CramMd5 => {
                client
                    .authenticate_cram_md5(username, required_secret(settings, token)?)
                    .await?
            }
            AuthType::External => client.authenticate_external(username).await?,
            AuthType::XOAuth2 => {
                client
                    .authenticate_xoauth2(username, required_secret(settings, token)?)
                    .await?
            }
        };
        Ok(authenticated)
    }

    async fn remote_path(&self, client: &mut Client<MailStream, Authenticated>) -> Result<String> {
        let settings = &self.store.settings;
        let prefix = if settings.auto_detect_namespace() {
            if client.supports_namespace() {
                let namespaces = client.namespace().await?;
                namespaces.personal.first().map(|ns| ns.prefix.clone())
            } else {
                None
            }
        } else {
            settings.path_prefix().map(ToString::to_string)
        };
        Ok(resolve_path(&self.name, prefix.as_deref()))
    }

    fn selected(&mut self, operation: &str) -> Result<&mut Client<MailStream, Selected>> {
        self.state.require_open(operation, &self.name)?;
        self.client
            .as_mut()
            .ok_or_else(|| Error::IllegalState(format!("folder {} has no connection", self.name)))
    }
}

#[async_trait]
impl RemoteFolder for ImapFolder {
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
        self.close().await;

        self.state = FolderState::Opening;
        match self.connect_and_open(mode).await {
            Ok(client) => {
                let granted = if client.is_read_only() {
                    OpenMode::ReadOnly
                } else {
                    mode
                };
                debug!(
                    folder = %self.name,
                    exists = ?client.status().exists,
                    uid_validity = ?client.status().uid_validity,
                    "Folder opened"
                );
                self.client = Some(client);
                self.state = FolderState::Open(granted);
                Ok(())
            }
            Err(e) => {
                self.state = FolderState::Closed;
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            match client.close().await {
                Ok(authenticated) => {
                    if let Err(e) = authenticated.logout().await {
                        warn!(folder = %self.name, error = %e, "LOGOUT failed");
                    }
                }
                Err(e) => warn!(folder = %self.name, error = %e, "CLOSE failed, dropping connection"),
            }
        }
        self.state = FolderState::Closed;
    }

    fn message_count(&self) -> Result<i64> {
        self.state.require_open("message_count", &self.name)?;
        Ok(self
            .client
            .as_ref()
            .and_then(|client| client.status().exists)
            .map_or(-1, i64::from))
    }

    fn uid_validity(&self) -> Option<u32> {
        self.client
            .as_ref()
            .and_then(|client| client.status().uid_validity)
    }

    async fn messages(
        &mut self,
        start: u32,
        end: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>> {
        let client = self.selected("messages")?;
        if start == 0 || end < start {
            return Ok(Vec::new());
        }

        let mut criteria = format!("{start}:{end} NOT DELETED");
        if let Some(since) = since {
            criteria = format!("{criteria} SINCE {}", since.format("%d-%b-%Y"));
        }
        let uids = client.uid_search(&criteria).await?;
        Ok(uids
            .into_iter()
            .map(|uid| MessageHandle::new(uid.to_string()))
            .collect())
    }

    async fn fetch(
        &mut self,
        messages: &mut [MessageHandle],
        profile: &FetchProfile,
        on_message: &mut (dyn for<'m> FnMut(&'m MessageHandle) + Send),
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let client = self.selected("fetch")?;

        let positions: HashMap<u32, usize> = messages
            .iter()
            .enumerate()
            .filter_map(|(index, message)| message.uid.parse().ok().map(|uid| (uid, index)))
            .collect();
        let uids: Vec<u32> = positions.keys().copied().collect();
        if uids.is_empty() {
            return Ok(());
        }

        client
            .uid_fetch_with(&uid_set(&uids), fetch_attributes(profile), |_, items| {
                let uid = items.iter().find_map(|item| match item {
                    mailsync_imap::FetchItem::Uid(uid) => Some(*uid),
                    _ => None,
                });
                let Some(message) = uid
                    .and_then(|uid| positions.get(&uid))
                    .and_then(|&index| messages.get_mut(index))
                else {
                    debug!(?uid, "Ignoring FETCH data for an unrequested message");
                    return;
                };
                apply_items(message, items);
                on_message(message);
            })
            .await?;
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        let mode = self.state.require_open("expunge", &self.name)?;

        if mode == OpenMode::ReadOnly {
            let path = self.path.clone().unwrap_or_else(|| self.name.clone());
            let client = self
                .client
                .take()
                .ok_or_else(|| Error::IllegalState(format!("folder {} has no connection", self.name)))?;
            self.state = FolderState::Opening;
            let reopened = match client.close().await {
                Ok(authenticated) => authenticated.select(&path).await,
                Err(e) => Err(e),
            };
            match reopened {
                Ok(client) => {
                    self.client = Some(client);
                    self.state = FolderState::Open(OpenMode::ReadWrite);
                }
                Err(e) => {
                    self.state = FolderState::Closed;
                    return Err(open_error(e, &path));
                }
            }
        }

        let expunged = self.selected("expunge")?.expunge().await?;
        debug!(folder = %self.name, count = expunged.len(), "Expunged messages");
        Ok(())
    }
}

/// Maps a folder name to its server path.
///
/// INBOX is never prefixed, nor is a name that already carries the prefix.
#[must_use]
pub fn resolve_path(name: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix)
            if !prefix.is_empty()
                && !name.eq_ignore_ascii_case("INBOX")
                && !name.starts_with(prefix) =>
        {
            format!("{prefix}{name}")
        }
        _ => name.to_string(),
    }
}

fn open_error(err: mailsync_imap::Error, path: &str) -> Error {
    match err {
        mailsync_imap::Error::No(text) => Error::NotFound(format!("{path}: {text}")),
        other => other.into(),
    }
}

fn fetch_attributes(profile: &FetchProfile) -> Vec<FetchAttribute> {
    let mut attributes = vec![FetchAttribute::Uid];
    for item in profile.items() {
        match item {
            FetchItem::Flags => attributes.push(FetchAttribute::Flags),
            FetchItem::Envelope => attributes.extend([
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Envelope,
            ]),
            FetchItem::Structure => attributes.push(FetchAttribute::BodyStructure),
            FetchItem::Body => attributes.push(FetchAttribute::BodyPeek {
                section: None,
                partial: None,
            }),
            FetchItem::BodySane => attributes.push(FetchAttribute::BodyPeek {
                section: None,
                partial: profile
                    .max_body_size()
                    .filter(|&max| max > 0)
                    .map(|max| (0, u32::try_from(max).unwrap_or(u32::MAX))),
            }),
        }
    }
    attributes
}

fn apply_items(message: &mut MessageHandle, items: Vec<mailsync_imap::FetchItem>) {
    use mailsync_imap::FetchItem as Item;

    for item in items {
        match item {
            Item::Uid(_) => {}
            Item::Flags(flags) => {
                message.flags = flags.iter().filter_map(convert_flag).collect();
            }
            Item::Rfc822Size(size) => message.size = size,
            Item::InternalDate(text) => message.internal_date = parse_internal_date(&text),
            Item::Envelope(envelope) => message.envelope = Some(convert_envelope(*envelope)),
            Item::BodyStructure(value) => message.structure = Some(render_value(&value)),
            Item::Body { data, .. } => message.body = data,
        }
    }
}

fn convert_flag(flag: &mailsync_imap::Flag) -> Option<Flag> {
    use mailsync_imap::Flag as Wire;

    match flag {
        Wire::Seen => Some(Flag::Seen),
        Wire::Answered => Some(Flag::Answered),
        Wire::Flagged => Some(Flag::Flagged),
        Wire::Deleted => Some(Flag::Deleted),
        Wire::Draft => Some(Flag::Draft),
        Wire::Keyword(keyword) => Some(Flag::Keyword(keyword.clone())),
        Wire::Recent | Wire::MayCreate => None,
    }
}

fn convert_envelope(envelope: mailsync_imap::Envelope) -> Envelope {
    Envelope {
        date: envelope.date.as_deref().and_then(parse_header_date),
        subject: envelope.subject.as_deref().map(decode_encoded_words),
        from: envelope
            .from
            .iter()
            .filter_map(mailsync_imap::Address::email)
            .collect(),
        message_id: envelope.message_id,
    }
}

/// Parses an INTERNALDATE such as `17-Jul-1996 02:44:25 -0700`.
fn parse_internal_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text.trim(), "%d-%b-%Y %H:%M:%S %z")
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

/// Parses an RFC 5322 `Date:` header value.
pub(crate) fn parse_header_date(text: &str) -> Option<DateTime<Utc>> {
    mailparse::dateparse(text)
        .ok()
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
}

/// Decodes RFC 2047 encoded words. ENVELOPE strings arrive undecoded.
fn decode_encoded_words(text: &str) -> String {
    let header = format!("Subject: {text}");
    match mailparse::parse_header(header.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => text.to_string(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Nil => "NIL".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Atom(atom) => atom.clone(),
        Value::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(render_value).collect();
            format!("({})", inner.join(" "))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::remote::scripted;
    use crate::settings::{ConnectionSecurity, Scheme};

    fn store() -> ImapStore {
        let settings = ServerSettings::new(
            Scheme::Imap,
            "imap.example.com",
            0,
            ConnectionSecurity::SslTlsRequired,
            AuthType::Plain,
            "user",
        )
        .with_password("secret");
        ImapStore::new(settings, TransportConfig::default())
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("INBOX", Some("INBOX.")), "INBOX");
        assert_eq!(resolve_path("inbox", Some("INBOX.")), "inbox");
        assert_eq!(resolve_path("Sent", Some("INBOX.")), "INBOX.Sent");
        assert_eq!(resolve_path("INBOX.Sent", Some("INBOX.")), "INBOX.Sent");
        assert_eq!(resolve_path("Sent", Some("")), "Sent");
        assert_eq!(resolve_path("Sent", None), "Sent");
    }

    #[test]
    fn test_fetch_attributes() {
        let profile = FetchProfile::from([FetchItem::Flags, FetchItem::Envelope]);
        assert_eq!(
            fetch_attributes(&profile),
            vec![
                FetchAttribute::Uid,
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Envelope,
            ]
        );

        let profile = FetchProfile::from([FetchItem::BodySane]).with_max_body_size(32_768);
        assert_eq!(
            fetch_attributes(&profile),
            vec![
                FetchAttribute::Uid,
                FetchAttribute::BodyPeek {
                    section: None,
                    partial: Some((0, 32_768)),
                },
            ]
        );
    }

    #[test]
    fn test_apply_items() {
        use mailsync_imap::FetchItem as Item;

        let mut message = MessageHandle::new("7");
        apply_items(
            &mut message,
            vec![
                Item::Uid(7),
                Item::Flags(vec![mailsync_imap::Flag::Seen, mailsync_imap::Flag::Recent]),
                Item::Rfc822Size(1234),
                Item::InternalDate("17-Jul-1996 02:44:25 -0700".to_string()),
                Item::Body {
                    section: None,
                    origin: None,
                    data: Some(b"Subject: hi\r\n\r\nbody".to_vec()),
                },
            ],
        );

        assert_eq!(message.flags.len(), 1);
        assert!(message.flags.contains(&Flag::Seen));
        assert_eq!(message.size, 1234);
        assert_eq!(
            message.internal_date,
            Some(Utc.with_ymd_and_hms(1996, 7, 17, 9, 44, 25).unwrap())
        );
        assert_eq!(message.body.as_deref(), Some(&b"Subject: hi\r\n\r\nbody"[..]));
    }

    #[test]
    fn test_convert_envelope_decodes_subject() {
        let envelope = convert_envelope(mailsync_imap::Envelope {
            date: Some("Mon, 7 Feb 1994 21:52:25 -0800".to_string()),
            subject: Some("=?UTF-8?B?R3LDvMOfZQ==?=".to_string()),
            from: vec![mailsync_imap::Address {
                name: Some("=?ISO-8859-1?Q?J=F6rg?=".to_string()),
                mailbox: Some("j".to_string()),
                host: Some("example.com".to_string()),
            }],
            message_id: Some("<1@example.com>".to_string()),
            ..mailsync_imap::Envelope::default()
        });
        assert_eq!(envelope.subject.as_deref(), Some("Grüße"));
        assert_eq!(envelope.from, vec!["j@example.com".to_string()]);
        assert_eq!(
            envelope.date,
            Some(Utc.with_ymd_and_hms(1994, 2, 8, 5, 52, 25).unwrap())
        );

        let plain = convert_envelope(mailsync_imap::Envelope {
            subject: Some("plain subject".to_string()),
            ..mailsync_imap::Envelope::default()
        });
        assert_eq!(plain.subject.as_deref(), Some("plain subject"));
        assert_eq!(plain.date, None);
    }

    #[test]
    fn test_internal_date_with_padded_day() {
        assert_eq!(
            parse_internal_date(" 1-Feb-2024 10:00:00 +0000"),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(parse_internal_date("garbage"), None);
    }

    #[test]
    fn test_render_value() {
        let value = Value::List(vec![
            Value::String(b"TEXT".to_vec()),
            Value::String(b"PLAIN".to_vec()),
            Value::Nil,
            Value::Number(42),
        ]);
        assert_eq!(render_value(&value), "(\"TEXT\" \"PLAIN\" NIL 42)");
    }

    #[tokio::test]
    async fn test_closed_folder_rejects_operations() {
        let mut folder = store().folder("INBOX");
        assert_eq!(folder.state(), FolderState::Closed);
        assert!(matches!(folder.message_count(), Err(Error::IllegalState(_))));
        assert!(matches!(
            folder.messages(1, 10, None).await,
            Err(Error::IllegalState(_))
        ));
        assert!(matches!(folder.expunge().await, Err(Error::IllegalState(_))));

        let mut messages = vec![MessageHandle::new("1")];
        let profile = FetchProfile::from([FetchItem::Flags]);
        let result = folder
            .fetch(&mut messages, &profile, &mut |_: &MessageHandle| {})
            .await;
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    fn local_store(port: u16) -> ImapStore {
        let settings = ServerSettings::new(
            Scheme::Imap,
            "127.0.0.1",
            port,
            ConnectionSecurity::None,
            AuthType::Plain,
            "user",
        )
        .with_password("secret");
        ImapStore::new(settings, TransportConfig::default())
    }

    #[tokio::test]
    async fn test_open_search_fetch_and_expunge_read_only() {
        let (port, server) = scripted::serve(
            "* OK [CAPABILITY IMAP4rev1] ready\r\n",
            vec![
                ("A0001 LOGIN user secret", "A0001 OK [CAPABILITY IMAP4rev1] done\r\n"),
                (
                    "A0002 EXAMINE INBOX",
                    "* 3 EXISTS\r\n* OK [UIDVALIDITY 42] ok\r\nA0002 OK [READ-ONLY] done\r\n",
                ),
                (
                    "A0003 UID SEARCH 1:3 NOT DELETED SINCE 01-Feb-2024",
                    "* SEARCH 1 2 3\r\nA0003 OK done\r\n",
                ),
                (
                    "A0004 UID FETCH 2:3 (UID FLAGS BODY.PEEK[])",
                    "* 2 FETCH (UID 2 FLAGS (\\Seen) BODY[] {5}\r\nhello)\r\n\
* 1 FETCH (UID 9 FLAGS (\\Seen))\r\n\
* 3 FETCH (UID 3 FLAGS (\\Answered \\Flagged) BODY[] NIL)\r\n\
A0004 OK done\r\n",
                ),
                ("A0005 CLOSE", "A0005 OK done\r\n"),
                ("A0006 SELECT INBOX", "* 3 EXISTS\r\nA0006 OK [READ-WRITE] done\r\n"),
                ("A0007 EXPUNGE", "* 2 EXPUNGE\r\nA0007 OK done\r\n"),
                ("A0008 CLOSE", "A0008 OK done\r\n"),
                ("A0009 LOGOUT", "* BYE bye\r\nA0009 OK done\r\n"),
            ],
        )
        .await;

        let mut folder = local_store(port).folder("INBOX");
        folder.open(OpenMode::ReadOnly).await.unwrap();
        assert_eq!(folder.state(), FolderState::Open(OpenMode::ReadOnly));
        assert_eq!(folder.message_count().unwrap(), 3);
        assert_eq!(folder.uid_validity(), Some(42));

        let since = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let handles = folder.messages(1, 3, Some(since)).await.unwrap();
        let uids: Vec<&str> = handles.iter().map(|m| m.uid.as_str()).collect();
        assert_eq!(uids, ["1", "2", "3"]);

        let mut messages = vec![MessageHandle::new("3"), MessageHandle::new("2")];
        let profile = FetchProfile::from([FetchItem::Flags, FetchItem::Body]);
        let mut delivered = Vec::new();
        folder
            .fetch(&mut messages, &profile, &mut |message: &MessageHandle| {
                delivered.push(message.uid.clone());
            })
            .await
            .unwrap();
        assert_eq!(delivered, ["2", "3"]);
        assert!(messages[0].flags.contains(&Flag::Answered));
        assert!(messages[0].flags.contains(&Flag::Flagged));
        assert_eq!(messages[0].body, None);
        assert!(messages[1].flags.contains(&Flag::Seen));
        assert_eq!(messages[1].body.as_deref(), Some(&b"hello"[..]));

        folder.expunge().await.unwrap();
        assert_eq!(folder.state(), FolderState::Open(OpenMode::ReadWrite));

        folder.close().await;
        assert_eq!(folder.state(), FolderState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_folder_is_not_found() {
        let (port, server) = scripted::serve(
            "* OK [CAPABILITY IMAP4rev1] ready\r\n",
            vec![
                ("A0001 LOGIN user secret", "A0001 OK [CAPABILITY IMAP4rev1] done\r\n"),
                ("A0002 SELECT Archive", "A0002 NO [NONEXISTENT] no such mailbox\r\n"),
            ],
        )
        .await;

        let mut folder = local_store(port).folder("Archive");
        let result = folder.open(OpenMode::ReadWrite).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(folder.state(), FolderState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut folder = store().folder("INBOX");
        folder.close().await;
        folder.close().await;
        assert_eq!(folder.state(), FolderState::Closed);
        assert_eq!(folder.uid_validity(), None);
    }
}
