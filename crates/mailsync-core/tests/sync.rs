//! Integration tests for the synchronizer.
//!
//! `FakeFolder` serves a scripted remote folder and records every fetch
//! profile; `CountingBackend` wraps `MemoryBackend` to count purges.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use mailsync_core::backend::{BackendFolder, BackendStorage, MemoryBackend, MemoryFolder};
use mailsync_core::sync::UID_VALIDITY_KEY;
use mailsync_core::{
    CancellationFlag, Error, ExpungePolicy, FetchItem, FetchProfile, Flag, FolderState,
    MessageHandle, OpenMode, RemoteFolder, Result, SyncConfig, SyncEvent, Synchronizer,
};

const FOLDER: &str = "INBOX";

#[derive(Default)]
struct FakeFolder {
    name: String,
    state: FolderState,
    count: i64,
    uid_validity: Option<u32>,
    remote: Vec<MessageHandle>,
    open_error: Option<fn() -> Error>,
    fetches: Vec<Vec<FetchItem>>,
    ranges: Vec<(u32, u32)>,
    expunges: usize,
    closes: usize,
}

impl FakeFolder {
    fn new(count: i64) -> Self {
        Self {
            name: FOLDER.to_string(),
            count,
            ..Self::default()
        }
    }

    /// A folder whose messages have uids 1..=n and the given sizes.
    fn with_messages(sizes: &[u64]) -> Self {
        let mut folder = Self::new(i64::try_from(sizes.len()).unwrap());
        folder.remote = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let mut message = MessageHandle::new((i + 1).to_string()).with_size(size);
                message.flags.insert(Flag::Seen);
                message
            })
            .collect();
        folder
    }

    fn remote_message(&self, uid: &str) -> Option<&MessageHandle> {
        self.remote.iter().find(|m| m.uid == uid)
    }
}

#[async_trait]
impl RemoteFolder for FakeFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> FolderState {
        self.state
    }

    async fn open(&mut self, mode: OpenMode) -> Result<()> {
        if let Some(error) = self.open_error {
            return Err(error());
        }
        self.state = FolderState::Open(mode);
        Ok(())
    }

    async fn close(&mut self) {
        self.closes += 1;
        self.state = FolderState::Closed;
    }

    fn message_count(&self) -> Result<i64> {
        self.state.require_open("message_count", &self.name)?;
        Ok(self.count)
    }

    fn uid_validity(&self) -> Option<u32> {
        self.uid_validity
    }

    async fn messages(
        &mut self,
        start: u32,
        end: u32,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>> {
        self.state.require_open("messages", &self.name)?;
        self.ranges.push((start, end));
        let start = usize::try_from(start).unwrap() - 1;
        let end = usize::try_from(end).unwrap().min(self.remote.len());
        Ok(self.remote[start..end]
            .iter()
            .map(|m| MessageHandle::new(m.uid.clone()))
            .collect())
    }

    async fn fetch(
        &mut self,
        messages: &mut [MessageHandle],
        profile: &FetchProfile,
        on_message: &mut (dyn for<'m> FnMut(&'m MessageHandle) + Send),
    ) -> Result<()> {
        self.state.require_open("fetch", &self.name)?;
        self.fetches.push(profile.items().to_vec());

        for message in messages.iter_mut() {
            let Some(remote) = self.remote_message(&message.uid).cloned() else {
                continue;
            };
            for item in profile.items() {
                match item {
                    FetchItem::Flags => message.flags.clone_from(&remote.flags),
                    FetchItem::Envelope => {
                        message.size = remote.size;
                        message.internal_date = remote.internal_date;
                    }
                    FetchItem::Structure => message.structure = Some("(TEXT PLAIN)".into()),
                    FetchItem::Body => message.body = Some(b"full body".to_vec()),
                    FetchItem::BodySane => message.body = Some(b"partial".to_vec()),
                }
            }
            on_message(message);
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        self.state.require_open("expunge", &self.name)?;
        self.expunges += 1;
        Ok(())
    }
}

/// `MemoryBackend` that counts `clear_all_messages` calls.
#[derive(Clone, Default)]
struct CountingBackend {
    inner: MemoryBackend,
    clears: Arc<AtomicUsize>,
}

struct CountingFolder {
    inner: MemoryFolder,
    clears: Arc<AtomicUsize>,
}

#[async_trait]
impl BackendStorage for CountingBackend {
    type Folder = CountingFolder;

    async fn folder(&self, name: &str) -> Result<CountingFolder> {
        Ok(CountingFolder {
            inner: self.inner.folder(name).await?,
            clears: Arc::clone(&self.clears),
        })
    }
}

#[async_trait]
impl BackendFolder for CountingFolder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn visible_limit(&self) -> Option<usize> {
        self.inner.visible_limit()
    }

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>> {
        self.inner.folder_extra_number(key).await
    }

    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()> {
        self.inner.set_folder_extra_number(key, value).await
    }

    async fn clear_all_messages(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_all_messages().await
    }

    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        self.inner.all_messages_and_effective_dates().await
    }

    async fn destroy_messages(&self, uids: &[String]) -> Result<()> {
        self.inner.destroy_messages(uids).await
    }

    async fn save_message(&self, message: &MessageHandle) -> Result<()> {
        self.inner.save_message(message).await
    }

    async fn message_flags(&self, uid: &str) -> Result<Option<BTreeSet<Flag>>> {
        self.inner.message_flags(uid).await
    }

    async fn update_flags(&self, uid: &str, flags: &BTreeSet<Flag>) -> Result<()> {
        self.inner.update_flags(uid, flags).await
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<SyncEvent>>);

impl Events {
    fn sink(&self) -> impl Fn(SyncEvent) + Send + Sync + '_ {
        |event: SyncEvent| self.0.lock().unwrap().push(event)
    }

    fn all(&self) -> Vec<SyncEvent> {
        self.0.lock().unwrap().clone()
    }

    fn last(&self) -> SyncEvent {
        self.0.lock().unwrap().last().cloned().unwrap()
    }
}

async fn run(
    backend: &CountingBackend,
    folder: &mut FakeFolder,
    config: &SyncConfig,
) -> (Result<mailsync_core::SyncSummary>, Events) {
    let events = Events::default();
    let sync = Synchronizer::new(backend.clone());
    let result = sync
        .sync_with_open_folder(folder, config, &events.sink(), &CancellationFlag::new())
        .await;
    (result, events)
}

fn date(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
}

async fn seed(backend: &CountingBackend, uid: &str, date: Option<DateTime<Utc>>) {
    let mut message = MessageHandle::new(uid);
    message.internal_date = date;
    backend
        .folder(FOLDER)
        .await
        .unwrap()
        .save_message(&message)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_negative_count_fails_without_fetching() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::new(-1);

    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert!(matches!(result, Err(Error::Protocol(_))));
    match events.last() {
        SyncEvent::Failed { folder: name, message } => {
            assert_eq!(name, FOLDER);
            assert!(message.contains("Message count -1 for folder INBOX"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(folder.fetches.is_empty());
    assert!(folder.ranges.is_empty());
    assert_eq!(folder.closes, 1);
    assert_eq!(folder.state, FolderState::Closed);
}

#[tokio::test]
async fn test_empty_folder_finishes() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::new(0);

    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert_eq!(result.unwrap().total, 0);
    assert_eq!(
        events.all(),
        vec![
            SyncEvent::Started {
                folder: FOLDER.into()
            },
            SyncEvent::Finished {
                folder: FOLDER.into(),
                total: 0,
                new: 0
            },
        ]
    );
    assert!(folder.fetches.is_empty());
}

#[tokio::test]
async fn test_uid_validity_change_purges_once() {
    let backend = CountingBackend::default();
    let local = backend.folder(FOLDER).await.unwrap();
    local.set_folder_extra_number(UID_VALIDITY_KEY, 23).await.unwrap();
    seed(&backend, "7", None).await;

    let mut folder = FakeFolder::new(0);
    folder.uid_validity = Some(42);
    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert!(result.is_ok());
    assert_eq!(backend.clears.load(Ordering::SeqCst), 1);
    assert_eq!(
        local.folder_extra_number(UID_VALIDITY_KEY).await.unwrap(),
        Some(42)
    );
    assert!(backend.inner.uids(FOLDER).await.is_empty());
    assert!(events.all().contains(&SyncEvent::UidValidityChanged {
        folder: FOLDER.into(),
        old: 23,
        new: 42
    }));
}

#[tokio::test]
async fn test_first_uid_validity_is_stored_without_purge() {
    let backend = CountingBackend::default();
    seed(&backend, "7", None).await;

    let mut folder = FakeFolder::new(0);
    folder.uid_validity = Some(42);
    let config = SyncConfig::default().with_sync_remote_deletions(false);
    run(&backend, &mut folder, &config).await.0.unwrap();

    assert_eq!(backend.clears.load(Ordering::SeqCst), 0);
    let local = backend.folder(FOLDER).await.unwrap();
    assert_eq!(
        local.folder_extra_number(UID_VALIDITY_KEY).await.unwrap(),
        Some(42)
    );
    assert_eq!(backend.inner.uids(FOLDER).await, vec!["7".to_string()]);
}

#[tokio::test]
async fn test_unchanged_uid_validity_keeps_cache() {
    let backend = CountingBackend::default();
    let local = backend.folder(FOLDER).await.unwrap();
    local.set_folder_extra_number(UID_VALIDITY_KEY, 42).await.unwrap();

    let mut folder = FakeFolder::new(0);
    folder.uid_validity = Some(42);
    run(&backend, &mut folder, &SyncConfig::default()).await.0.unwrap();

    assert_eq!(backend.clears.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_small_message_takes_two_fetches() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[1000]);

    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert_eq!(result.unwrap().new, 1);
    assert_eq!(
        folder.fetches,
        vec![
            vec![FetchItem::Flags, FetchItem::Envelope],
            vec![FetchItem::Body],
        ]
    );
    let stored = backend.inner.message(FOLDER, "1").await.unwrap();
    assert_eq!(stored.body.as_deref(), Some(&b"full body"[..]));
    assert!(stored.flags.contains(&Flag::Seen));
    assert!(events.all().contains(&SyncEvent::NewMessage {
        folder: FOLDER.into(),
        uid: "1".into()
    }));
}

#[tokio::test]
async fn test_large_message_takes_four_fetches() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[100_000]);

    let (result, _) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert_eq!(result.unwrap().new, 1);
    assert_eq!(
        folder.fetches,
        vec![
            vec![FetchItem::Flags, FetchItem::Envelope],
            vec![FetchItem::Body],
            vec![FetchItem::Structure],
            vec![FetchItem::BodySane],
        ]
    );
    let stored = backend.inner.message(FOLDER, "1").await.unwrap();
    assert_eq!(stored.body.as_deref(), Some(&b"partial"[..]));
    assert!(stored.structure.is_some());
}

#[tokio::test]
async fn test_unlimited_size_downloads_everything() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[100_000]);
    let config = SyncConfig::default().with_maximum_auto_download_message_size(0);

    run(&backend, &mut folder, &config).await.0.unwrap();

    assert_eq!(folder.fetches.len(), 2);
}

#[tokio::test]
async fn test_remote_deletion_respects_earliest_poll_date() {
    let backend = CountingBackend::default();
    seed(&backend, "old", Some(date(1))).await;
    seed(&backend, "edge", Some(date(10))).await;
    seed(&backend, "new", Some(date(20))).await;
    seed(&backend, "undated", None).await;

    let mut folder = FakeFolder::new(0);
    let config = SyncConfig::default().with_earliest_poll_date(Some(date(10)));
    let (result, events) = run(&backend, &mut folder, &config).await;

    result.unwrap();
    assert_eq!(backend.inner.uids(FOLDER).await, vec!["new".to_string()]);
    let removed: BTreeSet<String> = events
        .all()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::Removed { uid, .. } => Some(uid),
            _ => None,
        })
        .collect();
    assert_eq!(
        removed,
        ["old", "edge", "undated"].map(String::from).into_iter().collect()
    );
}

#[tokio::test]
async fn test_remote_deletion_without_earliest_removes_all_missing() {
    let backend = CountingBackend::default();
    seed(&backend, "3", Some(date(20))).await;
    seed(&backend, "1", Some(date(1))).await;

    let mut folder = FakeFolder::with_messages(&[10]);
    run(&backend, &mut folder, &SyncConfig::default()).await.0.unwrap();

    assert_eq!(backend.inner.uids(FOLDER).await, vec!["1".to_string()]);
}

#[tokio::test]
async fn test_remote_deletion_disabled() {
    let backend = CountingBackend::default();
    seed(&backend, "old", Some(date(1))).await;

    let mut folder = FakeFolder::new(0);
    let config = SyncConfig::default().with_sync_remote_deletions(false);
    run(&backend, &mut folder, &config).await.0.unwrap();

    assert_eq!(backend.inner.uids(FOLDER).await, vec!["old".to_string()]);
}

#[tokio::test]
async fn test_expunge_gating() {
    let backend = CountingBackend::default();

    let mut folder = FakeFolder::new(0);
    let config = SyncConfig::default().with_expunge_policy(ExpungePolicy::OnPoll);
    run(&backend, &mut folder, &config).await.0.unwrap();
    assert_eq!(folder.expunges, 1);

    let mut folder = FakeFolder::new(0);
    let config = SyncConfig::default().with_expunge_policy(ExpungePolicy::Manually);
    run(&backend, &mut folder, &config).await.0.unwrap();
    assert_eq!(folder.expunges, 0);
}

#[tokio::test]
async fn test_flag_refresh_updates_cached_messages() {
    let backend = CountingBackend::default();
    seed(&backend, "1", None).await;
    let local = backend.folder(FOLDER).await.unwrap();
    let keyword: BTreeSet<Flag> = [Flag::Keyword("$Label".into())].into_iter().collect();
    local.update_flags("1", &keyword).await.unwrap();

    let mut folder = FakeFolder::with_messages(&[10]);
    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert_eq!(result.unwrap().new, 0);
    assert_eq!(folder.fetches, vec![vec![FetchItem::Flags]]);
    assert_eq!(
        local.message_flags("1").await.unwrap().unwrap(),
        [Flag::Seen, Flag::Keyword("$Label".into())]
            .into_iter()
            .collect()
    );
    assert!(events.all().contains(&SyncEvent::FlagsChanged {
        folder: FOLDER.into(),
        uid: "1".into()
    }));
}

#[tokio::test]
async fn test_flag_refresh_disabled() {
    let backend = CountingBackend::default();
    seed(&backend, "1", None).await;

    let mut folder = FakeFolder::with_messages(&[10]);
    let config = SyncConfig::default().with_sync_flags([]);
    run(&backend, &mut folder, &config).await.0.unwrap();

    assert!(folder.fetches.is_empty());
}

#[tokio::test]
async fn test_visible_limit_bounds_listing() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[10; 100]);
    let config = SyncConfig::default().with_default_visible_limit(10);

    let (result, _) = run(&backend, &mut folder, &config).await;

    assert_eq!(result.unwrap().new, 10);
    assert_eq!(folder.ranges, vec![(91, 100)]);
    assert_eq!(backend.inner.uids(FOLDER).await.len(), 10);
}

#[tokio::test]
async fn test_folder_visible_limit_wins() {
    let backend = CountingBackend::default();
    backend
        .folder(FOLDER)
        .await
        .unwrap()
        .set_folder_extra_number("visibleLimit", 5)
        .await
        .unwrap();
    let mut folder = FakeFolder::with_messages(&[10; 20]);

    run(&backend, &mut folder, &SyncConfig::default()).await.0.unwrap();

    assert_eq!(folder.ranges, vec![(16, 20)]);
}

#[tokio::test]
async fn test_open_failure_reports_kind() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::new(0);
    folder.open_error = Some(|| Error::NotFound("Archive".into()));

    let (result, events) = run(&backend, &mut folder, &SyncConfig::default()).await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(
        events.last(),
        SyncEvent::Failed {
            folder: FOLDER.into(),
            message: "NotFound: Archive".into()
        }
    );
    assert_eq!(folder.closes, 1);
}

#[tokio::test]
async fn test_open_folder_is_left_open() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::new(0);
    folder.state = FolderState::Open(OpenMode::ReadWrite);

    run(&backend, &mut folder, &SyncConfig::default()).await.0.unwrap();

    assert_eq!(folder.closes, 0);
    assert_eq!(folder.state, FolderState::Open(OpenMode::ReadWrite));
}

#[tokio::test]
async fn test_cancelled_pass_fails_and_closes() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[10]);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let events = Events::default();
    let result = Synchronizer::new(backend.clone())
        .sync_with_open_folder(&mut folder, &SyncConfig::default(), &events.sink(), &cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(
        events.last(),
        SyncEvent::Failed {
            folder: FOLDER.into(),
            message: "Cancelled: cancelled".into()
        }
    );
    assert!(folder.fetches.is_empty());
    assert_eq!(folder.closes, 1);
}

#[tokio::test]
async fn test_events_arrive_on_channel() {
    let backend = CountingBackend::default();
    let mut folder = FakeFolder::with_messages(&[10, 20]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    Synchronizer::new(backend)
        .sync_with_open_folder(&mut folder, &SyncConfig::default(), &tx, &CancellationFlag::new())
        .await
        .unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(SyncEvent::Started { .. })));
    assert_eq!(
        events.last(),
        Some(&SyncEvent::Finished {
            folder: FOLDER.into(),
            total: 2,
            new: 2
        })
    );
}
