//! One sync pass for one folder.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::config::{ExpungePolicy, SyncConfig};
use super::event::{CancellationFlag, SyncEvent, SyncSink};
use crate::backend::{BackendFolder, BackendStorage};
use crate::error::{Error, Result};
use crate::remote::{
    FetchItem, FetchProfile, Flag, MessageHandle, OpenMode, RemoteFolder, RemoteStore,
};

/// Folder extra holding the UID validity seen on the last pass.
pub const UID_VALIDITY_KEY: &str = "imapUidValidity";

/// Outcome of a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Remote message count.
    pub total: i64,
    /// Messages stored for the first time.
    pub new: usize,
}

/// Brings a local folder up to date with its remote counterpart.
///
/// Each pass emits `Started` followed by exactly one of `Finished` or
/// `Failed`.
#[derive(Debug, Clone)]
pub struct Synchronizer<B> {
    backend: B,
}

impl<B: BackendStorage> Synchronizer<B> {
    /// Creates a synchronizer writing to `backend`.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens `folder_name` on `store` read-only, syncs it and closes it.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the pass, after `Failed` was emitted.
    pub async fn sync<S: RemoteStore>(
        &self,
        store: &S,
        folder_name: &str,
        config: &SyncConfig,
        sink: &dyn SyncSink,
        cancel: &CancellationFlag,
    ) -> Result<SyncSummary> {
        let mut folder = store.folder(folder_name);
        self.sync_with_open_folder(&mut folder, config, sink, cancel)
            .await
    }

    /// Syncs a folder held by the caller.
    ///
    /// A closed folder is opened read-only and closed again afterwards. A
    /// folder that is already open is used as is and left open.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the pass, after `Failed` was emitted.
    pub async fn sync_with_open_folder<F: RemoteFolder>(
        &self,
        folder: &mut F,
        config: &SyncConfig,
        sink: &dyn SyncSink,
        cancel: &CancellationFlag,
    ) -> Result<SyncSummary> {
        let name = folder.name().to_string();
        info!(folder = %name, "Sync started");
        sink.emit(SyncEvent::Started {
            folder: name.clone(),
        });

        let opened_here = !folder.is_open();
        let result = async {
            if opened_here {
                folder.open(OpenMode::ReadOnly).await?;
            }
            self.run(folder, config, sink, cancel).await
        }
        .await;

        if opened_here {
            folder.close().await;
        }

        match result {
            Ok(summary) => {
                info!(folder = %name, total = summary.total, new = summary.new, "Sync finished");
                sink.emit(SyncEvent::Finished {
                    folder: name,
                    total: summary.total,
                    new: summary.new,
                });
                Ok(summary)
            }
            Err(e) => {
                let message = e.failure_message();
                warn!(folder = %name, error = %message, "Sync failed");
                sink.emit(SyncEvent::Failed {
                    folder: name,
                    message,
                });
                Err(e)
            }
        }
    }

    async fn run<F: RemoteFolder>(
        &self,
        remote: &mut F,
        config: &SyncConfig,
        sink: &dyn SyncSink,
        cancel: &CancellationFlag,
    ) -> Result<SyncSummary> {
        let name = remote.name().to_string();
        let local = self.backend.folder(&name).await?;
        cancel.check()?;

        let count = remote.message_count()?;
        if count < 0 {
            return Err(Error::Protocol(format!(
                "Message count {count} for folder {name}"
            )));
        }

        reconcile_uid_validity(remote, &local, sink).await?;
        cancel.check()?;

        let earliest = config.earliest_poll_date;
        let visible_limit = local
            .visible_limit()
            .unwrap_or(config.default_visible_limit);
        let local_dates = local.all_messages_and_effective_dates().await?;

        let remote_messages = list_remote(remote, count, visible_limit, earliest, sink)
            .await?
            .into_iter()
            .filter(|message| {
                let date = local_dates.get(&message.uid).copied().flatten();
                !date.is_some_and(|date| earliest.is_some_and(|earliest| date < earliest))
            })
            .collect::<Vec<_>>();
        cancel.check()?;

        if config.sync_remote_deletions {
            remove_deleted(&local, &local_dates, &remote_messages, earliest, sink).await?;
        }
        cancel.check()?;

        let mut unsynced: Vec<MessageHandle> = remote_messages
            .iter()
            .filter(|message| !local_dates.contains_key(&message.uid))
            .cloned()
            .collect();
        unsynced.sort_by(|a, b| uid_order(&b.uid, &a.uid));
        if visible_limit > 0 && visible_limit < unsynced.len() {
            unsynced.truncate(visible_limit);
        }
        info!(folder = %name, count = unsynced.len(), "Unsynced messages");

        let new = if unsynced.is_empty() {
            0
        } else {
            remote
                .fetch(
                    &mut unsynced,
                    &FetchProfile::from([FetchItem::Flags, FetchItem::Envelope]),
                    &mut ignore,
                )
                .await?;
            download(remote, &local, unsynced, config, sink, cancel).await?
        };

        if !config.sync_flags.is_empty() {
            let cached: Vec<MessageHandle> = remote_messages
                .iter()
                .filter(|message| local_dates.contains_key(&message.uid))
                .map(|message| MessageHandle::new(message.uid.clone()))
                .collect();
            refresh_flags(remote, &local, cached, &config.sync_flags, sink, cancel).await?;
        }

        if config.expunge_policy == ExpungePolicy::OnPoll {
            debug!(folder = %name, "Expunging");
            remote.expunge().await?;
        }

        Ok(SyncSummary { total: count, new })
    }
}

async fn reconcile_uid_validity<F: RemoteFolder, L: BackendFolder>(
    remote: &F,
    local: &L,
    sink: &dyn SyncSink,
) -> Result<()> {
    let Some(current) = remote.uid_validity() else {
        return Ok(());
    };
    let current = i64::from(current);

    match local.folder_extra_number(UID_VALIDITY_KEY).await? {
        Some(stored) if stored == current => {}
        Some(stored) => {
            info!(folder = %remote.name(), stored, current, "UID validity changed, purging cache");
            local.clear_all_messages().await?;
            local.set_folder_extra_number(UID_VALIDITY_KEY, current).await?;
            sink.emit(SyncEvent::UidValidityChanged {
                folder: remote.name().to_string(),
                old: stored,
                new: current,
            });
        }
        None => local.set_folder_extra_number(UID_VALIDITY_KEY, current).await?,
    }
    Ok(())
}

/// First sequence number of the window holding the `visible_limit` most
/// recent messages. A limit of 0 means no window.
fn listing_start(count: u32, visible_limit: usize) -> u32 {
    if visible_limit == 0 {
        return 1;
    }
    let limit = u32::try_from(visible_limit).unwrap_or(u32::MAX);
    count.saturating_sub(limit).saturating_add(1)
}

async fn list_remote<F: RemoteFolder>(
    remote: &mut F,
    count: i64,
    visible_limit: usize,
    earliest: Option<DateTime<Utc>>,
    sink: &dyn SyncSink,
) -> Result<Vec<MessageHandle>> {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    if count == 0 {
        return Ok(Vec::new());
    }

    let start = listing_start(count, visible_limit);
    let expected = usize::try_from(count - start + 1).unwrap_or(usize::MAX);
    let folder = remote.name().to_string();
    sink.emit(SyncEvent::HeadersProgress {
        folder: folder.clone(),
        done: 0,
        total: expected,
    });

    let listed = remote.messages(start, count, earliest).await?;
    debug!(%folder, start, end = count, listed = listed.len(), "Listed remote messages");
    sink.emit(SyncEvent::HeadersProgress {
        folder,
        done: listed.len(),
        total: listed.len(),
    });
    Ok(listed)
}

async fn remove_deleted<L: BackendFolder>(
    local: &L,
    local_dates: &HashMap<String, Option<DateTime<Utc>>>,
    remote_messages: &[MessageHandle],
    earliest: Option<DateTime<Utc>>,
    sink: &dyn SyncSink,
) -> Result<()> {
    let remote_uids: HashSet<&str> = remote_messages.iter().map(|m| m.uid.as_str()).collect();

    // Anything newer than the poll horizon may simply be outside the window.
    let destroy: Vec<String> = local_dates
        .iter()
        .filter(|(uid, _)| !remote_uids.contains(uid.as_str()))
        .filter(|(_, date)| match (date, earliest) {
            (Some(date), Some(earliest)) => *date <= earliest,
            (None, _) | (_, None) => true,
        })
        .map(|(uid, _)| uid.clone())
        .collect();

    if destroy.is_empty() {
        return Ok(());
    }
    info!(folder = %local.name(), count = destroy.len(), "Removing messages deleted on the server");
    local.destroy_messages(&destroy).await?;
    for uid in destroy {
        sink.emit(SyncEvent::Removed {
            folder: local.name().to_string(),
            uid,
        });
    }
    Ok(())
}

/// Downloads content for new messages and stores them. Returns the number
/// stored.
async fn download<F: RemoteFolder, L: BackendFolder>(
    remote: &mut F,
    local: &L,
    unsynced: Vec<MessageHandle>,
    config: &SyncConfig,
    sink: &dyn SyncSink,
    cancel: &CancellationFlag,
) -> Result<usize> {
    let (mut small, mut large): (Vec<_>, Vec<_>) = unsynced
        .into_iter()
        .partition(|message| config.downloads_fully(message.size));
    debug!(small = small.len(), large = large.len(), "Downloading message content");

    remote
        .fetch(&mut small, &FetchProfile::from([FetchItem::Body]), &mut ignore)
        .await?;
    let mut stored = store_new(local, &small, sink, cancel).await?;

    if !large.is_empty() {
        remote
            .fetch(&mut large, &FetchProfile::from([FetchItem::Structure]), &mut ignore)
            .await?;
        cancel.check()?;

        let max = u64::try_from(config.maximum_auto_download_message_size).unwrap_or(0);
        let profile = FetchProfile::from([FetchItem::BodySane]).with_max_body_size(max);
        remote.fetch(&mut large, &profile, &mut ignore).await?;
        stored += store_new(local, &large, sink, cancel).await?;
    }
    Ok(stored)
}

async fn store_new<L: BackendFolder>(
    local: &L,
    messages: &[MessageHandle],
    sink: &dyn SyncSink,
    cancel: &CancellationFlag,
) -> Result<usize> {
    for message in messages {
        cancel.check()?;
        local.save_message(message).await?;
        sink.emit(SyncEvent::NewMessage {
            folder: local.name().to_string(),
            uid: message.uid.clone(),
        });
    }
    Ok(messages.len())
}

async fn refresh_flags<F: RemoteFolder, L: BackendFolder>(
    remote: &mut F,
    local: &L,
    mut cached: Vec<MessageHandle>,
    sync_flags: &BTreeSet<Flag>,
    sink: &dyn SyncSink,
    cancel: &CancellationFlag,
) -> Result<()> {
    if cached.is_empty() {
        return Ok(());
    }

    let mut answered: HashSet<String> = HashSet::new();
    remote
        .fetch(
            &mut cached,
            &FetchProfile::from([FetchItem::Flags]),
            &mut |message: &MessageHandle| {
                answered.insert(message.uid.clone());
            },
        )
        .await?;

    for message in cached.iter().filter(|m| answered.contains(&m.uid)) {
        cancel.check()?;
        let Some(stored) = local.message_flags(&message.uid).await? else {
            continue;
        };
        let before: BTreeSet<&Flag> = stored.intersection(sync_flags).collect();
        let after: BTreeSet<&Flag> = message.flags.intersection(sync_flags).collect();
        if before == after {
            continue;
        }

        let mut updated: BTreeSet<Flag> = stored.difference(sync_flags).cloned().collect();
        updated.extend(after.into_iter().cloned());
        local.update_flags(&message.uid, &updated).await?;
        sink.emit(SyncEvent::FlagsChanged {
            folder: local.name().to_string(),
            uid: message.uid.clone(),
        });
    }
    Ok(())
}

fn ignore(_: &MessageHandle) {}

/// Orders uids numerically when both are numbers.
fn uid_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}
