//! In-process storage, used by tests and one-off runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BackendFolder, BackendStorage, VISIBLE_LIMIT_KEY, visible_limit_from};
use crate::error::Result;
use crate::remote::{Flag, MessageHandle};

#[derive(Debug, Default)]
struct FolderData {
    extras: HashMap<String, i64>,
    messages: BTreeMap<String, MessageHandle>,
}

type Folders = Arc<Mutex<HashMap<String, FolderData>>>;

/// Storage kept in memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    folders: Folders,
}

impl MemoryBackend {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached uids of a folder in ascending order.
    pub async fn uids(&self, folder: &str) -> Vec<String> {
        self.folders
            .lock()
            .await
            .get(folder)
            .map(|data| data.messages.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a copy of a cached message.
    pub async fn message(&self, folder: &str, uid: &str) -> Option<MessageHandle> {
        self.folders
            .lock()
            .await
            .get(folder)
            .and_then(|data| data.messages.get(uid).cloned())
    }
}

#[async_trait]
impl BackendStorage for MemoryBackend {
    type Folder = MemoryFolder;

    async fn folder(&self, name: &str) -> Result<MemoryFolder> {
        let mut folders = self.folders.lock().await;
        let data = folders.entry(name.to_string()).or_default();
        let visible_limit = visible_limit_from(data.extras.get(VISIBLE_LIMIT_KEY).copied());
        Ok(MemoryFolder {
            name: name.to_string(),
            folders: Arc::clone(&self.folders),
            visible_limit,
        })
    }
}

/// A folder of [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryFolder {
    name: String,
    folders: Folders,
    visible_limit: Option<usize>,
}

impl MemoryFolder {
    async fn with_data<T>(&self, f: impl FnOnce(&mut FolderData) -> T + Send) -> T {
        let mut folders = self.folders.lock().await;
        f(folders.entry(self.name.clone()).or_default())
    }
}

#[async_trait]
impl BackendFolder for MemoryFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn visible_limit(&self) -> Option<usize> {
        self.visible_limit
    }

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.with_data(|data| data.extras.get(key).copied()).await)
    }

    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()> {
        self.with_data(|data| data.extras.insert(key.to_string(), value))
            .await;
        Ok(())
    }

    async fn clear_all_messages(&self) -> Result<()> {
        self.with_data(|data| data.messages.clear()).await;
        Ok(())
    }

    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        Ok(self
            .with_data(|data| {
                data.messages
                    .values()
                    .map(|message| (message.uid.clone(), message.effective_date()))
                    .collect()
            })
            .await)
    }

    async fn destroy_messages(&self, uids: &[String]) -> Result<()> {
        self.with_data(|data| {
            for uid in uids {
                data.messages.remove(uid);
            }
        })
        .await;
        Ok(())
    }

    async fn save_message(&self, message: &MessageHandle) -> Result<()> {
        let message = message.clone();
        self.with_data(|data| data.messages.insert(message.uid.clone(), message))
            .await;
        Ok(())
    }

    async fn message_flags(&self, uid: &str) -> Result<Option<BTreeSet<Flag>>> {
        Ok(self
            .with_data(|data| data.messages.get(uid).map(|message| message.flags.clone()))
            .await)
    }

    async fn update_flags(&self, uid: &str, flags: &BTreeSet<Flag>) -> Result<()> {
        self.with_data(|data| {
            if let Some(message) = data.messages.get_mut(uid) {
                message.flags.clone_from(flags);
            }
        })
        .await;
        Ok(())
    }
}
