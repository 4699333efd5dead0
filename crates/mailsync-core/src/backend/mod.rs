//! Local message storage.
//!
//! The synchronizer only talks to [`BackendStorage`] and [`BackendFolder`].
//! [`MemoryBackend`] keeps everything in process; [`SqliteBackend`] is the
//! on-disk cache used by the binary.

mod memory;
mod sqlite;

pub use memory::{MemoryBackend, MemoryFolder};
pub use sqlite::{SqliteBackend, SqliteFolder};

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::remote::{Flag, MessageHandle};

/// Folder extra holding the number of messages to keep in sync.
pub const VISIBLE_LIMIT_KEY: &str = "visibleLimit";

/// Storage for all folders of one account.
#[async_trait]
pub trait BackendStorage: Send + Sync {
    /// Folder type of this storage.
    type Folder: BackendFolder;

    /// Returns the folder, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    async fn folder(&self, name: &str) -> Result<Self::Folder>;
}

/// Cached contents of one folder.
#[async_trait]
pub trait BackendFolder: Send + Sync {
    /// Folder name.
    fn name(&self) -> &str;

    /// Number of most recent messages to keep, read from
    /// [`VISIBLE_LIMIT_KEY`] when the folder was obtained.
    fn visible_limit(&self) -> Option<usize>;

    /// Reads a numeric folder setting.
    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>>;

    /// Writes a numeric folder setting.
    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()>;

    /// Removes every cached message, keeping folder settings.
    async fn clear_all_messages(&self) -> Result<()>;

    /// Returns every cached uid with the earlier of its arrival and sent
    /// dates.
    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>>;

    /// Removes the given messages. Unknown uids are ignored.
    async fn destroy_messages(&self, uids: &[String]) -> Result<()>;

    /// Inserts or replaces a message.
    async fn save_message(&self, message: &MessageHandle) -> Result<()>;

    /// Returns the stored flags, or `None` if the message is not cached.
    async fn message_flags(&self, uid: &str) -> Result<Option<BTreeSet<Flag>>>;

    /// Replaces the stored flags of a cached message.
    async fn update_flags(&self, uid: &str, flags: &BTreeSet<Flag>) -> Result<()>;
}

fn visible_limit_from(value: Option<i64>) -> Option<usize> {
    value.and_then(|v| usize::try_from(v).ok())
}
