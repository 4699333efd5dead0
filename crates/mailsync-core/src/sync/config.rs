//! Per-folder sync options.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::Flag;

/// When messages marked deleted are removed from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpungePolicy {
    /// Only on explicit request.
    #[default]
    Manually,
    /// At the end of every sync pass.
    OnPoll,
}

/// Options for one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// When to expunge.
    pub expunge_policy: ExpungePolicy,
    /// Messages older than this are neither downloaded nor kept.
    pub earliest_poll_date: Option<DateTime<Utc>>,
    /// Remove cached messages that disappeared from the server.
    pub sync_remote_deletions: bool,
    /// Larger messages get a structure and a partial body only. Zero or
    /// negative disables the limit.
    pub maximum_auto_download_message_size: i64,
    /// Window of most recent messages, used when the folder has none set.
    pub default_visible_limit: usize,
    /// Flags refreshed for cached messages. Empty disables the refresh.
    pub sync_flags: BTreeSet<Flag>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expunge_policy: ExpungePolicy::Manually,
            earliest_poll_date: None,
            sync_remote_deletions: true,
            maximum_auto_download_message_size: 32 * 1024,
            default_visible_limit: 25,
            sync_flags: [Flag::Seen, Flag::Answered, Flag::Flagged]
                .into_iter()
                .collect(),
        }
    }
}

impl SyncConfig {
    /// Sets the expunge policy.
    #[must_use]
    pub const fn with_expunge_policy(mut self, policy: ExpungePolicy) -> Self {
        self.expunge_policy = policy;
        self
    }

    /// Sets the earliest poll date.
    #[must_use]
    pub const fn with_earliest_poll_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.earliest_poll_date = date;
        self
    }

    /// Enables or disables removal of remotely deleted messages.
    #[must_use]
    pub const fn with_sync_remote_deletions(mut self, enabled: bool) -> Self {
        self.sync_remote_deletions = enabled;
        self
    }

    /// Sets the full download size limit.
    #[must_use]
    pub const fn with_maximum_auto_download_message_size(mut self, size: i64) -> Self {
        self.maximum_auto_download_message_size = size;
        self
    }

    /// Sets the default visible limit.
    #[must_use]
    pub const fn with_default_visible_limit(mut self, limit: usize) -> Self {
        self.default_visible_limit = limit;
        self
    }

    /// Sets the flags to refresh.
    #[must_use]
    pub fn with_sync_flags(mut self, flags: impl IntoIterator<Item = Flag>) -> Self {
        self.sync_flags = flags.into_iter().collect();
        self
    }

    /// Returns true if a message of `size` octets is downloaded in full.
    #[must_use]
    pub fn downloads_fully(&self, size: u64) -> bool {
        u64::try_from(self.maximum_auto_download_message_size)
            .map_or(true, |max| max == 0 || size <= max)
    }
}
