//! Progress events and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};

/// Progress of a sync pass. Every event names its folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The pass began.
    Started {
        /// Folder name
        folder: String,
    },
    /// Remote listing progress.
    HeadersProgress {
        /// Folder name
        folder: String,
        /// Messages listed so far
        done: usize,
        /// Messages to list
        total: usize,
    },
    /// A message was stored for the first time.
    NewMessage {
        /// Folder name
        folder: String,
        /// Message uid
        uid: String,
    },
    /// Flags of a cached message changed on the server.
    FlagsChanged {
        /// Folder name
        folder: String,
        /// Message uid
        uid: String,
    },
    /// A cached message was removed because the server no longer has it.
    Removed {
        /// Folder name
        folder: String,
        /// Message uid
        uid: String,
    },
    /// The UID validity changed and the cache was purged.
    UidValidityChanged {
        /// Folder name
        folder: String,
        /// Previously stored value
        old: i64,
        /// Value reported by the server
        new: i64,
    },
    /// The pass completed.
    Finished {
        /// Folder name
        folder: String,
        /// Remote message count
        total: i64,
        /// Messages stored in this pass
        new: usize,
    },
    /// The pass failed. `message` reads `"<Kind>: <root cause>"`.
    Failed {
        /// Folder name
        folder: String,
        /// Failure description
        message: String,
    },
}

/// Receiver of sync events.
pub trait SyncSink: Send + Sync {
    /// Handles one event. Must not block.
    fn emit(&self, event: SyncEvent);
}

impl<F> SyncSink for F
where
    F: Fn(SyncEvent) + Send + Sync,
{
    fn emit(&self, event: SyncEvent) {
        self(event);
    }
}

impl SyncSink for UnboundedSender<SyncEvent> {
    fn emit(&self, event: SyncEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.send(event);
    }
}

/// Cooperative cancellation shared between a pass and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates a flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::Cancelled`] once cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
