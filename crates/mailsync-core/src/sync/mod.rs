//! The folder synchronizer.
//!
//! A pass runs these phases in order, stopping at the first error:
//!
//! 1. open the remote folder read-only
//! 2. reject a negative message count
//! 3. purge the cache if the UID validity changed
//! 4. list the most recent messages and drop cached ones the server lost
//! 5. fetch flags and envelopes of new messages
//! 6. download content, in full or as structure plus a partial body
//! 7. refresh flags of cached messages
//! 8. expunge, if configured
//!
//! The folder is closed on every path.

mod config;
mod event;
mod synchronizer;

pub use config::{ExpungePolicy, SyncConfig};
pub use event::{CancellationFlag, SyncEvent, SyncSink};
pub use synchronizer::{SyncSummary, Synchronizer, UID_VALIDITY_KEY};
