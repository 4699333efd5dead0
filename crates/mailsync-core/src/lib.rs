//! # mailsync-core
//!
//! One-way synchronization of mail folders into a local cache.
//!
//! This crate provides:
//! - **Server URI codec** - compact `imap+ssl+://PLAIN:user:pass@host/1%7C` settings
//! - **Remote folders** - IMAP and POP3 behind one [`RemoteFolder`] trait
//! - **Backend storage** - in-memory and `SQLite` message caches
//! - **Synchronizer** - the per-folder sync pass with progress events
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_core::{
//!     CancellationFlag, ImapStore, SqliteBackend, SyncConfig, Synchronizer, settings,
//! };
//!
//! let server = settings::decode("imap+ssl+://PLAIN:me%2540example.com:secret@imap.example.com")?;
//! let store = ImapStore::new(server, Default::default());
//! let sync = Synchronizer::new(SqliteBackend::new("cache.db").await?);
//! let sink = |event| println!("{event:?}");
//! sync.sync(&store, "INBOX", &SyncConfig::default(), &sink, &CancellationFlag::new()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
mod error;
pub mod remote;
pub mod settings;
pub mod sync;

pub use backend::{BackendFolder, BackendStorage, MemoryBackend, SqliteBackend};
pub use error::{Error, Result};
pub use remote::{
    FetchItem, FetchProfile, Flag, FolderState, ImapStore, MessageHandle, OpenMode, Pop3Store,
    RemoteFolder, RemoteStore,
};
pub use settings::{AuthType, ConnectionSecurity, Scheme, ServerSettings};
pub use sync::{
    CancellationFlag, ExpungePolicy, SyncConfig, SyncEvent, SyncSink, SyncSummary, Synchronizer,
};
