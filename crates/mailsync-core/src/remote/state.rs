use crate::error::{Error, Result};
use crate::remote::OpenMode;

/// Lifecycle of a remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderState {
    /// No connection.
    #[default]
    Closed,
    /// Connecting or authenticating.
    Opening,
    /// Selected with the given mode.
    Open(OpenMode),
}

impl FolderState {
    /// Returns true if open in any mode.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Fails with [`Error::IllegalState`] unless open.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` naming `operation` and `folder`.
    pub fn require_open(self, operation: &str, folder: &str) -> Result<OpenMode> {
        match self {
            Self::Open(mode) => Ok(mode),
            Self::Closed | Self::Opening => Err(Error::IllegalState(format!(
                "{operation} on folder {folder} which is not open ({self:?})"
            ))),
        }
    }
}
