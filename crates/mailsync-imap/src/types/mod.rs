//! IMAP protocol types.

mod capability;
mod flags;
mod mailbox;

pub use capability::{Capability, Status};
pub use flags::Flag;
pub use mailbox::{MailboxStatus, Namespace, Namespaces, ResponseCode};
