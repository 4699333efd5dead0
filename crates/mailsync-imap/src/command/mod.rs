//! IMAP command types and serialization.
//!
//! Only the commands the folder synchronizer issues are modelled.

mod tag_generator;

pub use tag_generator::TagGenerator;

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY
    Capability,
    /// LOGOUT
    Logout,
    /// STARTTLS
    StartTls,
    /// LOGIN user password
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE mechanism [initial-response]
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// NAMESPACE
    Namespace,
    /// SELECT mailbox (read-write)
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// EXAMINE mailbox (read-only)
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// `[UID] SEARCH criteria`
    Search {
        /// Raw search criteria, e.g. `ALL` or `SINCE 1-Jan-2024`.
        criteria: String,
        /// Whether results are UIDs.
        uid: bool,
    },
    /// `[UID] FETCH set items`
    Fetch {
        /// Sequence or UID set, e.g. `1:20` or `4,7,9`.
        set: String,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
        /// Whether `set` holds UIDs.
        uid: bool,
    },
    /// EXPUNGE
    Expunge,
    /// CLOSE
    Close,
}

/// A data item requested by FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`
    Uid,
    /// `FLAGS`
    Flags,
    /// `RFC822.SIZE`
    Rfc822Size,
    /// `INTERNALDATE`
    InternalDate,
    /// `ENVELOPE`
    Envelope,
    /// `BODYSTRUCTURE`
    BodyStructure,
    /// `BODY.PEEK[section]<offset.length>`; does not set `\Seen`.
    BodyPeek {
        /// Section specifier, e.g. `TEXT` or `1.2`. `None` is the whole message.
        section: Option<String>,
        /// Partial range `(offset, length)`.
        partial: Option<(u32, u32)>,
    },
}

impl Command {
    /// Serializes the command to bytes with the given tag, including CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Namespace => buf.extend_from_slice(b"NAMESPACE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "=" (RFC 4959).
                    if resp.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(resp.as_bytes());
                    }
                }
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }

            Self::Search { criteria, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                buf.extend_from_slice(criteria.as_bytes());
            }

            Self::Fetch { set, items, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(set.as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a log-safe rendering of the command.
    ///
    /// Credentials in LOGIN and AUTHENTICATE are replaced.
    #[must_use]
    pub fn redacted(&self, tag: &str) -> String {
        match self {
            Self::Login { .. } => format!("{tag} LOGIN <redacted>"),
            Self::Authenticate { mechanism, .. } => format!("{tag} AUTHENTICATE {mechanism} <redacted>"),
            _ => String::from_utf8_lossy(&self.serialize(tag))
                .trim_end()
                .to_string(),
        }
    }
}

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

fn write_fetch_items(buf: &mut Vec<u8>, items: &[FetchAttribute]) {
    if let [single] = items {
        write_fetch_attribute(buf, single);
        return;
    }
    buf.push(b'(');
    for (i, attr) in items.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        write_fetch_attribute(buf, attr);
    }
    buf.push(b')');
}

fn write_fetch_attribute(buf: &mut Vec<u8>, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Uid => buf.extend_from_slice(b"UID"),
        FetchAttribute::Flags => buf.extend_from_slice(b"FLAGS"),
        FetchAttribute::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
        FetchAttribute::InternalDate => buf.extend_from_slice(b"INTERNALDATE"),
        FetchAttribute::Envelope => buf.extend_from_slice(b"ENVELOPE"),
        FetchAttribute::BodyStructure => buf.extend_from_slice(b"BODYSTRUCTURE"),
        FetchAttribute::BodyPeek { section, partial } => {
            buf.extend_from_slice(b"BODY.PEEK[");
            if let Some(section) = section {
                buf.extend_from_slice(section.as_bytes());
            }
            buf.push(b']');
            if let Some((offset, length)) = partial {
                buf.extend_from_slice(format!("<{offset}.{length}>").as_bytes());
            }
        }
    }
}

/// Formats UIDs as a compact IMAP set, collapsing consecutive runs.
///
/// The input does not need to be sorted; duplicates are removed.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek().is_some_and(|&next| Some(next) == end.checked_add(1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}:{end}"));
        }
    }
    parts.join(",")
}
