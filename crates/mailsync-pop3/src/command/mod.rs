//! POP3 command builder.

/// POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPA - List capabilities (RFC 2449)
    Capa,
    /// AUTH - List SASL mechanisms, or start one
    Auth {
        /// Mechanism; `None` lists the supported mechanisms
        mechanism: Option<String>,
        /// Initial response (RFC 5034)
        initial_response: Option<String>,
    },
    /// USER - Name for USER/PASS login
    User {
        /// Mailbox name
        username: String,
    },
    /// PASS - Password for USER/PASS login
    Pass {
        /// Password
        password: String,
    },
    /// APOP - Digest login with the greeting timestamp
    Apop {
        /// Mailbox name
        username: String,
        /// Hex MD5 digest
        digest: String,
    },
    /// STLS - Upgrade to TLS (RFC 2595)
    Stls,
    /// STAT - Message count and size
    Stat,
    /// UIDL - Unique id listing
    Uidl,
    /// LIST - Size listing
    List,
    /// RETR - Retrieve a whole message
    Retr(u32),
    /// TOP - Headers plus the first lines of the body
    Top {
        /// Message number
        msg: u32,
        /// Body lines to include
        lines: u32,
    },
    /// DELE - Mark a message deleted
    Dele(u32),
    /// QUIT - Commit deletions and close
    Quit,
}

impl Command {
    /// Serializes the command line, without the CRLF.
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            Self::Capa => "CAPA".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                let mut line = "AUTH".to_string();
                if let Some(mechanism) = mechanism {
                    line.push(' ');
                    line.push_str(mechanism);
                    if let Some(resp) = initial_response {
                        line.push(' ');
                        // An empty initial response is sent as "=" (RFC 5034).
                        line.push_str(if resp.is_empty() { "=" } else { resp });
                    }
                }
                line
            }
            Self::User { username } => format!("USER {username}"),
            Self::Pass { password } => format!("PASS {password}"),
            Self::Apop { username, digest } => format!("APOP {username} {digest}"),
            Self::Stls => "STLS".to_string(),
            Self::Stat => "STAT".to_string(),
            Self::Uidl => "UIDL".to_string(),
            Self::List => "LIST".to_string(),
            Self::Retr(msg) => format!("RETR {msg}"),
            Self::Top { msg, lines } => format!("TOP {msg} {lines}"),
            Self::Dele(msg) => format!("DELE {msg}"),
            Self::Quit => "QUIT".to_string(),
        }
    }

    /// Returns a log-safe rendering of the command.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass { .. } => "PASS <redacted>".to_string(),
            Self::User { .. } => "USER <redacted>".to_string(),
            Self::Apop { .. } => "APOP <redacted>".to_string(),
            Self::Auth {
                mechanism: Some(mechanism),
                initial_response: Some(_),
            } => format!("AUTH {mechanism} <redacted>"),
            _ => self.serialize(),
        }
    }
}
