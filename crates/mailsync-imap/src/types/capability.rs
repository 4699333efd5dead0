//! Server capabilities and response status.

/// Response status from a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Server capability relevant to the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// NAMESPACE command support (RFC 2342)
    Namespace,
    /// SASL initial response in AUTHENTICATE (RFC 4959)
    SaslIr,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// IDLE command support (RFC 2177)
    Idle,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "NAMESPACE" => Self::Namespace,
            "SASL-IR" => Self::SaslIr,
            "UIDPLUS" => Self::UidPlus,
            "IDLE" => Self::Idle,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Unknown(s.to_string()),
                |mechanism| Self::Auth(mechanism.to_string()),
            ),
        }
    }

    /// Returns true if this is `AUTH=<mechanism>` (case-insensitive).
    #[must_use]
    pub fn is_auth(&self, mechanism: &str) -> bool {
        matches!(self, Self::Auth(m) if m.eq_ignore_ascii_case(mechanism))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Idle => write!(f, "IDLE"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("StartTLS"), Capability::StartTls);
    }

    #[test]
    fn parse_auth_mechanism() {
        let cap = Capability::parse("AUTH=cram-md5");
        assert_eq!(cap, Capability::Auth("CRAM-MD5".to_string()));
        assert!(cap.is_auth("cram-md5"));
        assert!(!cap.is_auth("PLAIN"));
    }

    #[test]
    fn parse_unknown_keeps_original() {
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Unknown("X-GM-EXT-1".to_string())
        );
    }

    #[test]
    fn display_round_trip() {
        for s in ["IMAP4rev1", "STARTTLS", "AUTH=PLAIN", "NAMESPACE"] {
            assert_eq!(Capability::parse(s).to_string(), s);
        }
    }

    #[test]
    fn status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bad.is_ok());
        assert!(!Status::Bye.is_ok());
    }
}
