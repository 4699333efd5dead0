//! POP3 status replies.

use crate::error::{Error, Result};

/// A single-line status reply (`+OK ...` or `-ERR ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// True for `+OK`.
    pub ok: bool,
    /// Text after the status indicator.
    pub text: String,
}

impl Reply {
    /// Parses a status line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the line starts with neither `+OK` nor
    /// `-ERR`.
    pub fn parse(line: &str) -> Result<Self> {
        let (ok, rest) = if let Some(rest) = strip_prefix_ignore_case(line, "+OK") {
            (true, rest)
        } else if let Some(rest) = strip_prefix_ignore_case(line, "-ERR") {
            (false, rest)
        } else {
            return Err(Error::Protocol(format!("unexpected reply: {line}")));
        };

        Ok(Self {
            ok,
            text: rest.trim_start().to_string(),
        })
    }

    /// Converts a `-ERR` reply into [`Error::Server`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] carrying the reply text.
    pub fn into_ok(self) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(Error::Server(self.text))
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = line.get(prefix.len()..)?;
    // "+OKAY" is not "+OK".
    if rest.is_empty() || rest.starts_with(' ') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        let reply = Reply::parse("+OK 2 320").unwrap();
        assert!(reply.ok);
        assert_eq!(reply.text, "2 320");
    }

    #[test]
    fn test_parse_bare_ok() {
        let reply = Reply::parse("+OK").unwrap();
        assert!(reply.ok);
        assert_eq!(reply.text, "");
    }

    #[test]
    fn test_parse_err() {
        let reply = Reply::parse("-ERR no such message").unwrap();
        assert!(!reply.ok);
        assert!(matches!(reply.into_ok(), Err(Error::Server(text)) if text == "no such message"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Reply::parse("* OK imap").is_err());
        assert!(Reply::parse("+OKAY").is_err());
        assert!(Reply::parse("+ challenge").is_err());
    }
}
