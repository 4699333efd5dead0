//! POP3 response parsing.
//!
//! Listings are parsed leniently: real servers pad fields with extra
//! spaces and some repeat the `+OK` indicator on listing lines.

use crate::error::{Error, Result};

/// Extracts the APOP timestamp (`<...>`) from the greeting text.
#[must_use]
pub fn greeting_timestamp(text: &str) -> Option<String> {
    let start = text.find('<')?;
    let end = start + text.get(start..)?.find('>')?;
    text.get(start..=end).map(ToString::to_string)
}

/// Parses the text of a `STAT` reply into (count, total size).
///
/// The count is signed so that a bogus negative value reaches the caller
/// instead of being rejected or clamped here.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if either field is missing or not a number.
pub fn parse_stat(text: &str) -> Result<(i64, u64)> {
    let mut fields = text.split_whitespace();
    let count = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid STAT reply: {text}")))?;
    let size = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    Ok((count, size))
}

/// Parses one `UIDL` listing line into (message number, unique id).
#[must_use]
pub fn parse_uidl_line(line: &str) -> Option<(u32, String)> {
    let line = strip_ok(line);
    let mut fields = line.split_whitespace();
    let msg = fields.next()?.parse().ok()?;
    let uid = fields.next()?;
    Some((msg, uid.to_string()))
}

/// Parses one `LIST` listing line into (message number, size in octets).
#[must_use]
pub fn parse_list_line(line: &str) -> Option<(u32, u64)> {
    let line = strip_ok(line);
    let mut fields = line.split_whitespace();
    let msg = fields.next()?.parse().ok()?;
    let size = fields.next()?.parse().ok()?;
    Some((msg, size))
}

fn strip_ok(line: &str) -> &str {
    line.strip_prefix("+OK ").unwrap_or(line)
}

/// Removes dot-stuffing from a line of a multi-line response.
#[must_use]
pub fn unstuff(line: &[u8]) -> &[u8] {
    match line {
        [b'.', rest @ ..] if rest.first() == Some(&b'.') => rest,
        _ => line,
    }
}

/// Returns true for the line that ends a multi-line response.
#[must_use]
pub fn is_terminator(line: &[u8]) -> bool {
    line == b"."
}
