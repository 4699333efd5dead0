//! FETCH response parsing.

use crate::Result;
use crate::parser::lexer::{Lexer, Token, Value};
use crate::types::Flag;

/// A data item returned in a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `UID n`
    Uid(u32),
    /// `FLAGS (...)`
    Flags(Vec<Flag>),
    /// `RFC822.SIZE n`
    Rfc822Size(u64),
    /// `INTERNALDATE "..."`, unparsed.
    InternalDate(String),
    /// `ENVELOPE (...)`
    Envelope(Box<Envelope>),
    /// `BODYSTRUCTURE (...)` or `BODY (...)`, kept as a value tree.
    BodyStructure(Value),
    /// `BODY[section]<origin> data`, also used for `RFC822*` items.
    Body {
        /// Section specifier; `None` for the whole message.
        section: Option<String>,
        /// Origin octet of a partial fetch.
        origin: Option<u32>,
        /// Content, `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
}

/// Envelope structure (RFC 9051 §7.5.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// `Date:` header, unparsed.
    pub date: Option<String>,
    /// `Subject:` header.
    pub subject: Option<String>,
    /// `From:` addresses.
    pub from: Vec<Address>,
    /// `To:` addresses.
    pub to: Vec<Address>,
    /// `Cc:` addresses.
    pub cc: Vec<Address>,
    /// `In-Reply-To:` header.
    pub in_reply_to: Option<String>,
    /// `Message-ID:` header.
    pub message_id: Option<String>,
}

/// Address from an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain.
    pub host: Option<String>,
}

impl Address {
    /// Returns `mailbox@host`, or whichever half is present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            (Some(m), None) => Some(m.clone()),
            (None, Some(h)) => Some(h.clone()),
            (None, None) => None,
        }
    }
}

/// Parses the parenthesized item list of a FETCH response.
pub(crate) fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(&Token::LParen)?;
    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                let upper = name.to_ascii_uppercase();
                if let Some(item) = parse_item(lexer, &upper)? {
                    items.push(item);
                }
            }
            token => return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}"))),
        }
    }

    Ok(items)
}

fn parse_item(lexer: &mut Lexer<'_>, name: &str) -> Result<Option<FetchItem>> {
    if name == "BODY" && lexer.peek() == Some(b'[') {
        return parse_body_section(lexer).map(Some);
    }

    lexer.expect_space()?;
    let item = match name {
        "UID" => Some(FetchItem::Uid(lexer.read_u32()?)),
        "RFC822.SIZE" => Some(FetchItem::Rfc822Size(lexer.read_number()?)),
        "FLAGS" => Some(FetchItem::Flags(flags_from_value(&lexer.read_value()?))),
        "INTERNALDATE" => lexer.read_value()?.as_text().map(FetchItem::InternalDate),
        "ENVELOPE" => Some(FetchItem::Envelope(Box::new(envelope_from_value(
            &lexer.read_value()?,
        )))),
        "BODYSTRUCTURE" | "BODY" => Some(FetchItem::BodyStructure(lexer.read_value()?)),
        "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
            let section = match name {
                "RFC822.HEADER" => Some("HEADER".to_string()),
                "RFC822.TEXT" => Some("TEXT".to_string()),
                _ => None,
            };
            Some(FetchItem::Body {
                section,
                origin: None,
                data: value_bytes(lexer.read_value()?),
            })
        }
        _ => {
            // MODSEQ, X-GM-* and friends; skip the value.
            lexer.read_value()?;
            None
        }
    };
    Ok(item)
}

fn parse_body_section(lexer: &mut Lexer<'_>) -> Result<FetchItem> {
    lexer.expect(&Token::LBracket)?;
    let section = lexer.read_until(b']');
    lexer.expect(&Token::RBracket)?;

    let origin = if lexer.peek() == Some(b'<') {
        lexer.advance();
        let digits = lexer.read_until(b'>');
        lexer.advance();
        digits.parse().ok()
    } else {
        None
    };

    lexer.expect_space()?;
    let data = value_bytes(lexer.read_value()?);

    Ok(FetchItem::Body {
        section: (!section.is_empty()).then_some(section),
        origin,
        data,
    })
}

fn value_bytes(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::String(bytes) => Some(bytes),
        Value::Atom(s) => Some(s.into_bytes()),
        _ => None,
    }
}

/// Converts a parenthesized flag list into flags.
pub(crate) fn flags_from_value(value: &Value) -> Vec<Flag> {
    value
        .as_list()
        .iter()
        .filter_map(Value::as_text)
        .map(|s| Flag::parse(&s))
        .collect()
}

fn envelope_from_value(value: &Value) -> Envelope {
    let fields = value.as_list();
    let text = |i: usize| fields.get(i).and_then(Value::as_text);
    let addresses = |i: usize| {
        fields
            .get(i)
            .map(|v| v.as_list().iter().map(address_from_value).collect())
            .unwrap_or_default()
    };

    Envelope {
        date: text(0),
        subject: text(1),
        from: addresses(2),
        to: addresses(5),
        cc: addresses(6),
        in_reply_to: text(8),
        message_id: text(9),
    }
}

fn address_from_value(value: &Value) -> Address {
    let parts = value.as_list();
    let text = |i: usize| parts.get(i).and_then(Value::as_text);
    Address {
        name: text(0),
        mailbox: text(2),
        host: text(3),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_items(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn test_uid_flags_size() {
        let items = parse(b"(UID 42 FLAGS (\\Seen $Forwarded) RFC822.SIZE 1024)");
        assert_eq!(
            items,
            vec![
                FetchItem::Uid(42),
                FetchItem::Flags(vec![Flag::Seen, Flag::Keyword("$Forwarded".to_string())]),
                FetchItem::Rfc822Size(1024),
            ]
        );
    }

    #[test]
    fn test_body_literal_with_origin() {
        let items = parse(b"(UID 7 BODY[TEXT]<0> {5}\r\nhello)");
        assert_eq!(
            items[1],
            FetchItem::Body {
                section: Some("TEXT".to_string()),
                origin: Some(0),
                data: Some(b"hello".to_vec()),
            }
        );
    }

    #[test]
    fn test_whole_body_nil() {
        let items = parse(b"(BODY[] NIL)");
        assert_eq!(
            items,
            vec![FetchItem::Body {
                section: None,
                origin: None,
                data: None,
            }]
        );
    }

    #[test]
    fn test_envelope() {
        let input = b"(ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Hello\" \
((\"Fred\" NIL \"fred\" \"example.com\")) NIL NIL \
((NIL NIL \"joe\" \"example.org\")) NIL NIL NIL \"<id@example.com>\"))";
        let items = parse(input);
        let FetchItem::Envelope(env) = &items[0] else {
            panic!("expected envelope");
        };
        assert_eq!(env.subject.as_deref(), Some("Hello"));
        assert_eq!(env.from[0].email().as_deref(), Some("fred@example.com"));
        assert_eq!(env.from[0].name.as_deref(), Some("Fred"));
        assert_eq!(env.to[0].email().as_deref(), Some("joe@example.org"));
        assert_eq!(env.message_id.as_deref(), Some("<id@example.com>"));
        assert!(env.cc.is_empty());
    }

    #[test]
    fn test_bodystructure_kept_as_tree() {
        let items = parse(b"(BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92))");
        let FetchItem::BodyStructure(Value::List(parts)) = &items[0] else {
            panic!("expected body structure");
        };
        assert_eq!(parts[0].as_text().as_deref(), Some("TEXT"));
        assert_eq!(parts[6], Value::Number(3028));
    }

    #[test]
    fn test_unknown_items_skipped() {
        let items = parse(b"(MODSEQ (12345) UID 3 X-GM-LABELS (\\Inbox))");
        assert_eq!(items, vec![FetchItem::Uid(3)]);
    }

    #[test]
    fn test_rfc822_header() {
        let items = parse(b"(RFC822.HEADER {4}\r\nA: b)");
        assert_eq!(
            items,
            vec![FetchItem::Body {
                section: Some("HEADER".to_string()),
                origin: None,
                data: Some(b"A: b".to_vec()),
            }]
        );
    }
}
