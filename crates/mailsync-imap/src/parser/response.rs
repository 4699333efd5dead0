//! IMAP response parser.

use crate::parser::fetch::{FetchItem, flags_from_value, parse_fetch_items};
use crate::parser::lexer::{Lexer, Token, Value};
use crate::types::{Capability, Flag, Namespace, Namespaces, ResponseCode, Status};
use crate::{Error, Result};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: String,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Text or base64 challenge after `+`.
        text: String,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK`, `* NO`, `* BAD`, `* PREAUTH` or `* BYE`.
    Status {
        /// Status keyword.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* FLAGS (...)`
    Flags(Vec<Flag>),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* SEARCH n...`
    Search(Vec<u32>),
    /// `* NAMESPACE ...`
    Namespace(Namespaces),
    /// `* n FETCH (...)`
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Returned data items.
        items: Vec<FetchItem>,
    },
    /// Any response the synchronizer does not need (LIST, STATUS, ID ...).
    Other(String),
}

/// Response parser.
#[derive(Debug)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response, including any embedded literals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed input.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => {
                lexer.expect_space()?;
                Self::parse_untagged(&mut lexer).map(Response::Untagged)
            }
            Token::Plus => {
                lexer.skip_space();
                Ok(Response::Continuation {
                    text: lexer.rest_of_line(),
                })
            }
            Token::Atom(tag) => {
                lexer.expect_space()?;
                let status = parse_status(&lexer.read_atom_string()?)
                    .ok_or_else(|| lexer.error("Invalid status in tagged response"))?;
                let (code, text) = parse_resp_text(&mut lexer)?;
                Ok(Response::Tagged {
                    tag: tag.to_string(),
                    status,
                    code,
                    text,
                })
            }
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
        match lexer.next_token()? {
            Token::Number(n) => {
                let n = u32::try_from(n).map_err(|_| lexer.error("Number out of range"))?;
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?.to_ascii_uppercase();
                match keyword.as_str() {
                    "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                    "RECENT" => Ok(UntaggedResponse::Recent(n)),
                    "EXPUNGE" => Ok(UntaggedResponse::Expunge(n)),
                    "FETCH" => {
                        lexer.expect_space()?;
                        let items = parse_fetch_items(lexer)?;
                        Ok(UntaggedResponse::Fetch { seq: n, items })
                    }
                    _ => Ok(UntaggedResponse::Other(format!(
                        "{n} {keyword}{}",
                        lexer.rest_of_line()
                    ))),
                }
            }
            Token::Atom(keyword) => {
                let upper = keyword.to_ascii_uppercase();
                if let Some(status) = parse_status(&upper) {
                    let (code, text) = parse_resp_text(lexer)?;
                    return Ok(UntaggedResponse::Status { status, code, text });
                }
                match upper.as_str() {
                    "CAPABILITY" => Ok(UntaggedResponse::Capability(parse_capabilities(lexer))),
                    "FLAGS" => {
                        lexer.expect_space()?;
                        Ok(UntaggedResponse::Flags(flags_from_value(
                            &lexer.read_value()?,
                        )))
                    }
                    "SEARCH" => parse_search(lexer).map(UntaggedResponse::Search),
                    "NAMESPACE" => parse_namespace(lexer).map(UntaggedResponse::Namespace),
                    _ => Ok(UntaggedResponse::Other(format!(
                        "{keyword}{}",
                        lexer.rest_of_line()
                    ))),
                }
            }
            token => Err(lexer.error(&format!("Unexpected token in untagged response: {token:?}"))),
        }
    }
}

fn parse_status(keyword: &str) -> Option<Status> {
    match keyword.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

/// Parses `[code] text` after a status keyword.
fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    lexer.skip_space();
    let code = if lexer.peek() == Some(b'[') {
        Some(parse_response_code(lexer)?)
    } else {
        None
    };
    lexer.skip_space();
    Ok((code, lexer.rest_of_line()))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(&Token::LBracket)?;
    let atom = lexer.read_atom_string()?;

    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NONEXISTENT" => ResponseCode::NonExistent,
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            ResponseCode::UidValidity(lexer.read_u32()?)
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            ResponseCode::UidNext(lexer.read_u32()?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.read_u32()?)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(flags_from_value(&lexer.read_value()?))
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capabilities(lexer)),
        _ => {
            let rest = lexer.read_until(b']');
            ResponseCode::Unknown(format!("{atom}{rest}"))
        }
    };

    // Skip anything left before the closing bracket.
    lexer.read_until(b']');
    lexer.expect(&Token::RBracket)?;
    Ok(code)
}

fn parse_capabilities(lexer: &mut Lexer<'_>) -> Vec<Capability> {
    let mut caps = Vec::new();
    loop {
        match lexer.peek() {
            Some(b' ') => {
                lexer.advance();
            }
            // Response codes end at the closing bracket.
            Some(b']' | b'\r' | b'\n') | None => break,
            Some(_) => match lexer.next_token() {
                Ok(Token::Atom(word)) => caps.push(Capability::parse(word)),
                Ok(Token::Number(n)) => caps.push(Capability::parse(&n.to_string())),
                _ => break,
            },
        }
    }
    caps
}

fn parse_search(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Space => {}
            Token::Number(n) => {
                ids.push(u32::try_from(n).map_err(|_| lexer.error("Number out of range"))?);
            }
            // (MODSEQ n) suffix from CONDSTORE servers
            Token::LParen => {
                lexer.read_until(b')');
                lexer.advance();
            }
            Token::Crlf | Token::Eof => break,
            token => return Err(lexer.error(&format!("Unexpected token in SEARCH: {token:?}"))),
        }
    }
    Ok(ids)
}

fn parse_namespace(lexer: &mut Lexer<'_>) -> Result<Namespaces> {
    let mut groups = Vec::with_capacity(3);
    for _ in 0..3 {
        lexer.expect_space()?;
        let value = lexer.read_value()?;
        let entries = value
            .as_list()
            .iter()
            .map(|entry| {
                let parts = entry.as_list();
                Namespace {
                    prefix: parts.first().and_then(Value::as_text).unwrap_or_default(),
                    delimiter: parts
                        .get(1)
                        .and_then(Value::as_text)
                        .and_then(|d| d.chars().next()),
                }
            })
            .collect::<Vec<_>>();
        groups.push(entries);
    }

    let mut groups = groups.into_iter();
    Ok(Namespaces {
        personal: groups.next().unwrap_or_default(),
        other: groups.next().unwrap_or_default(),
        shared: groups.next().unwrap_or_default(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn untagged(input: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_ok() {
        let response = ResponseParser::parse(b"A0001 OK LOGIN completed\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: "A0001".to_string(),
                status: Status::Ok,
                code: None,
                text: "LOGIN completed".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tagged_no_with_code() {
        let response =
            ResponseParser::parse(b"A0002 NO [NONEXISTENT] Unknown Mailbox: Foo\r\n").unwrap();
        let Response::Tagged { status, code, .. } = response else {
            panic!("expected tagged");
        };
        assert_eq!(status, Status::No);
        assert_eq!(code, Some(ResponseCode::NonExistent));
    }

    #[test]
    fn test_parse_greeting_with_capabilities() {
        let resp = untagged(b"* OK [CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN] Dovecot ready.\r\n");
        let UntaggedResponse::Status {
            status,
            code: Some(ResponseCode::Capability(caps)),
            text,
        } = resp
        else {
            panic!("expected status with capabilities");
        };
        assert_eq!(status, Status::Ok);
        assert_eq!(
            caps,
            vec![
                Capability::Imap4Rev1,
                Capability::StartTls,
                Capability::Auth("PLAIN".to_string())
            ]
        );
        assert_eq!(text, "Dovecot ready.");
    }

    #[test]
    fn test_parse_capability() {
        let resp = untagged(b"* CAPABILITY IMAP4rev1 NAMESPACE LOGINDISABLED\r\n");
        assert_eq!(
            resp,
            UntaggedResponse::Capability(vec![
                Capability::Imap4Rev1,
                Capability::Namespace,
                Capability::LoginDisabled
            ])
        );
    }

    #[test]
    fn test_parse_uidvalidity() {
        let resp = untagged(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n");
        assert!(matches!(
            resp,
            UntaggedResponse::Status {
                code: Some(ResponseCode::UidValidity(3_857_529_045)),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_permanentflags() {
        let resp = untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n");
        let UntaggedResponse::Status {
            code: Some(ResponseCode::PermanentFlags(flags)),
            ..
        } = resp
        else {
            panic!("expected PERMANENTFLAGS");
        };
        assert_eq!(flags, vec![Flag::Deleted, Flag::Seen, Flag::MayCreate]);
    }

    #[test]
    fn test_parse_exists_and_expunge() {
        assert_eq!(untagged(b"* 23 EXISTS\r\n"), UntaggedResponse::Exists(23));
        assert_eq!(untagged(b"* 4 EXPUNGE\r\n"), UntaggedResponse::Expunge(4));
    }

    #[test]
    fn test_parse_search() {
        assert_eq!(
            untagged(b"* SEARCH 2 84 882\r\n"),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(untagged(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));
    }

    #[test]
    fn test_parse_namespace() {
        let resp = untagged(b"* NAMESPACE ((\"INBOX.\" \".\")) NIL ((\"#shared.\" \".\"))\r\n");
        let UntaggedResponse::Namespace(ns) = resp else {
            panic!("expected NAMESPACE");
        };
        assert_eq!(
            ns.personal,
            vec![Namespace {
                prefix: "INBOX.".to_string(),
                delimiter: Some('.'),
            }]
        );
        assert!(ns.other.is_empty());
        assert_eq!(ns.shared[0].prefix, "#shared.");
    }

    #[test]
    fn test_parse_continuation() {
        let response = ResponseParser::parse(b"+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2U+\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2U+".to_string()
            }
        );
    }

    #[test]
    fn test_parse_bare_continuation() {
        let response = ResponseParser::parse(b"+\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_untagged_is_other() {
        assert!(matches!(
            untagged(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n"),
            UntaggedResponse::Other(_)
        ));
    }

    #[test]
    fn test_bye() {
        assert!(matches!(
            untagged(b"* BYE Logging out\r\n"),
            UntaggedResponse::Status {
                status: Status::Bye,
                ..
            }
        ));
    }
}
