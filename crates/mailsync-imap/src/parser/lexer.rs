//! IMAP lexer for tokenizing server responses.
//!
//! Breaks a complete response (including embedded literals, as assembled by
//! the framed reader) into tokens. The lexer is lenient where real servers
//! are sloppy: invalid UTF-8 is replaced rather than rejected, and numbers
//! wider than 32 bits are kept.

use crate::{Error, Result};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom (unquoted string without special characters).
    Atom(&'a str),
    /// Number.
    Number(u64),
    /// Quoted string, unescaped.
    Quoted(String),
    /// Literal string with size prefix `{n}`.
    Literal(&'a [u8]),
    /// NIL.
    Nil,
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Space character.
    Space,
    /// Asterisk (untagged response prefix).
    Asterisk,
    /// Plus (continuation response prefix).
    Plus,
    /// CRLF line ending.
    Crlf,
    /// End of input.
    Eof,
}

/// A parenthesized data item, parsed generically.
///
/// ENVELOPE, BODYSTRUCTURE and NAMESPACE data are nested lists of strings,
/// numbers and NIL; parsing them into a tree first keeps the specific
/// decoders simple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// NIL
    Nil,
    /// Number
    Number(u64),
    /// Atom
    Atom(String),
    /// Quoted string or literal.
    String(Vec<u8>),
    /// Parenthesized list.
    List(Vec<Self>),
}

impl Value {
    /// Returns the value as text, if it is a string or atom.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Atom(s) => Some(s.clone()),
            Self::String(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Self::Number(n) => Some(n.to_string()),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns the list items, or an empty slice for non-lists.
    #[must_use]
    pub fn as_list(&self) -> &[Self] {
        match self {
            Self::List(items) => items,
            _ => &[],
        }
    }
}

/// IMAP lexer state.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Consumes a single space if present.
    pub fn skip_space(&mut self) {
        if self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on malformed literals or stray bytes.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' if self.peek_at(1) == Some(b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            // Some servers terminate with a bare LF.
            b'\n' => {
                self.pos += 1;
                Ok(Token::Crlf)
            }
            b' ' => self.single(Token::Space),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'*' => self.single(Token::Asterisk),
            b'+' => self.single(Token::Plus),
            b'"' => self.read_quoted(),
            b'{' => self.read_literal(),
            _ if is_atom_char(byte) => Ok(self.read_atom()),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn single(&mut self, token: Token<'a>) -> Result<Token<'a>> {
        self.pos += 1;
        Ok(token)
    }

    fn read_quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }
        Ok(Token::Quoted(String::from_utf8_lossy(&out).into_owned()))
    }

    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid literal size"))?;
        let size: usize = digits
            .parse()
            .map_err(|_| self.error("Invalid literal size number"))?;

        // LITERAL+ marker
        if self.peek() == Some(b'+') {
            self.pos += 1;
        }
        if self.advance() != Some(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }

        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("Incomplete literal data"))?;
        let data = &self.input[self.pos..end];
        self.pos = end;
        Ok(Token::Literal(data))
    }

    fn read_atom(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.pos += 1;
        }
        // Atom bytes are ASCII by construction.
        let s = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default();

        if s.eq_ignore_ascii_case("NIL") {
            Token::Nil
        } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().map_or(Token::Atom(s), Token::Number)
        } else {
            Token::Atom(s)
        }
    }

    /// Expects and consumes a space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the next byte is not a space.
    pub fn expect_space(&mut self) -> Result<()> {
        if self.advance() == Some(b' ') {
            Ok(())
        } else {
            Err(self.error("Expected space"))
        }
    }

    /// Expects and consumes the given single-byte token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if a different token follows.
    pub fn expect(&mut self, expected: &Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if &token == expected {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Reads a number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the next token is not a number.
    pub fn read_number(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads a 32-bit number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the next token is not a number or does not
    /// fit in 32 bits.
    pub fn read_u32(&mut self) -> Result<u32> {
        let n = self.read_number()?;
        u32::try_from(n).map_err(|_| self.error(&format!("Number out of range: {n}")))
    }

    /// Reads an atom as an owned string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the next token is not an atom.
    pub fn read_atom_string(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }

    /// Reads one data item: a string, number, atom, NIL or a nested list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on unbalanced parentheses or bad tokens.
    pub fn read_value(&mut self) -> Result<Value> {
        loop {
            return match self.next_token()? {
                Token::Space => continue,
                Token::Nil => Ok(Value::Nil),
                Token::Number(n) => Ok(Value::Number(n)),
                Token::Atom(s) => Ok(Value::Atom(s.to_string())),
                Token::Quoted(s) => Ok(Value::String(s.into_bytes())),
                Token::Literal(data) => Ok(Value::String(data.to_vec())),
                Token::LParen => self.read_list_tail(),
                token => Err(self.error(&format!("Unexpected token in data: {token:?}"))),
            };
        }
    }

    fn read_list_tail(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(b' ') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.read_value()?),
                None => return Err(self.error("Unterminated list")),
            }
        }
    }

    /// Reads raw bytes until `stop` (not consumed) or end of line.
    pub fn read_until(&mut self, stop: u8) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b != stop && b != b'\r' && b != b'\n')
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// Reads the remaining text on the line, without the line terminator.
    pub fn rest_of_line(&mut self) -> String {
        self.read_until(b'\r')
    }

    /// Creates a parse error at the current position.
    pub(crate) fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }
}

/// Returns true for bytes allowed in an atom.
///
/// Flags such as `\Seen` and `\*` lex as atoms, so backslash and asterisk
/// are accepted after the first byte has been dispatched.
const fn is_atom_char(b: u8) -> bool {
    b > 0x20 && b < 0x7F && !matches!(b, b'(' | b')' | b'{' | b'"' | b'[' | b']')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let mut lexer = Lexer::new(b"* 12 EXISTS\r\n");
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(12));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("EXISTS"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_quoted_with_escapes() {
        let mut lexer = Lexer::new(br#""say \"hi\" \\ bye""#);
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::Quoted("say \"hi\" \\ bye".to_string())
        );
    }

    #[test]
    fn test_literal() {
        let mut lexer = Lexer::new(b"{5}\r\nhello rest");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
    }

    #[test]
    fn test_literal_plus() {
        let mut lexer = Lexer::new(b"{3+}\r\nabc");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"abc"));
    }

    #[test]
    fn test_incomplete_literal() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(matches!(lexer.next_token(), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_flag_atoms() {
        let mut lexer = Lexer::new(b"\\Seen \\*");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        lexer.skip_space();
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\*"));
    }

    #[test]
    fn test_nil_case_insensitive() {
        let mut lexer = Lexer::new(b"nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn test_read_nested_value() {
        let mut lexer = Lexer::new(b"((\"\" \"/\") NIL {2}\r\nab 7)");
        let value = lexer.read_value().unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::List(vec![
                    Value::String(Vec::new()),
                    Value::String(b"/".to_vec())
                ]),
                Value::Nil,
                Value::String(b"ab".to_vec()),
                Value::Number(7),
            ])
        );
    }

    #[test]
    fn test_unterminated_list() {
        let mut lexer = Lexer::new(b"(1 2");
        assert!(lexer.read_value().is_err());
    }

    #[test]
    fn test_wide_number() {
        let mut lexer = Lexer::new(b"90000000000");
        assert_eq!(lexer.next_token().unwrap(), Token::Number(90_000_000_000));
    }
}
