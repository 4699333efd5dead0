//! IMAP protocol parser.
//!
//! A sans-I/O parser for the server responses the synchronizer relies on.
//! The framed reader hands over complete responses, literals included, so
//! parsing never waits on the network.
//!
//! - **Lexer**: tokenizes raw bytes and reads generic nested values
//! - **Response parser**: builds [`Response`] values from tokens
//!
//! ```
//! use mailsync_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

mod fetch;
mod lexer;
mod response;

pub use fetch::{Address, Envelope, FetchItem};
pub use lexer::{Lexer, Token, Value};
pub use response::{Response, ResponseParser, UntaggedResponse};
