//! IMAP response parser.
//!
//! Server output is turned into a generic tree of [`Response`] values that the
//! [`model`](crate::model) types interpret afterwards. The parser reads straight
//! from the connection's buffered stream, one logical response per call.
//!
//! # Architecture
//!
//! - **Lexer**: pulls atoms, quoted strings and literals off the byte stream
//! - **Response parser**: assembles them into tagged, untagged and
//!   continuation responses with arbitrarily nested lists
//!
//! # Example
//!
//! ```
//! use mailpush_imap::parser::ResponseParser;
//!
//! # tokio_test::block_on(async {
//! let mut parser = ResponseParser::new(&b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n"[..]);
//! let response = parser.read_response(None).await.unwrap();
//!
//! assert!(response.is_untagged());
//! assert_eq!(response.code().unwrap().get_str(2), Some("IDLE"));
//! # });
//! ```

pub mod lexer;
pub mod response;

pub use lexer::Lexer;
pub use response::{
    ListKind, LiteralCallback, Response, ResponseKind, ResponseList, ResponseParser, Value,
    keyword,
};
