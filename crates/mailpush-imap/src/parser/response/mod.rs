//! Streaming IMAP response parser.
//!
//! Reads one logical response at a time directly from the connection's
//! buffered stream. Literals are read in place, so a response spanning several
//! physical lines is still returned as one [`Response`].

#![allow(clippy::missing_errors_doc)]

mod types;

pub use types::{ListKind, Response, ResponseKind, ResponseList, Value};

use std::io::{self, Write};

use bytes::Bytes;
use tokio::io::AsyncBufRead;

use crate::parser::lexer::{Lexer, into_string};
use crate::types::Status;
use crate::{Error, Result};

/// Largest literal that will be buffered in memory.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Receives literal payloads instead of the parser buffering them.
///
/// The callback is scoped to a single [`ResponseParser::read_response`] call.
pub trait LiteralCallback: Send {
    /// Called when a literal of `size` bytes starts.
    ///
    /// `response` holds everything parsed so far at the top level and `list` is
    /// the innermost open list. Returning a writer streams the payload into it
    /// and leaves [`Value::Streamed`] in the tree; returning `None` buffers the
    /// literal as usual.
    fn literal_sink(
        &mut self,
        response: &Response,
        list: &ResponseList,
        size: usize,
    ) -> Option<&mut (dyn Write + Send)>;
}

/// A list that has been opened but not closed yet.
struct OpenList {
    list: ResponseList,
}

/// Parser bound to a buffered byte stream.
#[derive(Debug)]
pub struct ResponseParser<R> {
    lexer: Lexer<R>,
    sink_error: Option<io::Error>,
}

impl<R> ResponseParser<R> {
    /// Creates a parser over `reader`.
    pub const fn new(reader: R) -> Self {
        Self {
            lexer: Lexer::new(reader),
            sink_error: None,
        }
    }

    /// Gets a reference to the underlying reader.
    pub const fn get_ref(&self) -> &R {
        self.lexer.get_ref()
    }

    /// Gets a mutable reference to the underlying reader.
    pub const fn get_mut(&mut self) -> &mut R {
        self.lexer.get_mut()
    }

    /// Consumes the parser and returns the reader.
    pub fn into_inner(self) -> R {
        self.lexer.into_inner()
    }
}

impl<R> ResponseParser<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Waits until response data is available without consuming any of it.
    pub async fn wait_for_data(&mut self) -> Result<()> {
        self.lexer.fill().await
    }

    /// Reads the next complete response.
    ///
    /// End of stream before a full response fails with [`Error::Io`]. The
    /// status of the response is not interpreted here.
    pub async fn read_response(
        &mut self,
        mut callback: Option<&mut dyn LiteralCallback>,
    ) -> Result<Response> {
        self.lexer.reset_position();
        self.sink_error = None;

        let response = match self.lexer.peek().await? {
            b'+' => {
                self.lexer.advance().await?;
                if self.lexer.peek().await? == b' ' {
                    self.lexer.advance().await?;
                }
                let text = self.lexer.read_to_eol().await?;
                return Ok(Response::continuation(into_string(text)));
            }
            b'*' => {
                self.lexer.advance().await?;
                self.lexer.expect(b' ').await?;
                let mut response = Response::untagged();
                self.read_body(&mut response, &mut callback).await?;
                response
            }
            _ => {
                let tag = self.lexer.read_tag().await?;
                self.lexer.expect(b' ').await?;
                let mut response = Response::tagged(tag);
                self.read_body(&mut response, &mut callback).await?;
                response
            }
        };

        if let Some(err) = self.sink_error.take() {
            return Err(Error::Io(err));
        }
        Ok(response)
    }

    async fn read_body(
        &mut self,
        response: &mut Response,
        callback: &mut Option<&mut dyn LiteralCallback>,
    ) -> Result<()> {
        let first = self.lexer.read_atom(false).await?;
        if first.is_empty() {
            let byte = self.lexer.peek().await?;
            return Err(self.lexer.error(format!(
                "response must start with an atom, found {:?}",
                char::from(byte)
            )));
        }

        let first = Value::from_atom(first);
        let is_status = first.as_str().and_then(Status::parse).is_some();
        let is_list = response.is_untagged()
            && (first.eq_ignore_case(keyword::LIST) || first.eq_ignore_case(keyword::LSUB));
        response.push(first);

        if is_status {
            self.read_resp_text(response, callback).await
        } else if is_list {
            self.read_list_data(response, callback).await
        } else {
            self.read_tokens(response, Vec::new(), callback).await.map(drop)
        }
    }

    /// Reads `[SP ["[" code "]" SP] text] CRLF` after a status keyword.
    ///
    /// The text is taken verbatim up to the end of the line.
    async fn read_resp_text(
        &mut self,
        response: &mut Response,
        callback: &mut Option<&mut dyn LiteralCallback>,
    ) -> Result<()> {
        match self.lexer.peek().await? {
            b'\r' | b'\n' => return self.lexer.expect_crlf().await,
            b' ' => {
                self.lexer.advance().await?;
            }
            other => {
                return Err(self.lexer.error(format!(
                    "expected space after status, found {:?}",
                    char::from(other)
                )));
            }
        }

        if self.lexer.peek().await? == b'[' {
            self.lexer.advance().await?;
            let open = vec![OpenList {
                list: ResponseList::new(ListKind::Bracket),
            }];
            if self.read_tokens(response, open, callback).await? {
                return Ok(());
            }
            if self.lexer.peek().await? == b' ' {
                self.lexer.advance().await?;
            }
        }

        let text = self.lexer.read_to_eol().await?;
        if !text.is_empty() {
            response.push(Value::String(into_string(text)));
        }
        Ok(())
    }

    /// Reads `LIST (attributes) delimiter name`.
    ///
    /// Mailbox names may contain brackets here, unlike ordinary atoms.
    async fn read_list_data(
        &mut self,
        response: &mut Response,
        callback: &mut Option<&mut dyn LiteralCallback>,
    ) -> Result<()> {
        self.lexer.expect(b' ').await?;
        self.lexer.expect(b'(').await?;
        let open = vec![OpenList {
            list: ResponseList::new(ListKind::Paren),
        }];
        if self.read_tokens(response, open, callback).await? {
            return Err(self.lexer.error("LIST response ended after attributes"));
        }

        self.lexer.expect(b' ').await?;
        let delimiter = if self.lexer.peek().await? == b'"' {
            self.lexer.read_quoted().await?
        } else {
            self.lexer.read_atom(false).await?
        };
        response.push(Value::String(into_string(delimiter)));

        self.lexer.expect(b' ').await?;
        let name = match self.lexer.peek().await? {
            b'"' => Value::String(into_string(self.lexer.read_quoted().await?)),
            b'{' => {
                let size = self.lexer.read_literal_size().await?;
                Value::String(into_string(self.lexer.read_bytes(size).await?))
            }
            _ => Value::String(into_string(self.lexer.read_atom(true).await?)),
        };
        response.push(name);

        // Extended LIST data, if any, follows the ordinary grammar.
        self.read_tokens(response, Vec::new(), callback).await.map(drop)
    }

    /// Core token loop.
    ///
    /// With an empty `stack` it reads to the end of the line. With open lists it
    /// returns as soon as the outermost one closes. Returns true if the line
    /// terminator was consumed.
    async fn read_tokens(
        &mut self,
        response: &mut Response,
        mut stack: Vec<OpenList>,
        callback: &mut Option<&mut dyn LiteralCallback>,
    ) -> Result<bool> {
        let nested_only = !stack.is_empty();

        loop {
            let byte = self.lexer.peek().await?;
            match byte {
                b' ' => {
                    self.lexer.advance().await?;
                }
                b'\r' | b'\n' => {
                    self.lexer.expect_crlf().await?;
                    // Lists left open by a truncated line are kept as they are.
                    while let Some(open) = stack.pop() {
                        attach(&mut stack, response, Value::List(open.list));
                    }
                    return Ok(true);
                }
                b'(' | b'[' => {
                    self.lexer.advance().await?;
                    let kind = if byte == b'(' {
                        ListKind::Paren
                    } else {
                        ListKind::Bracket
                    };
                    stack.push(OpenList {
                        list: ResponseList::new(kind),
                    });
                }
                b')' | b']' => {
                    self.lexer.advance().await?;
                    match stack.last() {
                        Some(open) if open.list.kind().close() == byte => {
                            if let Some(open) = stack.pop() {
                                attach(&mut stack, response, Value::List(open.list));
                            }
                            if nested_only && stack.is_empty() {
                                return Ok(false);
                            }
                        }
                        Some(_) => {
                            attach(
                                &mut stack,
                                response,
                                Value::String(char::from(byte).to_string()),
                            );
                        }
                        None => {}
                    }
                }
                b'"' => {
                    let quoted = self.lexer.read_quoted().await?;
                    attach(&mut stack, response, Value::String(into_string(quoted)));
                }
                b'{' => {
                    let value = self.read_literal(response, &stack, callback).await?;
                    attach(&mut stack, response, value);
                }
                _ => {
                    let atom = self.lexer.read_atom(false).await?;
                    if atom.is_empty() {
                        return Err(self
                            .lexer
                            .error(format!("unexpected byte {byte:#04x} in response")));
                    }
                    attach(&mut stack, response, Value::from_atom(atom));
                }
            }
        }
    }

    async fn read_literal(
        &mut self,
        response: &Response,
        stack: &[OpenList],
        callback: &mut Option<&mut dyn LiteralCallback>,
    ) -> Result<Value> {
        let size = self.lexer.read_literal_size().await?;
        if size == 0 {
            return Ok(Value::String(String::new()));
        }

        if let Some(callback) = callback.as_mut() {
            let list = stack.last().map_or(response.values(), |open| &open.list);
            if let Some(sink) = callback.literal_sink(response, list, size) {
                if let Err(err) = self.lexer.stream_bytes(size, sink).await? {
                    tracing::warn!(?err, size, "literal callback failed");
                    self.sink_error.get_or_insert(err);
                }
                return Ok(Value::Streamed(size));
            }
        }

        if size > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {size} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        let bytes = self.lexer.read_bytes(size).await?;
        Ok(Value::Literal(Bytes::from(bytes)))
    }
}

fn attach(stack: &mut [OpenList], response: &mut Response, value: Value) {
    match stack.last_mut() {
        Some(open) => open.list.push(value),
        None => response.push(value),
    }
}

/// Response keywords the engine looks at.
pub mod keyword {
    /// `CAPABILITY` data or response code.
    pub const CAPABILITY: &str = "CAPABILITY";
    /// `LIST` data.
    pub const LIST: &str = "LIST";
    /// `LSUB` data.
    pub const LSUB: &str = "LSUB";
    /// `NAMESPACE` data.
    pub const NAMESPACE: &str = "NAMESPACE";
    /// `SEARCH` data.
    pub const SEARCH: &str = "SEARCH";
    /// `EXISTS` data.
    pub const EXISTS: &str = "EXISTS";
    /// `EXPUNGE` data.
    pub const EXPUNGE: &str = "EXPUNGE";
    /// `RECENT` data.
    pub const RECENT: &str = "RECENT";
    /// `FETCH` data.
    pub const FETCH: &str = "FETCH";
    /// `VANISHED` data (QRESYNC).
    pub const VANISHED: &str = "VANISHED";
    /// `EARLIER` tag of a VANISHED response.
    pub const EARLIER: &str = "EARLIER";
    /// `FLAGS` data and fetch item.
    pub const FLAGS: &str = "FLAGS";
    /// `UID` fetch item.
    pub const UID: &str = "UID";
    /// `MODSEQ` fetch item.
    pub const MODSEQ: &str = "MODSEQ";
    /// `COPYUID` response code.
    pub const COPYUID: &str = "COPYUID";
    /// `UIDVALIDITY` response code.
    pub const UIDVALIDITY: &str = "UIDVALIDITY";
    /// `UIDNEXT` response code.
    pub const UIDNEXT: &str = "UIDNEXT";
    /// `HIGHESTMODSEQ` response code.
    pub const HIGHESTMODSEQ: &str = "HIGHESTMODSEQ";
    /// `NOMODSEQ` response code.
    pub const NOMODSEQ: &str = "NOMODSEQ";
    /// `PERMANENTFLAGS` response code.
    pub const PERMANENTFLAGS: &str = "PERMANENTFLAGS";
    /// `READ-WRITE` response code.
    pub const READ_WRITE: &str = "READ-WRITE";
    /// `READ-ONLY` response code.
    pub const READ_ONLY: &str = "READ-ONLY";
    /// `AUTHENTICATIONFAILED` response code.
    pub const AUTHENTICATIONFAILED: &str = "AUTHENTICATIONFAILED";
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    async fn parse(input: &[u8]) -> Result<Response> {
        ResponseParser::new(input).read_response(None).await
    }

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[tokio::test]
    async fn test_untagged_ok_with_capability_code() {
        let response = parse(b"* OK [CAPABILITY IMAP4rev1 IDLE] Welcome here\r\n")
            .await
            .unwrap();

        assert!(response.is_untagged());
        assert_eq!(response.status(), Some(Status::Ok));
        let code = response.code().unwrap();
        assert_eq!(code.get_str(0), Some("CAPABILITY"));
        assert_eq!(code.get_str(2), Some("IDLE"));
        assert_eq!(response.status_text(), Some("Welcome here"));
    }

    #[tokio::test]
    async fn test_tagged_status_without_text() {
        let response = parse(b"A12 OK\r\n").await.unwrap();
        assert_eq!(response.tag(), Some("A12"));
        assert_eq!(response.status(), Some(Status::Ok));
        assert_eq!(response.len(), 1);
    }

    #[tokio::test]
    async fn test_status_text_is_not_tokenized() {
        let response = parse(b"A1 NO [ALERT] Mailbox (INBOX) is \"full\"\r\n")
            .await
            .unwrap();
        assert_eq!(response.status_text(), Some("Mailbox (INBOX) is \"full\""));
    }

    #[tokio::test]
    async fn test_numbered_data() {
        let response = parse(b"* 23 EXISTS\r\n").await.unwrap();
        assert_eq!(response.get(0), Some(&Value::Number(23)));
        assert_eq!(response.numbered("EXISTS"), Some(23));
    }

    #[tokio::test]
    async fn test_nested_lists() {
        let response = parse(b"* 1 FETCH (UID 7 FLAGS (\\Seen (a (b))) BODY[HEADER.FIELDS (SUBJECT)])\r\n")
            .await
            .unwrap();

        let fetch = response.get_list(2).unwrap();
        assert_eq!(fetch.get_keyed_value("UID"), Some(&Value::Number(7)));
        let flags = fetch.get_keyed_value("FLAGS").unwrap().as_list().unwrap();
        assert_eq!(flags.get_str(0), Some("\\Seen"));
        assert_eq!(
            flags.get_list(1).unwrap().get_list(1).unwrap().get_str(0),
            Some("b")
        );
        let section = fetch.get_list(5).unwrap();
        assert_eq!(section.kind(), ListKind::Bracket);
        assert_eq!(section.get_str(0), Some("HEADER.FIELDS"));
    }

    #[tokio::test]
    async fn test_nil_is_a_plain_string() {
        let response = parse(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").await.unwrap();
        assert_eq!(response.get(2), Some(&string("NIL")));
        assert!(response.get(3).unwrap().is_nil());
    }

    #[tokio::test]
    async fn test_literal_in_the_middle_of_a_line() {
        let response = parse(b"* 1 FETCH (BODY[] {5}\r\nhello FLAGS (\\Seen))\r\n")
            .await
            .unwrap();
        let fetch = response.get_list(2).unwrap();
        assert_eq!(fetch.get(2), Some(&Value::Literal(Bytes::from_static(b"hello"))));
        assert_eq!(fetch.get_str(2), Some("hello"));
        assert!(fetch.get_keyed_value("FLAGS").is_some());
    }

    #[tokio::test]
    async fn test_literal_contains_crlf_and_parens() {
        let response = parse(b"* 1 FETCH (BODY[] {8}\r\n(a)\r\n)b) UID 4)\r\n")
            .await
            .unwrap();
        let fetch = response.get_list(2).unwrap();
        assert_eq!(fetch.get_str(2), Some("(a)\r\n)b)"));
        assert_eq!(fetch.get_keyed_value("UID"), Some(&Value::Number(4)));
    }

    #[tokio::test]
    async fn test_zero_length_literal() {
        let response = parse(b"* 1 FETCH (BODY[] {0}\r\n)\r\n").await.unwrap();
        assert_eq!(response.get_list(2).unwrap().get(2), Some(&string("")));
    }

    #[tokio::test]
    async fn test_quoted_string_escapes() {
        let response = parse(b"* LIST () \"/\" \"a \\\"b\\\" c\"\r\n").await.unwrap();
        assert_eq!(response.get_str(3), Some("a \"b\" c"));
    }

    #[tokio::test]
    async fn test_list_with_brackets_in_name() {
        let response = parse(b"* LIST (\\HasNoChildren) \"/\" [Gmail]/Sent\r\n")
            .await
            .unwrap();
        assert_eq!(response.get_str(0), Some("LIST"));
        assert_eq!(response.get_list(1).unwrap().get_str(0), Some("\\HasNoChildren"));
        assert_eq!(response.get_str(2), Some("/"));
        assert_eq!(response.get_str(3), Some("[Gmail]/Sent"));
    }

    #[tokio::test]
    async fn test_list_with_nil_delimiter_and_literal_name() {
        let response = parse(b"* LSUB () NIL {5}\r\nInbox\r\n").await.unwrap();
        assert_eq!(response.get_str(2), Some("NIL"));
        assert_eq!(response.get_str(3), Some("Inbox"));
    }

    #[tokio::test]
    async fn test_continuation() {
        let response = parse(b"+ eyJzdGF0dXMiOiI0MDAifQ==\r\n").await.unwrap();
        assert!(response.is_continuation());
        assert_eq!(response.tag(), None);
        assert_eq!(response.continuation_text(), Some("eyJzdGF0dXMiOiI0MDAifQ=="));

        let response = parse(b"+\r\n").await.unwrap();
        assert_eq!(response.continuation_text(), Some(""));
    }

    #[tokio::test]
    async fn test_consecutive_responses() {
        let mut parser = ResponseParser::new(&b"* 3 EXPUNGE\r\n* 4 EXISTS\r\nA1 OK done\r\n"[..]);
        assert_eq!(parser.read_response(None).await.unwrap().numbered("EXPUNGE"), Some(3));
        assert_eq!(parser.read_response(None).await.unwrap().numbered("EXISTS"), Some(4));
        assert_eq!(parser.read_response(None).await.unwrap().tag(), Some("A1"));
        assert!(matches!(parser.read_response(None).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_truncated_response_is_io_error() {
        assert!(matches!(parse(b"* 1 FETCH (UID").await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_unterminated_list_is_kept() {
        let response = parse(b"* 1 FETCH (UID 4\r\n").await.unwrap();
        assert_eq!(response.get_list(2).unwrap().get_number(1), Some(4));
    }

    #[tokio::test]
    async fn test_malformed_start() {
        assert!(matches!(parse(b"* (foo)\r\n").await, Err(Error::Parse { .. })));
        assert!(matches!(parse(b" OK\r\n").await, Err(Error::Parse { .. })));
    }

    #[tokio::test]
    async fn test_literal_streamed_to_callback() {
        struct Collect {
            data: Vec<u8>,
            seen_uid: Option<u64>,
        }

        impl LiteralCallback for Collect {
            fn literal_sink(
                &mut self,
                response: &Response,
                list: &ResponseList,
                size: usize,
            ) -> Option<&mut (dyn Write + Send)> {
                assert_eq!(response.get_number(0), Some(1));
                assert_eq!(size, 11);
                self.seen_uid = list.get_keyed_value("UID").and_then(Value::as_number);
                Some(&mut self.data)
            }
        }

        let mut collect = Collect {
            data: Vec::new(),
            seen_uid: None,
        };
        let mut parser =
            ResponseParser::new(&b"* 1 FETCH (UID 9 BODY[] {11}\r\nhello world)\r\n"[..]);
        let response = parser.read_response(Some(&mut collect)).await.unwrap();

        assert_eq!(collect.data, b"hello world");
        assert_eq!(collect.seen_uid, Some(9));
        assert_eq!(response.get_list(2).unwrap().get(4), Some(&Value::Streamed(11)));
    }

    #[tokio::test]
    async fn test_failing_callback_keeps_stream_in_sync() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("no space"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        struct Failing(Broken);

        impl LiteralCallback for Failing {
            fn literal_sink(
                &mut self,
                _response: &Response,
                _list: &ResponseList,
                _size: usize,
            ) -> Option<&mut (dyn Write + Send)> {
                Some(&mut self.0)
            }
        }

        let mut parser =
            ResponseParser::new(&b"* 1 FETCH (BODY[] {3}\r\nabc)\r\nA1 OK\r\n"[..]);
        let result = parser.read_response(Some(&mut Failing(Broken))).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(parser.read_response(None).await.unwrap().tag(), Some("A1"));
    }
}
