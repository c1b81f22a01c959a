//! Generic response tree produced by the parser.

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

use crate::types::Status;
use crate::{Error, Result};

/// A single token of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Atom or quoted string. `NIL` arrives as the plain string `"NIL"`.
    String(String),
    /// Bare token made only of digits.
    Number(u64),
    /// Literal payload, kept as raw bytes.
    Literal(Bytes),
    /// Parenthesized or bracketed list.
    List(ResponseList),
    /// Literal of the given size that was handed to a literal callback.
    Streamed(usize),
}

impl Value {
    /// Builds a value from a bare token.
    pub(crate) fn from_atom(atom: Vec<u8>) -> Self {
        if !atom.is_empty() && atom.iter().all(u8::is_ascii_digit) {
            if let Some(number) = std::str::from_utf8(&atom)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                return Self::Number(number);
            }
        }
        Self::String(crate::parser::lexer::into_string(atom))
    }

    /// Returns the string content of a string or UTF-8 literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Literal(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Returns the textual form of any scalar value.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::String(s) => Some(Cow::Borrowed(s)),
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            Self::Literal(bytes) => Some(String::from_utf8_lossy(bytes)),
            Self::List(_) | Self::Streamed(_) => None,
        }
    }

    /// Returns the value as a number, parsing strings if needed.
    #[must_use]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the nested list.
    #[must_use]
    pub const fn as_list(&self) -> Option<&ResponseList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns true for scalar values (anything but a list).
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_))
    }

    /// Returns true for the `NIL` atom.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.eq_ignore_case("NIL")
    }

    /// Compares a string value with `other`, ignoring ASCII case.
    #[must_use]
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.as_str().is_some_and(|s| s.eq_ignore_ascii_case(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) if s.is_empty() || s.contains([' ', '"', '(', ')']) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Literal(bytes) => write!(f, "{{{}}}", bytes.len()),
            Self::Streamed(size) => write!(f, "{{{size}}}"),
            Self::List(list) => write!(f, "{list}"),
        }
    }
}

/// Delimiters a list was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListKind {
    /// `( ... )`
    #[default]
    Paren,
    /// `[ ... ]`, used for response codes and section specifiers.
    Bracket,
}

impl ListKind {
    pub(crate) const fn open(self) -> u8 {
        match self {
            Self::Paren => b'(',
            Self::Bracket => b'[',
        }
    }

    pub(crate) const fn close(self) -> u8 {
        match self {
            Self::Paren => b')',
            Self::Bracket => b']',
        }
    }
}

/// Ordered sequence of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseList {
    kind: ListKind,
    values: Vec<Value>,
}

impl ResponseList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new(kind: ListKind) -> Self {
        Self {
            kind,
            values: Vec::new(),
        }
    }

    /// Creates a parenthesized list from values.
    #[must_use]
    pub const fn from_values(values: Vec<Value>) -> Self {
        Self {
            kind: ListKind::Paren,
            values,
        }
    }

    /// Delimiters of this list.
    #[must_use]
    pub const fn kind(&self) -> ListKind {
        self.kind
    }

    /// Appends a value.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Number of values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// String at `index`.
    #[must_use]
    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Number at `index`.
    #[must_use]
    pub fn get_number(&self, index: usize) -> Option<u64> {
        self.get(index).and_then(Value::as_number)
    }

    /// Nested list at `index`.
    #[must_use]
    pub fn get_list(&self, index: usize) -> Option<&ResponseList> {
        self.get(index).and_then(Value::as_list)
    }

    /// Returns true if the value at `index` is a list.
    #[must_use]
    pub fn is_list(&self, index: usize) -> bool {
        self.get_list(index).is_some()
    }

    /// Returns true if the value at `index` is a scalar.
    #[must_use]
    pub fn is_scalar(&self, index: usize) -> bool {
        self.get(index).is_some_and(Value::is_scalar)
    }

    /// Returns true if the value at `index` is a string equal to `s`, ignoring case.
    #[must_use]
    pub fn eq_at(&self, index: usize, s: &str) -> bool {
        self.get(index).is_some_and(|value| value.eq_ignore_case(s))
    }

    /// Iterates over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Keyed lookup over `[KEY, VALUE, KEY, VALUE, ...]`.
    ///
    /// Returns the element following the first string equal to `key`. The
    /// comparison is case-sensitive.
    #[must_use]
    pub fn get_keyed_value(&self, key: &str) -> Option<&Value> {
        self.values
            .windows(2)
            .find(|pair| pair[0].as_str() == Some(key))
            .map(|pair| &pair[1])
    }

    /// Index of the first string equal to `key`.
    pub fn key_index(&self, key: &str) -> Result<usize> {
        self.values
            .iter()
            .position(|value| value.as_str() == Some(key))
            .ok_or_else(|| Error::Protocol(format!("key {key} not found in list")))
    }
}

impl<'a> IntoIterator for &'a ResponseList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for ResponseList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.kind.open()))?;
        write_joined(f, &self.values)?;
        write!(f, "{}", char::from(self.kind.close()))
    }
}

/// Who a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Completion of the command with this tag.
    Tagged(String),
    /// Server data (`*`).
    Untagged,
    /// Continuation request (`+`).
    Continuation,
}

/// One logical server response.
///
/// The tag is fixed when the response is created; nested lists never carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    kind: ResponseKind,
    values: ResponseList,
}

impl Response {
    /// Creates a tagged response.
    #[must_use]
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::with_kind(ResponseKind::Tagged(tag.into()))
    }

    /// Creates an untagged response.
    #[must_use]
    pub const fn untagged() -> Self {
        Self::with_kind(ResponseKind::Untagged)
    }

    /// Creates a continuation request carrying `text`.
    #[must_use]
    pub fn continuation(text: String) -> Self {
        let mut response = Self::with_kind(ResponseKind::Continuation);
        response.push(Value::String(text));
        response
    }

    const fn with_kind(kind: ResponseKind) -> Self {
        Self {
            kind,
            values: ResponseList::new(ListKind::Paren),
        }
    }

    /// Appends a top-level value.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Who the response belongs to.
    #[must_use]
    pub const fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    /// The command tag for tagged responses.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            ResponseKind::Tagged(tag) => Some(tag),
            _ => None,
        }
    }

    /// Returns true for tagged completions.
    #[must_use]
    pub const fn is_tagged(&self) -> bool {
        matches!(self.kind, ResponseKind::Tagged(_))
    }

    /// Returns true for untagged data.
    #[must_use]
    pub const fn is_untagged(&self) -> bool {
        matches!(self.kind, ResponseKind::Untagged)
    }

    /// Returns true for continuation requests.
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        matches!(self.kind, ResponseKind::Continuation)
    }

    /// The top-level values.
    #[must_use]
    pub const fn values(&self) -> &ResponseList {
        &self.values
    }

    /// Status keyword if the response is a status response.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        if self.is_continuation() {
            return None;
        }
        self.values.get_str(0).and_then(Status::parse)
    }

    /// Bracketed response code list of a status response.
    #[must_use]
    pub fn code(&self) -> Option<&ResponseList> {
        self.status()?;
        self.values
            .get_list(1)
            .filter(|list| list.kind() == ListKind::Bracket)
    }

    /// Free text of a status response.
    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.status()?;
        let index = if self.code().is_some() { 2 } else { 1 };
        self.values.get_str(index)
    }

    /// Text of a continuation request.
    #[must_use]
    pub fn continuation_text(&self) -> Option<&str> {
        if self.is_continuation() {
            self.values.get_str(0)
        } else {
            None
        }
    }

    /// Message number of `* <n> <KEYWORD> ...` data, e.g. `EXISTS` or `FETCH`.
    #[must_use]
    pub fn numbered(&self, keyword: &str) -> Option<u64> {
        if self.is_untagged() && self.values.eq_at(1, keyword) {
            self.values.get_number(0)
        } else {
            None
        }
    }
}

impl Deref for Response {
    type Target = ResponseList;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResponseKind::Tagged(tag) => write!(f, "{tag} ")?,
            ResponseKind::Untagged => f.write_str("* ")?,
            ResponseKind::Continuation => {
                f.write_str("+ ")?;
                return f.write_str(self.continuation_text().unwrap_or_default());
            }
        }
        write_joined(f, &self.values.values)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
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

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_from_atom() {
        assert_eq!(Value::from_atom(b"123".to_vec()), Value::Number(123));
        assert_eq!(Value::from_atom(b"12a".to_vec()), string("12a"));
        assert_eq!(
            Value::from_atom(b"99999999999999999999999".to_vec()),
            string("99999999999999999999999")
        );
    }

    #[test]
    fn test_keyed_lookup_is_case_sensitive() {
        let list = ResponseList::from_values(vec![
            string("UID"),
            Value::Number(42),
            string("FLAGS"),
            Value::List(ResponseList::from_values(vec![string("\\Seen")])),
        ]);

        assert_eq!(list.get_keyed_value("UID"), Some(&Value::Number(42)));
        assert!(list.get_keyed_value("uid").is_none());
        assert_eq!(list.key_index("FLAGS").unwrap(), 2);
        assert!(list.key_index("MODSEQ").is_err());
    }

    #[test]
    fn test_status_accessors() {
        let mut response = Response::tagged("A1");
        response.push(string("NO"));
        let mut code = ResponseList::new(ListKind::Bracket);
        code.push(string("AUTHENTICATIONFAILED"));
        response.push(Value::List(code));
        response.push(string("Invalid credentials"));

        assert_eq!(response.tag(), Some("A1"));
        assert_eq!(response.status(), Some(Status::No));
        assert_eq!(response.code().unwrap().get_str(0), Some("AUTHENTICATIONFAILED"));
        assert_eq!(response.status_text(), Some("Invalid credentials"));
        assert_eq!(
            response.to_string(),
            "A1 NO [AUTHENTICATIONFAILED] \"Invalid credentials\""
        );
    }

    #[test]
    fn test_numbered() {
        let mut response = Response::untagged();
        response.push(Value::Number(23));
        response.push(string("EXISTS"));
        assert_eq!(response.numbered("EXISTS"), Some(23));
        assert_eq!(response.numbered("EXPUNGE"), None);
    }
}
