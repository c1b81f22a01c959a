//! Message flags.

use std::fmt;

use crate::parser::ResponseList;

/// A message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// `\*` in PERMANENTFLAGS: new keywords may be created.
    CreateKeywords,
    /// Keyword flag such as `$Forwarded`.
    Keyword(String),
}

impl Flag {
    /// Parses a flag, ignoring the case of system flags.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            "\\*" => Self::CreateKeywords,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::CreateKeywords => "\\*",
            Self::Keyword(s) => s,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of flags as found in a `FLAGS` list or `PERMANENTFLAGS` code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { flags: Vec::new() }
    }

    /// Reads the string members of a parenthesized flag list.
    ///
    /// Non-string members are skipped.
    #[must_use]
    pub fn from_list(list: &ResponseList) -> Self {
        let mut flags = Self::new();
        for flag in list.iter().filter_map(|value| value.as_str()) {
            flags.insert(Flag::parse(flag));
        }
        flags
    }

    /// Adds a flag unless already present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the server allows creating new keywords (`\*`).
    #[must_use]
    pub fn allows_new_keywords(&self) -> bool {
        self.contains(&Flag::CreateKeywords)
    }

    /// Iterates over the flags in server order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = self.flags.iter().map(Flag::as_str).collect();
        write!(f, "({})", flags.join(" "))
    }
}
