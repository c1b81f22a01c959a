//! QRESYNC support (RFC 7162).
//!
//! A client that remembers `UIDVALIDITY` and `HIGHESTMODSEQ` of a mailbox can
//! pass them to SELECT or EXAMINE and receive only what changed since then:
//! `VANISHED (EARLIER)` for expunged UIDs and FETCH lines with `MODSEQ` for
//! messages whose flags changed.

use std::fmt;

use crate::parser::{Response, keyword};
use crate::types::sequence;

use super::FetchResponse;

/// Parameters appended to SELECT or EXAMINE to request a resynchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QresyncParams {
    uid_validity: u64,
    mod_seq: u64,
    known_uids: Option<String>,
}

impl QresyncParams {
    /// Creates minimal parameters.
    #[must_use]
    pub const fn new(uid_validity: u64, mod_seq: u64) -> Self {
        Self {
            uid_validity,
            mod_seq,
            known_uids: None,
        }
    }

    /// Limits VANISHED reporting to a set of known UIDs such as `1:500`.
    #[must_use]
    pub fn with_known_uids(mut self, uids: impl Into<String>) -> Self {
        self.known_uids = Some(uids.into());
        self
    }

    /// Last known `UIDVALIDITY`.
    #[must_use]
    pub const fn uid_validity(&self) -> u64 {
        self.uid_validity
    }

    /// Last known `HIGHESTMODSEQ`.
    #[must_use]
    pub const fn mod_seq(&self) -> u64 {
        self.mod_seq
    }
}

impl fmt::Display for QresyncParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(QRESYNC ({} {}", self.uid_validity, self.mod_seq)?;
        if let Some(uids) = &self.known_uids {
            write!(f, " {uids}")?;
        }
        f.write_str("))")
    }
}

/// A `* VANISHED [(EARLIER)] uid-set` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanishedResponse {
    earlier: bool,
    uids: Vec<u64>,
}

impl VanishedResponse {
    /// Parses a VANISHED line; returns `None` for any other response.
    #[must_use]
    pub fn parse(response: &Response) -> Option<Self> {
        if !response.is_untagged() || !response.eq_at(0, keyword::VANISHED) {
            return None;
        }
        let earlier = response
            .get_list(1)
            .is_some_and(|list| list.eq_at(0, keyword::EARLIER));
        let index = if earlier { 2 } else { 1 };
        let uids = sequence::expand(&response.get(index)?.text()?);
        Some(Self { earlier, uids })
    }

    /// True for `VANISHED (EARLIER)`, sent while resynchronizing.
    #[must_use]
    pub const fn is_earlier(&self) -> bool {
        self.earlier
    }

    /// Expunged UIDs.
    #[must_use]
    pub fn uids(&self) -> &[u64] {
        &self.uids
    }

    /// Consumes the response and returns the UIDs.
    #[must_use]
    pub fn into_uids(self) -> Vec<u64> {
        self.uids
    }
}

/// Changes reported by the server after a QRESYNC SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QresyncParamResponse {
    expunged_uids: Vec<u64>,
    modified_messages: Vec<FetchResponse>,
}

impl QresyncParamResponse {
    /// Collects `VANISHED (EARLIER)` UIDs and FETCH lines carrying a UID and `MODSEQ`.
    #[must_use]
    pub fn parse(responses: &[Response]) -> Self {
        let mut result = Self::default();
        for response in responses {
            if let Some(vanished) = VanishedResponse::parse(response) {
                if vanished.is_earlier() {
                    result.expunged_uids.extend(vanished.into_uids());
                }
            } else if let Some(fetch) = FetchResponse::parse(response) {
                if fetch.uid().is_some() && fetch.mod_seq().is_some() {
                    result.modified_messages.push(fetch);
                }
            }
        }
        result
    }

    /// UIDs expunged since the known `HIGHESTMODSEQ`.
    #[must_use]
    pub fn expunged_uids(&self) -> &[u64] {
        &self.expunged_uids
    }

    /// Messages whose flags changed since the known `HIGHESTMODSEQ`.
    #[must_use]
    pub fn modified_messages(&self) -> &[FetchResponse] {
        &self.modified_messages
    }

    /// Returns true if the server reported nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expunged_uids.is_empty() && self.modified_messages.is_empty()
    }
}
