//! Unsolicited and solicited FETCH data relevant to synchronization.

use crate::parser::{Response, keyword};
use crate::types::Flags;

/// Flag and UID information from a `* <seq> FETCH (...)` line.
///
/// Only the items used for change tracking are extracted: `UID`, `FLAGS`
/// and `MODSEQ`. Body items are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    sequence_number: u64,
    uid: Option<u64>,
    flags: Option<Flags>,
    mod_seq: Option<u64>,
}

impl FetchResponse {
    /// Parses a FETCH line; returns `None` for any other response.
    #[must_use]
    pub fn parse(response: &Response) -> Option<Self> {
        let sequence_number = response.numbered(keyword::FETCH)?;
        let items = response.get_list(2)?;

        let uid = items
            .get_keyed_value(keyword::UID)
            .and_then(|value| value.as_number());
        let flags = items
            .get_keyed_value(keyword::FLAGS)
            .and_then(|value| value.as_list())
            .map(Flags::from_list);
        let mod_seq = items
            .get_keyed_value(keyword::MODSEQ)
            .and_then(|value| value.as_list())
            .and_then(|list| list.get_number(0));

        Some(Self {
            sequence_number,
            uid,
            flags,
            mod_seq,
        })
    }

    /// Message sequence number.
    #[must_use]
    pub const fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// UID, if the server included it.
    #[must_use]
    pub const fn uid(&self) -> Option<u64> {
        self.uid
    }

    /// Current flags, if included.
    #[must_use]
    pub const fn flags(&self) -> Option<&Flags> {
        self.flags.as_ref()
    }

    /// Modification sequence (CONDSTORE), if included.
    #[must_use]
    pub const fn mod_seq(&self) -> Option<u64> {
        self.mod_seq
    }

    /// Consumes the response and returns its flags.
    #[must_use]
    pub fn into_flags(self) -> Option<Flags> {
        self.flags
    }
}
