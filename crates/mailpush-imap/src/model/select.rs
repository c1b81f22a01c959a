//! SELECT and EXAMINE results.

use crate::error::{Error, Result};
use crate::parser::{Response, keyword};
use crate::types::{Flags, Status};

use super::QresyncParamResponse;

/// Access mode granted by the server for a selected mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `[READ-WRITE]`.
    ReadWrite,
    /// `[READ-ONLY]`.
    ReadOnly,
}

/// Mailbox status gathered from the responses to SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOrExamineResponse {
    open_mode: Option<OpenMode>,
    exists: Option<u64>,
    uid_validity: Option<u64>,
    uid_next: Option<u64>,
    highest_mod_seq: Option<u64>,
    no_mod_seq: bool,
    flags: Option<Flags>,
    permanent_flags: Option<Flags>,
    qresync: Option<QresyncParamResponse>,
}

impl SelectOrExamineResponse {
    /// Interprets the responses of a completed SELECT or EXAMINE.
    ///
    /// The open mode is taken from the tagged `OK` completion. When
    /// `qresync_enabled` is set the changes reported by the server are
    /// collected as well.
    #[must_use]
    pub fn parse(responses: &[Response], qresync_enabled: bool) -> Self {
        let mut result = Self::default();

        for response in responses {
            if response.is_tagged() {
                if response.status() == Some(Status::Ok) {
                    result.open_mode = Self::open_mode_of(response);
                }
                continue;
            }

            if let Some(count) = response.numbered(keyword::EXISTS) {
                result.exists = Some(count);
            } else if response.eq_at(0, keyword::FLAGS) {
                result.flags = response.get_list(1).map(Flags::from_list);
            } else if response.status() == Some(Status::Ok) {
                result.apply_code(response);
            }
        }

        if qresync_enabled {
            result.qresync = Some(QresyncParamResponse::parse(responses));
        }
        result
    }

    fn open_mode_of(response: &Response) -> Option<OpenMode> {
        let code = response.code()?;
        if code.eq_at(0, keyword::READ_WRITE) {
            Some(OpenMode::ReadWrite)
        } else if code.eq_at(0, keyword::READ_ONLY) {
            Some(OpenMode::ReadOnly)
        } else {
            None
        }
    }

    fn apply_code(&mut self, response: &Response) {
        let Some(code) = response.code() else {
            return;
        };
        if code.eq_at(0, keyword::UIDVALIDITY) {
            self.uid_validity = code.get_number(1);
        } else if code.eq_at(0, keyword::UIDNEXT) {
            self.uid_next = code.get_number(1);
        } else if code.eq_at(0, keyword::HIGHESTMODSEQ) {
            self.highest_mod_seq = code.get_number(1);
        } else if code.eq_at(0, keyword::NOMODSEQ) {
            self.no_mod_seq = true;
        } else if code.eq_at(0, keyword::PERMANENTFLAGS) {
            self.permanent_flags = code.get_list(1).map(Flags::from_list);
        }
    }

    /// Returns true if the completion carried `[READ-WRITE]` or `[READ-ONLY]`.
    #[must_use]
    pub const fn has_open_mode(&self) -> bool {
        self.open_mode.is_some()
    }

    /// Access mode of the mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the server did not send one.
    pub fn open_mode(&self) -> Result<OpenMode> {
        self.open_mode
            .ok_or_else(|| Error::InvalidState("no READ-WRITE or READ-ONLY code in response".into()))
    }

    /// Number of messages (`* n EXISTS`).
    #[must_use]
    pub const fn exists(&self) -> Option<u64> {
        self.exists
    }

    /// `UIDVALIDITY` of the mailbox.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<u64> {
        self.uid_validity
    }

    /// Predicted next UID.
    #[must_use]
    pub const fn uid_next(&self) -> Option<u64> {
        self.uid_next
    }

    /// `HIGHESTMODSEQ`, when the mailbox supports mod-sequences.
    #[must_use]
    pub const fn highest_mod_seq(&self) -> Option<u64> {
        self.highest_mod_seq
    }

    /// True if the server sent `[NOMODSEQ]`.
    #[must_use]
    pub const fn no_mod_seq(&self) -> bool {
        self.no_mod_seq
    }

    /// Flags defined in the mailbox.
    #[must_use]
    pub const fn flags(&self) -> Option<&Flags> {
        self.flags.as_ref()
    }

    /// Flags the client may change permanently.
    #[must_use]
    pub const fn permanent_flags(&self) -> Option<&Flags> {
        self.permanent_flags.as_ref()
    }

    /// Changes reported through QRESYNC, if it was requested.
    #[must_use]
    pub const fn qresync(&self) -> Option<&QresyncParamResponse> {
        self.qresync.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::test_support::responses;

    #[test]
    fn select_read_write() {
        let list = responses(&[
            "* 172 EXISTS",
            "* 1 RECENT",
            "* OK [UNSEEN 12] Message 12 is first unseen",
            "* OK [UIDVALIDITY 3857529045] UIDs valid",
            "* OK [UIDNEXT 4392] Predicted next UID",
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)",
            "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited",
            "* OK [HIGHESTMODSEQ 715194045007]",
            "A142 OK [READ-WRITE] SELECT completed",
        ]);
        let select = SelectOrExamineResponse::parse(&list, false);
        assert_eq!(select.open_mode().unwrap(), OpenMode::ReadWrite);
        assert_eq!(select.exists(), Some(172));
        assert_eq!(select.uid_validity(), Some(3_857_529_045));
        assert_eq!(select.uid_next(), Some(4392));
        assert_eq!(select.highest_mod_seq(), Some(715_194_045_007));
        assert_eq!(select.flags().unwrap().len(), 5);
        assert!(select.permanent_flags().unwrap().allows_new_keywords());
        assert!(select.qresync().is_none());
    }

    #[test]
    fn examine_read_only() {
        let list = responses(&[
            "* 3 EXISTS",
            "* OK [NOMODSEQ] Sorry",
            "A3 OK [READ-ONLY] EXAMINE completed",
        ]);
        let select = SelectOrExamineResponse::parse(&list, false);
        assert_eq!(select.open_mode().unwrap(), OpenMode::ReadOnly);
        assert!(select.no_mod_seq());
    }

    #[test]
    fn missing_open_mode() {
        let list = responses(&["* 3 EXISTS", "A3 OK done"]);
        let select = SelectOrExamineResponse::parse(&list, false);
        assert!(!select.has_open_mode());
        assert!(matches!(select.open_mode(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn qresync_changes() {
        let list = responses(&[
            "* OK [UIDVALIDITY 67890007]",
            "* VANISHED (EARLIER) 41,43:45",
            "* 49 FETCH (UID 117 FLAGS (\\Seen) MODSEQ (90060115194045001))",
            "A02 OK [READ-WRITE] done",
        ]);
        let select = SelectOrExamineResponse::parse(&list, true);
        let changes = select.qresync().unwrap();
        assert_eq!(changes.expunged_uids(), &[41, 43, 44, 45]);
        assert_eq!(changes.modified_messages().len(), 1);
    }
}
