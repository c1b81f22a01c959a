//! COPYUID response code (UIDPLUS).

use std::collections::BTreeMap;

use crate::parser::{Response, Value, keyword};
use crate::types::{Status, sequence};

/// Mapping of source UIDs to the UIDs of the copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUidResponse {
    uid_mapping: BTreeMap<u64, u64>,
}

impl CopyUidResponse {
    /// Parses `tag OK [COPYUID validity source-set dest-set] text`.
    ///
    /// The two sets are expanded and paired by position. Untagged or
    /// non-OK responses, short codes and sets of different length yield `None`.
    #[must_use]
    pub fn parse(response: &Response) -> Option<Self> {
        if !response.is_tagged() || response.status() != Some(Status::Ok) {
            return None;
        }
        let code = response.code()?;
        if code.len() < 4 || !code.eq_at(0, keyword::COPYUID) {
            return None;
        }

        let scalar = |index| code.get(index).filter(|v: &&Value| v.is_scalar());
        scalar(1)?;
        let source = sequence::expand(&scalar(2)?.text()?);
        let destination = sequence::expand(&scalar(3)?.text()?);

        if source.is_empty() || source.len() != destination.len() {
            return None;
        }

        Some(Self {
            uid_mapping: source.into_iter().zip(destination).collect(),
        })
    }

    /// Source UID to destination UID.
    #[must_use]
    pub const fn uid_mapping(&self) -> &BTreeMap<u64, u64> {
        &self.uid_mapping
    }

    /// Destination UID of a copied message.
    #[must_use]
    pub fn destination_of(&self, source_uid: u64) -> Option<u64> {
        self.uid_mapping.get(&source_uid).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::test_support::response;

    #[test]
    fn zips_expanded_ranges() {
        let parsed =
            CopyUidResponse::parse(&response("x OK [COPYUID 1 1,3:5 7:10] Success")).unwrap();
        let expected: BTreeMap<u64, u64> = [(1, 7), (3, 8), (4, 9), (5, 10)].into_iter().collect();
        assert_eq!(parsed.uid_mapping(), &expected);
    }

    #[test]
    fn descending_range_still_aligns() {
        let parsed = CopyUidResponse::parse(&response("x OK [COPYUID 1 9:7 1:3] ok")).unwrap();
        assert_eq!(parsed.destination_of(9), Some(1));
        assert_eq!(parsed.destination_of(7), Some(3));
    }

    #[test]
    fn rejects_malformed() {
        assert!(CopyUidResponse::parse(&response("x OK [COPYUID B 1 1,2] Success")).is_none());
        assert!(CopyUidResponse::parse(&response("* OK [COPYUID 1 1 2] Success")).is_none());
        assert!(CopyUidResponse::parse(&response("x NO [COPYUID 1 1 2] Success")).is_none());
        assert!(CopyUidResponse::parse(&response("x OK Success")).is_none());
        assert!(CopyUidResponse::parse(&response("x OK [COPYUID 1 1] Success")).is_none());
        assert!(CopyUidResponse::parse(&response("x OK [COPYUID 1 (1) 2] Success")).is_none());
        assert!(CopyUidResponse::parse(&response("x OK [COPYUID 1 a b] Success")).is_none());
    }

    #[test]
    fn huge_ranges_are_ignored() {
        let code = "x OK [COPYUID 1 1:4294967295 1:4294967295] Success";
        assert!(CopyUidResponse::parse(&response(code)).is_none());
    }

    #[test]
    fn non_numeric_validity_is_accepted() {
        let parsed = CopyUidResponse::parse(&response("x OK [COPYUID B 4 5] ok")).unwrap();
        assert_eq!(parsed.destination_of(4), Some(5));
    }
}
