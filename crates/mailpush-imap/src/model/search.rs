//! SEARCH data.

use crate::parser::{Response, Value, keyword};

/// Ids returned by one or more SEARCH responses, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    ids: Vec<u64>,
}

impl SearchResponse {
    /// Collects the numbers of every `* SEARCH` line in `responses`.
    ///
    /// Unrelated lines are ignored and nested lists such as `(MODSEQ n)` are
    /// skipped. A token that is not a number discards the whole result.
    #[must_use]
    pub fn parse(responses: &[Response]) -> Option<Self> {
        let mut ids = Vec::new();
        for response in responses {
            if !response.is_untagged() || !response.eq_at(0, keyword::SEARCH) {
                continue;
            }
            for value in response.iter().skip(1) {
                match value {
                    Value::List(_) => {}
                    value => ids.push(value.as_number()?),
                }
            }
        }
        Some(Self { ids })
    }

    /// Appends the ids of another (continued) search.
    pub fn merge(&mut self, other: Self) {
        self.ids.extend(other.ids);
    }

    /// The ids in the order the server sent them.
    #[must_use]
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Consumes the response and returns the ids.
    #[must_use]
    pub fn into_ids(self) -> Vec<u64> {
        self.ids
    }
}
