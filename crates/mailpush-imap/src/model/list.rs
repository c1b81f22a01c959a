//! LIST and LSUB data.

use crate::parser::{Response, keyword};

/// One mailbox from a LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    attributes: Vec<String>,
    delimiter: Option<String>,
    name: String,
}

impl ListResponse {
    /// Parses every `* LIST` line in `responses`.
    #[must_use]
    pub fn parse_list(responses: &[Response]) -> Vec<Self> {
        Self::parse_all(responses, keyword::LIST)
    }

    /// Parses every `* LSUB` line in `responses`.
    #[must_use]
    pub fn parse_lsub(responses: &[Response]) -> Vec<Self> {
        Self::parse_all(responses, keyword::LSUB)
    }

    fn parse_all(responses: &[Response], command: &str) -> Vec<Self> {
        responses
            .iter()
            .filter_map(|response| Self::parse(response, command))
            .collect()
    }

    /// Parses a single `* <command> (attributes) delimiter name` line.
    #[must_use]
    pub fn parse(response: &Response, command: &str) -> Option<Self> {
        if !response.is_untagged() || response.len() < 4 || !response.eq_at(0, command) {
            return None;
        }

        let mut attributes = Vec::new();
        for attribute in response.get_list(1)? {
            attributes.push(attribute.as_str()?.to_string());
        }

        let delimiter = response.get(2)?;
        let delimiter = if delimiter.is_nil() {
            None
        } else {
            Some(delimiter.as_str()?.to_string())
        };

        let name = response.get(3)?.text()?.into_owned();

        Some(Self {
            attributes,
            delimiter,
            name,
        })
    }

    /// Mailbox attributes such as `\Noselect`.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns true if the attribute is present, ignoring case.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// Hierarchy delimiter; `None` for a flat namespace (`NIL`).
    #[must_use]
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// Mailbox name as sent by the server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
