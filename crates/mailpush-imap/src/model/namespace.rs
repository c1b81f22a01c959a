//! NAMESPACE data.

use crate::parser::{Response, keyword};

/// First personal namespace announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceResponse {
    prefix: String,
    hierarchy_delimiter: Option<String>,
}

impl NamespaceResponse {
    /// Returns the first NAMESPACE data found in `responses`.
    #[must_use]
    pub fn parse_all(responses: &[Response]) -> Option<Self> {
        responses.iter().find_map(Self::parse)
    }

    /// Parses `* NAMESPACE (("prefix" "delim") ...) other shared`.
    #[must_use]
    pub fn parse(response: &Response) -> Option<Self> {
        if !response.is_untagged() || response.len() < 4 || !response.eq_at(0, keyword::NAMESPACE)
        {
            return None;
        }

        let personal = response.get_list(1)?.get_list(0)?;
        let prefix = personal.get(0)?.text()?.into_owned();
        let delimiter = personal.get(1)?;
        let hierarchy_delimiter = if delimiter.is_nil() {
            None
        } else {
            Some(delimiter.as_str()?.to_string())
        };

        Some(Self {
            prefix,
            hierarchy_delimiter,
        })
    }

    /// Personal namespace prefix, e.g. `INBOX.`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hierarchy delimiter of the personal namespace.
    #[must_use]
    pub fn hierarchy_delimiter(&self) -> Option<&str> {
        self.hierarchy_delimiter.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::test_support::{response, responses};

    #[test]
    fn personal_namespace() {
        let parsed = NamespaceResponse::parse(&response(
            "* NAMESPACE ((\"INBOX.\" \".\")) NIL ((\"#shared.\" \".\"))",
        ))
        .unwrap();
        assert_eq!(parsed.prefix(), "INBOX.");
        assert_eq!(parsed.hierarchy_delimiter(), Some("."));
    }

    #[test]
    fn empty_prefix_and_nil_delimiter() {
        let list = responses(&["* NAMESPACE ((\"\" NIL)) NIL NIL", "A2 OK done"]);
        let parsed = NamespaceResponse::parse_all(&list).unwrap();
        assert_eq!(parsed.prefix(), "");
        assert_eq!(parsed.hierarchy_delimiter(), None);
    }

    #[test]
    fn no_personal_namespace() {
        assert!(NamespaceResponse::parse(&response("* NAMESPACE NIL NIL NIL")).is_none());
        assert!(NamespaceResponse::parse(&response("* NAMESPACE ((\"\" \"/\"))")).is_none());
    }
}
