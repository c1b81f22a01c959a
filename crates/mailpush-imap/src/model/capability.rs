//! CAPABILITY data, either as untagged data or as a response code.

use crate::parser::{Response, ResponseList, keyword};
use crate::types::{Capabilities, Status};

/// Capabilities announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityResponse {
    capabilities: Capabilities,
}

impl CapabilityResponse {
    /// Parses `* OK [CAPABILITY ...]` or `* CAPABILITY ...`.
    ///
    /// Tagged responses, statuses other than `OK` and code lists holding
    /// nested lists yield `None`.
    #[must_use]
    pub fn parse(response: &Response) -> Option<Self> {
        if !response.is_untagged() {
            return None;
        }
        match response.status() {
            Some(Status::Ok) => Self::from_list(response.code()?),
            Some(_) => None,
            None => Self::from_list(response.values()),
        }
    }

    /// Returns the first capability data found in `responses`.
    #[must_use]
    pub fn parse_all(responses: &[Response]) -> Option<Self> {
        responses.iter().find_map(Self::parse)
    }

    /// Reads a `[CAPABILITY ...]` code from a successful status response of
    /// any tag, as sent in greetings and after authentication.
    #[must_use]
    pub fn from_code(response: &Response) -> Option<Self> {
        if !response.status()?.is_ok() {
            return None;
        }
        Self::from_list(response.code()?)
    }

    fn from_list(list: &ResponseList) -> Option<Self> {
        if !list.eq_at(0, keyword::CAPABILITY) {
            return None;
        }
        let mut names = Vec::with_capacity(list.len().saturating_sub(1));
        for value in list.iter().skip(1) {
            names.push(value.text()?.into_owned());
        }
        Some(Self {
            capabilities: Capabilities::new(names),
        })
    }

    /// The announced capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Consumes the response and returns the capabilities.
    #[must_use]
    pub fn into_capabilities(self) -> Capabilities {
        self.capabilities
    }
}
