//! Typed views over parsed responses.
//!
//! Every model is built by a pure `parse` function that returns `None` when the
//! response is not of its kind or is malformed, so callers can scan a mixed
//! stream of responses and keep the first match.

mod capability;
mod copy_uid;
mod fetch;
mod list;
mod namespace;
mod qresync;
pub mod response_code;
mod search;
mod select;

pub use capability::CapabilityResponse;
pub use copy_uid::CopyUidResponse;
pub use fetch::FetchResponse;
pub use list::ListResponse;
pub use namespace::NamespaceResponse;
pub use qresync::{QresyncParamResponse, QresyncParams, VanishedResponse};
pub use search::SearchResponse;
pub use select::{OpenMode, SelectOrExamineResponse};
