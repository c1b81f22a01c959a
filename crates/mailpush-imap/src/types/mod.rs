//! Core IMAP types.
//!
//! Capability sets, status keywords, flags and the id-sequence grammar shared by
//! the parser, the response models and the command builders.

pub mod capability;
mod flags;
pub mod sequence;
mod status;

pub use capability::Capabilities;
pub use flags::{Flag, Flags};
pub use status::Status;
