//! IMAP command builder.
//!
//! [`Command`] covers the commands the engine issues itself. Bulk operations
//! on message ids go through [`SequenceCommand`], which compacts ids with
//! [`IdSet::optimize_groupings`] and splits oversized lines.

mod id_set;
mod serialize;
mod splitter;
mod tag_generator;

use crate::model::QresyncParams;

pub use id_set::{ContiguousIdGroup, GroupEnd, IdSelection, IdSet};
pub use serialize::encode_string;
pub use splitter::{DEFAULT_MAX_COMMAND_LENGTH, SequenceCommand};
pub use tag_generator::TagGenerator;

use serialize::{write_astring, write_quoted};

/// Command names.
pub mod names {
    /// `CAPABILITY`
    pub const CAPABILITY: &str = "CAPABILITY";
    /// `NOOP`
    pub const NOOP: &str = "NOOP";
    /// `LOGOUT`
    pub const LOGOUT: &str = "LOGOUT";
    /// `STARTTLS`
    pub const STARTTLS: &str = "STARTTLS";
    /// `LOGIN`
    pub const LOGIN: &str = "LOGIN";
    /// `AUTHENTICATE`
    pub const AUTHENTICATE: &str = "AUTHENTICATE";
    /// `ID`
    pub const ID: &str = "ID";
    /// `ENABLE`
    pub const ENABLE: &str = "ENABLE";
    /// `SELECT`
    pub const SELECT: &str = "SELECT";
    /// `EXAMINE`
    pub const EXAMINE: &str = "EXAMINE";
    /// `LIST`
    pub const LIST: &str = "LIST";
    /// `NAMESPACE`
    pub const NAMESPACE: &str = "NAMESPACE";
    /// `UID SEARCH`
    pub const UID_SEARCH: &str = "UID SEARCH";
    /// `UID STORE`
    pub const UID_STORE: &str = "UID STORE";
    /// `UID FETCH`
    pub const UID_FETCH: &str = "UID FETCH";
    /// `UID COPY`
    pub const UID_COPY: &str = "UID COPY";
    /// `UID MOVE`
    pub const UID_MOVE: &str = "UID MOVE";
    /// `UID EXPUNGE`
    pub const UID_EXPUNGE: &str = "UID EXPUNGE";
    /// `COMPRESS DEFLATE`
    pub const COMPRESS_DEFLATE: &str = "COMPRESS DEFLATE";
    /// `IDLE`
    pub const IDLE: &str = "IDLE";
    /// `DONE`
    pub const DONE: &str = "DONE";
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// SASL mechanism.
        mechanism: String,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// ID command (RFC 2971).
    Id {
        /// Field-value pairs; `None` sends `ID NIL`.
        parameters: Option<Vec<(String, String)>>,
    },
    /// ENABLE command.
    Enable {
        /// Capabilities to enable.
        capabilities: Vec<String>,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
        /// QRESYNC parameters.
        qresync: Option<QresyncParams>,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: String,
        /// QRESYNC parameters.
        qresync: Option<QresyncParams>,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// NAMESPACE command.
    Namespace,
    /// UID SEARCH with pre-rendered criteria such as `UID 10:*`.
    UidSearch {
        /// Search criteria.
        criteria: String,
    },
    /// COMPRESS DEFLATE command (RFC 4978).
    CompressDeflate,
    /// IDLE command.
    Idle,
    /// DONE (to end IDLE).
    Done,
    /// Any other command, sent verbatim after the tag.
    Raw(String),
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        // DONE doesn't get a tag (it's sent during IDLE)
        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(names::CAPABILITY.as_bytes()),
            Self::Noop => buf.extend_from_slice(names::NOOP.as_bytes()),
            Self::Logout => buf.extend_from_slice(names::LOGOUT.as_bytes()),
            Self::StartTls => buf.extend_from_slice(names::STARTTLS.as_bytes()),
            Self::Namespace => buf.extend_from_slice(names::NAMESPACE.as_bytes()),
            Self::CompressDeflate => buf.extend_from_slice(names::COMPRESS_DEFLATE.as_bytes()),
            Self::Idle => buf.extend_from_slice(names::IDLE.as_bytes()),
            Self::Done => buf.extend_from_slice(names::DONE.as_bytes()),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "=".
                    if resp.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(resp.as_bytes());
                    }
                }
            }

            Self::Id { parameters } => {
                buf.extend_from_slice(b"ID ");
                if let Some(params) = parameters {
                    buf.push(b'(');
                    for (i, (key, value)) in params.iter().enumerate() {
                        if i > 0 {
                            buf.push(b' ');
                        }
                        write_quoted(&mut buf, key);
                        buf.push(b' ');
                        write_quoted(&mut buf, value);
                    }
                    buf.push(b')');
                } else {
                    buf.extend_from_slice(b"NIL");
                }
            }

            Self::Enable { capabilities } => {
                buf.extend_from_slice(names::ENABLE.as_bytes());
                for cap in capabilities {
                    buf.push(b' ');
                    buf.extend_from_slice(cap.as_bytes());
                }
            }

            Self::Select { mailbox, qresync } | Self::Examine { mailbox, qresync } => {
                let name = if matches!(self, Self::Select { .. }) {
                    names::SELECT
                } else {
                    names::EXAMINE
                };
                buf.extend_from_slice(name.as_bytes());
                buf.push(b' ');
                write_astring(&mut buf, mailbox);
                if let Some(params) = qresync {
                    buf.push(b' ');
                    buf.extend_from_slice(params.to_string().as_bytes());
                }
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::UidSearch { criteria } => {
                buf.extend_from_slice(names::UID_SEARCH.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(criteria.as_bytes());
            }

            Self::Raw(line) => buf.extend_from_slice(line.as_bytes()),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns true if the command carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Self::Login { .. }
                | Self::Authenticate {
                    initial_response: Some(_),
                    ..
                }
        )
    }

    /// Text used in logs and errors; credentials are masked.
    #[must_use]
    pub fn log_text(&self) -> String {
        match self {
            Self::Login { .. } => format!("{} [sensitive]", names::LOGIN),
            Self::Authenticate {
                mechanism,
                initial_response: Some(_),
            } => format!("{} {mechanism} [sensitive]", names::AUTHENTICATE),
            _ => {
                let line = self.serialize("");
                String::from_utf8_lossy(&line)
                    .trim_start()
                    .trim_end_matches("\r\n")
                    .to_string()
            }
        }
    }
}
