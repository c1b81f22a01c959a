//! # mailpush-imap
//!
//! An IMAP4rev1 (RFC 3501) client engine for mail synchronization and push.
//!
//! ## Features
//!
//! - **Streaming response parser**: reads one response at a time straight
//!   from the socket, literals included, and can hand large literals to a
//!   caller-supplied sink instead of buffering them
//! - **Typed response models**: CAPABILITY, LIST/LSUB, NAMESPACE, SEARCH,
//!   SELECT/EXAMINE, COPYUID and QRESYNC data
//! - **Command splitting**: bulk UID commands are compacted into ranges and
//!   split to a line-length budget
//! - **Connection state machine**: greeting, STARTTLS, SASL (PLAIN, CRAM-MD5,
//!   XOAUTH2/OAUTHBEARER, EXTERNAL), COMPRESS=DEFLATE, ID and namespace
//!   discovery
//! - **Push**: one IDLE connection per watched folder, reporting changes as
//!   events
//! - **TLS via rustls**: Secure connections without OpenSSL dependency
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailpush_imap::connection::{Connection, ImapSettings};
//!
//! # async fn run() -> mailpush_imap::Result<()> {
//! let settings = ImapSettings::builder("imap.example.com")
//!     .username("user@example.com")
//!     .password("password")
//!     .build();
//!
//! let mut connection = Connection::tcp(settings)?;
//! connection.open().await?;
//!
//! let inbox = connection.select("INBOX", None).await?;
//! println!("{:?} messages", inbox.exists());
//!
//! let unseen = connection.uid_search("UNSEEN").await?;
//! println!("unseen: {unseen:?}");
//!
//! connection.logout().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: Streaming response parser
//! - [`model`]: Typed views over parsed responses
//! - [`command`]: Command builders, id sets and the splitter
//! - [`connection`]: Settings, transports and the connection state machine
//! - [`push`]: IDLE-based push
//! - [`sasl`]: SASL payloads
//! - [`types`]: Capabilities, flags, status keywords and id sequences

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod model;
pub mod oauth;
pub mod parser;
pub mod push;
pub mod sasl;
pub mod types;

pub use command::{Command, IdSelection, IdSet, SequenceCommand, TagGenerator};
pub use connection::{
    AuthType, Connection, ConnectionFactory, ConnectionPool, ConnectionState, ImapSettings,
    PushConfig, Security,
};
pub use error::{Error, NegativeResponse, Result};
pub use oauth::OAuth2TokenProvider;
pub use parser::{Response, ResponseList, ResponseParser, Value};
pub use push::{PushEvent, PushEventKind, Pusher};
pub use types::{Capabilities, Flag, Flags, Status};

/// IMAP protocol version implemented.
pub const IMAP_VERSION: &str = "IMAP4rev1";
