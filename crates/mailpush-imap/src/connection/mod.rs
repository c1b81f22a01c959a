//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - Account settings and push tuning
//! - The [`Connector`] seam and its TCP/TLS implementation
//! - COMPRESS=DEFLATE framing
//! - Choice of authentication mechanism
//! - The [`Connection`] state machine
//! - A small connection pool

mod auth;
mod client;
mod compress;
mod config;
mod framed;
mod pool;
mod stream;

pub use auth::{AuthPlan, OAuthMechanism, plan_authentication};
pub use client::{Connection, ConnectionState, UntaggedHandler};
pub use compress::{DeflateStream, Transport};
pub use config::{
    AuthType, ClientInfo, ImapSettings, ImapSettingsBuilder, PushConfig, Security,
};
pub use framed::FramedStream;
pub use pool::{ConnectionFactory, ConnectionPool};
pub use stream::{Connector, ImapStream, TcpConnector, create_tls_connector};
