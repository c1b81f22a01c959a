//! IMAP connection state machine.
//!
//! A [`Connection`] owns one socket and walks it through
//!
//! - `Unconnected` → `Connected`: socket open, greeting read
//! - `CapabilityKnown`: capabilities from the greeting or a CAPABILITY command
//! - `TlsNegotiated`: optional STARTTLS upgrade
//! - `Authenticated`: credentials accepted
//! - `CompressionEnabled`: optional COMPRESS=DEFLATE
//! - `Ready`: namespace and delimiter known
//!
//! Any transport failure moves it to `Closed`, from which it never returns.

#![allow(clippy::missing_errors_doc)]

mod authenticate;
mod mailbox;
mod open;
mod state;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use self::state::ConnectionState;
use super::compress::Transport;
use super::config::ImapSettings;
use super::framed::FramedStream;
use super::stream::{Connector, TcpConnector};
use crate::command::{Command, TagGenerator};
use crate::error::NegativeResponse;
use crate::oauth::OAuth2TokenProvider;
use crate::parser::{LiteralCallback, Response, keyword};
use crate::types::{Capabilities, Status};
use crate::{Error, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Receives untagged data and continuation requests while a command runs.
pub trait UntaggedHandler: Send {
    /// Called for every untagged response before the completion arrives.
    fn handle_untagged(&mut self, response: &Response) {
        let _ = response;
    }

    /// Produces the line sent back for a `+` continuation request, CRLF
    /// included.
    fn continuation_reply(&mut self, response: &Response) -> Result<Vec<u8>> {
        Err(Error::Protocol(format!(
            "unexpected continuation request: {response}"
        )))
    }
}

impl UntaggedHandler for () {}

/// An IMAP connection.
pub struct Connection<C: Connector = TcpConnector> {
    settings: ImapSettings,
    connector: Arc<C>,
    token_provider: Option<Arc<dyn OAuth2TokenProvider>>,
    stream: Option<FramedStream<Transport<C::Stream>>>,
    tags: TagGenerator,
    capabilities: Option<Capabilities>,
    state: ConnectionState,
    log_id: String,
    path_prefix: Option<String>,
    path_delimiter: Option<String>,
    qresync_enabled: bool,
    idle_tag: Option<String>,
}

impl<C: Connector> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("log_id", &self.log_id)
            .field("state", &self.state)
            .field("host", &self.settings.host)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Connection<TcpConnector> {
    /// Creates a connection that will dial the server over TCP.
    pub fn tcp(settings: ImapSettings) -> Result<Self> {
        Ok(Self::new(settings, Arc::new(TcpConnector::new()?)))
    }
}

impl<C: Connector> Connection<C> {
    /// Creates an unopened connection.
    #[must_use]
    pub fn new(settings: ImapSettings, connector: Arc<C>) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            path_prefix: settings.path_prefix.clone(),
            path_delimiter: settings.path_delimiter.clone(),
            settings,
            connector,
            token_provider: None,
            stream: None,
            tags: TagGenerator::default(),
            capabilities: None,
            state: ConnectionState::Unconnected,
            log_id: format!("conn{id}"),
            qresync_enabled: false,
            idle_tag: None,
        }
    }

    /// Sets the token provider used for `OAuth2` authentication.
    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn OAuth2TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true while the socket is held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Identifier used in log lines, e.g. `conn7`.
    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// The settings this connection was created with.
    #[must_use]
    pub const fn settings(&self) -> &ImapSettings {
        &self.settings
    }

    /// Latest capabilities advertised by the server.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Returns true if the server advertised `name`.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|capabilities| capabilities.contains(name))
    }

    /// Personal namespace prefix, known once the connection is ready.
    #[must_use]
    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    /// Hierarchy delimiter, if the server reported one.
    #[must_use]
    pub fn path_delimiter(&self) -> Option<&str> {
        self.path_delimiter.as_deref()
    }

    /// Returns true if COMPRESS=DEFLATE is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.get_ref().is_compressed())
    }

    /// Returns true once `ENABLE QRESYNC` succeeded.
    #[must_use]
    pub const fn is_qresync_enabled(&self) -> bool {
        self.qresync_enabled
    }

    /// Returns true between [`idle`](Self::idle) and [`done`](Self::done).
    #[must_use]
    pub const fn is_idling(&self) -> bool {
        self.idle_tag.is_some()
    }

    /// Closes the connection.
    ///
    /// Safe to call at any time and any number of times. A closed connection
    /// cannot be opened again.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(conn = %self.log_id, "Connection closed");
        }
        self.idle_tag = None;
        self.state = ConnectionState::Closed;
    }

    /// Sends LOGOUT, shuts the stream down and closes. Failures are ignored.
    pub async fn logout(&mut self) {
        if self.is_open()
            && let Err(e) = self.execute(&Command::Logout).await
        {
            tracing::debug!(conn = %self.log_id, ?e, "LOGOUT failed");
        }
        if let Some(stream) = self.stream.as_mut()
            && let Err(e) = stream.shutdown().await
        {
            tracing::debug!(conn = %self.log_id, ?e, "Shutdown after LOGOUT failed");
        }
        self.close();
    }

    fn stream_mut(&mut self) -> Result<&mut FramedStream<Transport<C::Stream>>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("connection is not open".to_string()))
    }

    /// Closes the connection unless `err` is a negative completion.
    ///
    /// Any other failure on the wire can stop mid-response, after which the
    /// stream position no longer lines up with a response boundary.
    fn fail(&mut self, err: Error) -> Error {
        if !matches!(err, Error::Negative(_)) {
            tracing::warn!(conn = %self.log_id, ?err, "Closing connection after error");
            self.close();
        }
        err
    }

    async fn write_line(&mut self, line: &[u8], log_text: &str) -> Result<()> {
        tracing::trace!(conn = %self.log_id, ">>> {log_text}");
        let stream = self.stream_mut()?;
        let result = stream.write_command(line).await;
        result.map_err(|err| self.fail(err))
    }

    /// Sends `command` under a fresh tag and returns the tag.
    pub async fn send_command(&mut self, command: &Command) -> Result<String> {
        let tag = self.tags.next();
        let line = command.serialize(&tag);
        self.write_line(&line, &format!("{tag} {}", command.log_text()))
            .await?;
        Ok(tag)
    }

    /// Reads the next response, bounded by the read timeout.
    ///
    /// With a `callback`, literals can be streamed out instead of buffered.
    pub async fn read_response(
        &mut self,
        callback: Option<&mut dyn LiteralCallback>,
    ) -> Result<Response> {
        let timeout = self.settings.read_timeout;
        let stream = self.stream_mut()?;
        let result = tokio::time::timeout(timeout, stream.read_response(callback))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(timeout)));
        match result {
            Ok(response) => {
                tracing::trace!(conn = %self.log_id, "<<< {response}");
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Waits until the server sends something, without a timeout.
    ///
    /// Nothing is consumed, so the future can be dropped at any point.
    pub async fn wait_for_data(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        let result = stream.wait_for_data().await;
        result.map_err(|err| self.fail(err))
    }

    /// Reads until the completion tagged `tag`.
    ///
    /// Untagged responses are handed to `handler` and collected; the tagged
    /// completion is the last element. A completion with another tag is a
    /// leftover from an earlier command: it is skipped and everything collected
    /// so far is dropped, except `EXISTS` and `EXPUNGE` data. A `NO` or `BAD`
    /// completion fails with [`Error::Negative`].
    pub async fn read_status_response(
        &mut self,
        tag: &str,
        command: &str,
        handler: &mut dyn UntaggedHandler,
    ) -> Result<Vec<Response>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response(None).await?;

            if response.is_continuation() {
                let reply = match handler.continuation_reply(&response) {
                    Ok(reply) => reply,
                    Err(err) => {
                        self.close();
                        return Err(err);
                    }
                };
                self.write_line(&reply, "[continuation reply]").await?;
                continue;
            }

            match response.tag() {
                Some(completion) if completion == tag => {
                    responses.push(response);
                    break;
                }
                Some(stale) => {
                    tracing::warn!(
                        conn = %self.log_id,
                        expected = tag,
                        received = stale,
                        "Discarding response with stale tag"
                    );
                    responses.retain(|r| {
                        r.numbered(keyword::EXISTS).is_some()
                            || r.numbered(keyword::EXPUNGE).is_some()
                    });
                }
                None => {
                    handler.handle_untagged(&response);
                    responses.push(response);
                }
            }
        }

        match responses.last().and_then(Response::status) {
            Some(Status::Ok) => Ok(responses),
            Some(_) => Err(NegativeResponse::new(command.to_string(), responses).into()),
            None => Err(self.fail(Error::Protocol(format!(
                "completion of {command} carries no status"
            )))),
        }
    }

    /// Runs `command` and returns every response read for it.
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<Response>> {
        self.execute_with(command, &mut ()).await
    }

    /// Runs `command`, passing untagged data and continuations to `handler`.
    pub async fn execute_with(
        &mut self,
        command: &Command,
        handler: &mut dyn UntaggedHandler,
    ) -> Result<Vec<Response>> {
        let tag = self.send_command(command).await?;
        self.read_status_response(&tag, &command.log_text(), handler)
            .await
    }
}
