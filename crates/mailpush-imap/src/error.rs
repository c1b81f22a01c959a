//! Error types for the IMAP engine.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::model::response_code;
use crate::parser::Response;
use crate::types::Status;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket could not be connected to any resolved address.
    #[error("Cannot connect to host {host}:{port}: {source}")]
    Connect {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// Error of the last connection attempt.
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Malformed response grammar.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte offset inside the response where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Protocol violation or unexpected response structure.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server completed a command with `NO` or `BAD`.
    #[error("{0}")]
    Negative(Box<NegativeResponse>),

    /// The server rejected the credentials.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the failure.
        message: String,
        /// Text sent by the server, if any.
        server_message: Option<String>,
    },

    /// A capability required by the configured settings is not advertised.
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// Transport security or client certificate problem.
    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),

    /// Server sent BYE.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A command cannot be split to fit the line-length budget.
    #[error("Command does not fit in {max_length} characters")]
    CommandTooLong {
        /// The budget that could not be met.
        max_length: usize,
    },

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The OAuth token provider failed.
    #[error("Token provider error: {0}")]
    Token(String),
}

impl Error {
    /// Creates a parse error.
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Returns true for failures of the underlying transport.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connect { .. } | Self::Tls(_) | Self::Timeout(_)
        )
    }

    /// Returns true if this is an authentication failure.
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Returns the negative response, if this error carries one.
    #[must_use]
    pub fn as_negative(&self) -> Option<&NegativeResponse> {
        match self {
            Self::Negative(negative) => Some(negative),
            _ => None,
        }
    }
}

/// A tagged `NO` or `BAD` completion together with everything read for it.
#[derive(Debug, Clone)]
pub struct NegativeResponse {
    command: String,
    responses: Vec<Response>,
}

impl NegativeResponse {
    /// Creates a negative response. `responses` must end with the tagged completion.
    #[must_use]
    pub const fn new(command: String, responses: Vec<Response>) -> Self {
        Self { command, responses }
    }

    /// The command as it was logged (sensitive commands are masked).
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// All responses read while executing the command.
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// The tagged completion.
    #[must_use]
    pub fn last_response(&self) -> Option<&Response> {
        self.responses.last()
    }

    /// Tag of the completion.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.last_response().and_then(Response::tag)
    }

    /// Completion status (`NO` or `BAD`).
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.last_response().and_then(Response::status)
    }

    /// Human readable text of the completion.
    #[must_use]
    pub fn response_text(&self) -> Option<&str> {
        self.last_response().and_then(Response::status_text)
    }

    /// Response code of the completion, e.g. `AUTHENTICATIONFAILED`.
    #[must_use]
    pub fn response_code(&self) -> Option<&str> {
        response_code::extract(&self.responses)
    }

    /// Returns true if the server announced it is closing the connection.
    #[must_use]
    pub fn was_bye_received(&self) -> bool {
        self.responses
            .iter()
            .any(|response| !response.is_tagged() && response.status() == Some(Status::Bye))
    }
}

impl fmt::Display for NegativeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command: {}; response: ", self.command)?;
        match self.last_response() {
            Some(response) => write!(f, "{response}"),
            None => f.write_str("<none>"),
        }
    }
}

impl From<NegativeResponse> for Error {
    fn from(negative: NegativeResponse) -> Self {
        Self::Negative(Box::new(negative))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
