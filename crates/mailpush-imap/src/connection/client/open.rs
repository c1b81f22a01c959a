//! Opening a connection: greeting, STARTTLS, authentication and the
//! negotiation that follows.

use super::{Connection, ConnectionState};
use crate::command::Command;
use crate::connection::compress::{DeflateStream, Transport};
use crate::connection::config::Security;
use crate::connection::framed::FramedStream;
use crate::connection::stream::Connector;
use crate::model::{CapabilityResponse, ListResponse, NamespaceResponse};
use crate::parser::Response;
use crate::types::Status;
use crate::types::capability::names;
use crate::{Error, Result};

impl<C: Connector> Connection<C> {
    /// Opens the connection and brings it to [`ConnectionState::Ready`].
    ///
    /// Calling `open` on an open connection does nothing. Any failure closes
    /// the connection.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the connection was closed before, otherwise
    /// whatever stopped the connection from getting ready.
    pub async fn open(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => {
                return Err(Error::InvalidState("open() called after close()".to_string()));
            }
            ConnectionState::Unconnected => {}
            _ => return Ok(()),
        }

        match self.open_inner().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(conn = %self.log_id, ?err, "Opening connection failed");
                self.close();
                Err(err)
            }
        }
    }

    async fn open_inner(&mut self) -> Result<()> {
        tracing::debug!(
            conn = %self.log_id,
            host = %self.settings.host,
            port = self.settings.port,
            security = ?self.settings.security,
            "Connecting"
        );
        let stream = self.connector.connect(&self.settings).await?;
        self.stream = Some(FramedStream::new(Transport::Plain(stream)));
        self.state = ConnectionState::Connected;

        let preauthenticated = self.read_greeting().await?;
        if self.capabilities.is_none() {
            self.request_capabilities().await?;
        }
        self.state = ConnectionState::CapabilityKnown;

        if self.settings.security == Security::StartTls {
            if preauthenticated {
                return Err(Error::CertificateValidation(
                    "STARTTLS is not possible after PREAUTH".to_string(),
                ));
            }
            self.negotiate_tls().await?;
        }

        if preauthenticated {
            tracing::debug!(conn = %self.log_id, "Server pre-authenticated the connection");
        } else {
            let responses = self.authenticate().await?;
            let announced = CapabilityResponse::parse_all(&responses)
                .or_else(|| responses.last().and_then(CapabilityResponse::from_code));
            match announced {
                Some(capabilities) => self.capabilities = Some(capabilities.into_capabilities()),
                None => self.request_capabilities().await?,
            }
        }
        self.state = ConnectionState::Authenticated;

        if self.settings.use_compression && self.has_capability(names::COMPRESS_DEFLATE) {
            self.negotiate_compression().await?;
        }
        self.send_client_id().await?;
        self.discover_namespace().await?;
        self.discover_delimiter().await?;

        self.state = ConnectionState::Ready;
        tracing::info!(
            conn = %self.log_id,
            host = %self.settings.host,
            compressed = self.is_compressed(),
            "Connection ready"
        );
        Ok(())
    }

    /// Reads the greeting. Returns true for `PREAUTH`.
    async fn read_greeting(&mut self) -> Result<bool> {
        let greeting = self.read_response(None).await?;
        if !greeting.is_untagged() {
            return Err(Error::Protocol(format!("unexpected greeting: {greeting}")));
        }
        match greeting.status() {
            Some(Status::Bye) => Err(Error::Bye(
                greeting.status_text().unwrap_or_default().to_string(),
            )),
            Some(status @ (Status::Ok | Status::PreAuth)) => {
                if let Some(announced) = CapabilityResponse::from_code(&greeting) {
                    self.capabilities = Some(announced.into_capabilities());
                }
                Ok(status == Status::PreAuth)
            }
            _ => Err(Error::Protocol(format!("unexpected greeting: {greeting}"))),
        }
    }

    /// Replaces the capability set with a fresh CAPABILITY reply.
    pub(crate) async fn request_capabilities(&mut self) -> Result<()> {
        let responses = self.execute(&Command::Capability).await?;
        let announced = CapabilityResponse::parse_all(&responses).ok_or_else(|| {
            Error::Protocol("server did not send CAPABILITY data".to_string())
        })?;
        self.capabilities = Some(announced.into_capabilities());
        Ok(())
    }

    async fn negotiate_tls(&mut self) -> Result<()> {
        if !self.has_capability(names::STARTTLS) {
            return Err(Error::CertificateValidation(
                "STARTTLS connection security not available".to_string(),
            ));
        }
        self.execute(&Command::StartTls).await?;

        let framed = self
            .stream
            .take()
            .ok_or_else(|| Error::InvalidState("connection is not open".to_string()))?;
        let (transport, buffered) = framed.into_parts();
        if !buffered.is_empty() {
            return Err(Error::Protocol(
                "server sent data before the TLS handshake".to_string(),
            ));
        }
        let Transport::Plain(plain) = transport else {
            return Err(Error::InvalidState(
                "STARTTLS on a compressed stream".to_string(),
            ));
        };

        let secured = self.connector.start_tls(plain, &self.settings.host).await?;
        self.stream = Some(FramedStream::new(Transport::Plain(secured)));
        self.state = ConnectionState::TlsNegotiated;
        tracing::debug!(conn = %self.log_id, "STARTTLS complete");

        // Anything learned before the handshake could have been forged.
        self.capabilities = None;
        self.request_capabilities().await
    }

    async fn negotiate_compression(&mut self) -> Result<()> {
        match self.execute(&Command::CompressDeflate).await {
            Ok(_) => {}
            Err(Error::Negative(negative)) => {
                tracing::warn!(
                    conn = %self.log_id,
                    response = %negative,
                    "COMPRESS DEFLATE rejected, continuing uncompressed"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let framed = self
            .stream
            .take()
            .ok_or_else(|| Error::InvalidState("connection is not open".to_string()))?;
        let (transport, buffered) = framed.into_parts();
        let transport = match transport {
            Transport::Plain(inner) => {
                Transport::Deflate(Box::new(DeflateStream::new(inner, buffered)))
            }
            compressed @ Transport::Deflate(_) => compressed,
        };
        self.stream = Some(FramedStream::new(transport));
        self.state = ConnectionState::CompressionEnabled;
        tracing::debug!(conn = %self.log_id, "Compression enabled");
        Ok(())
    }

    async fn send_client_id(&mut self) -> Result<()> {
        let Some(info) = self.settings.client_info.clone() else {
            return Ok(());
        };
        if !self.has_capability(names::ID) {
            return Ok(());
        }

        let command = Command::Id {
            parameters: Some(vec![
                ("name".to_string(), info.app_name),
                ("version".to_string(), info.app_version),
            ]),
        };
        ignore_negative(self.execute(&command).await, &self.log_id, "ID")?;
        Ok(())
    }

    async fn discover_namespace(&mut self) -> Result<()> {
        if self.path_prefix.is_some() {
            return Ok(());
        }

        if self.has_capability(names::NAMESPACE) {
            let responses = ignore_negative(
                self.execute(&Command::Namespace).await,
                &self.log_id,
                "NAMESPACE",
            )?;
            if let Some(namespace) = responses
                .as_deref()
                .and_then(NamespaceResponse::parse_all)
            {
                tracing::debug!(
                    conn = %self.log_id,
                    prefix = namespace.prefix(),
                    delimiter = namespace.hierarchy_delimiter(),
                    "Namespace discovered"
                );
                self.path_prefix = Some(namespace.prefix().to_string());
                if self.path_delimiter.is_none() {
                    self.path_delimiter = namespace.hierarchy_delimiter().map(str::to_string);
                }
            }
        }

        if self.path_prefix.is_none() {
            self.path_prefix = Some(String::new());
        }
        Ok(())
    }

    async fn discover_delimiter(&mut self) -> Result<()> {
        if self.path_delimiter.is_some() {
            return Ok(());
        }

        let command = Command::List {
            reference: String::new(),
            pattern: String::new(),
        };
        let responses = ignore_negative(self.execute(&command).await, &self.log_id, "LIST")?;
        self.path_delimiter = responses.as_deref().and_then(|responses| {
            ListResponse::parse_list(responses)
                .into_iter()
                .find_map(|list| list.delimiter().map(str::to_string))
        });
        Ok(())
    }
}

/// Turns a `NO`/`BAD` completion into `None` for best-effort commands.
fn ignore_negative(
    result: Result<Vec<Response>>,
    log_id: &str,
    command: &str,
) -> Result<Option<Vec<Response>>> {
    match result {
        Ok(responses) => Ok(Some(responses)),
        Err(Error::Negative(negative)) => {
            tracing::debug!(conn = %log_id, command, response = %negative, "Ignoring rejected command");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
