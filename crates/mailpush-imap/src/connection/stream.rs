//! Socket streams and the connector that opens them.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::{ImapSettings, Security};
use crate::{Error, Result};

/// Opens transport streams for a [`Connection`](super::Connection).
///
/// The production implementation is [`TcpConnector`]; tests plug in in-memory
/// streams.
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connects to the server described by `settings`.
    ///
    /// With [`Security::Implicit`] the returned stream is already encrypted.
    fn connect(&self, settings: &ImapSettings) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Layers TLS over an established plaintext stream after STARTTLS.
    fn start_tls(
        &self,
        stream: Self::Stream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with default root certificates.
pub fn create_tls_connector() -> Result<TlsConnector> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Connects over TCP, with rustls for implicit TLS and STARTTLS.
#[derive(Clone)]
pub struct TcpConnector {
    tls: TlsConnector,
}

impl TcpConnector {
    /// Creates a connector trusting the webpki root certificates.
    pub fn new() -> Result<Self> {
        Ok(Self {
            tls: create_tls_connector()?,
        })
    }

    /// Creates a connector with a custom rustls configuration, e.g. one carrying
    /// a client certificate for EXTERNAL authentication.
    #[must_use]
    pub fn with_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    async fn handshake(&self, tcp: TcpStream, host: &str) -> Result<ImapStream> {
        let server_name = ServerName::try_from(host.to_string())?;
        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(map_tls_error)?;
        tracing::debug!(host, "TLS handshake complete");
        Ok(ImapStream::Tls(Box::new(tls)))
    }
}

impl Connector for TcpConnector {
    type Stream = ImapStream;

    async fn connect(&self, settings: &ImapSettings) -> Result<ImapStream> {
        let host = settings.host.as_str();
        let port = settings.port;

        // Resolution failures surface unwrapped.
        let addrs = tokio::net::lookup_host((host, port)).await?;

        let mut last_error = None;
        let mut connected = None;
        for addr in addrs {
            match tokio::time::timeout(settings.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(tcp)) => {
                    tracing::debug!(%addr, "connected");
                    connected = Some(tcp);
                    break;
                }
                Ok(Err(e)) => {
                    tracing::debug!(%addr, ?e, "connect attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::debug!(%addr, "connect attempt timed out");
                    last_error = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connection timed out",
                    ));
                }
            }
        }

        let Some(tcp) = connected else {
            return Err(Error::Connect {
                host: host.to_string(),
                port,
                source: last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
                }),
            });
        };
        let _ = tcp.set_nodelay(true);

        match settings.security {
            Security::Implicit => self.handshake(tcp, host).await,
            Security::None | Security::StartTls => Ok(ImapStream::Plain(tcp)),
        }
    }

    async fn start_tls(&self, stream: ImapStream, host: &str) -> Result<ImapStream> {
        match stream {
            ImapStream::Plain(tcp) => self.handshake(tcp, host).await,
            ImapStream::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }
}

/// Certificate problems come back from tokio-rustls as `io::Error`s wrapping a
/// `rustls::Error`.
fn map_tls_error(err: io::Error) -> Error {
    let is_certificate = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls| matches!(tls, rustls::Error::InvalidCertificate(_)));

    if is_certificate {
        Error::CertificateValidation(err.to_string())
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tls_connector() {
        let connector = create_tls_connector();
        assert!(connector.is_ok());
    }

    #[test]
    fn test_certificate_error_mapping() {
        let inner = rustls::Error::InvalidCertificate(rustls::CertificateError::Expired);
        let err = map_tls_error(io::Error::new(io::ErrorKind::InvalidData, inner));
        assert!(matches!(err, Error::CertificateValidation(_)));

        let err = map_tls_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_wrapped() {
        // Bind and drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = ImapSettings::builder("127.0.0.1")
            .security(Security::None)
            .port(port)
            .build();
        let err = TcpConnector::new()
            .unwrap()
            .connect(&settings)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connect { port: p, .. } if p == port));
        assert!(err.to_string().starts_with("Cannot connect to host"));
    }
}
