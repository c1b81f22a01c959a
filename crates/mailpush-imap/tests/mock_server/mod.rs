//! Scripted IMAP server for integration testing
//!
//! Every test drives the server side by hand. [`MockConnector`] hands the
//! client end of an in-memory pipe to the connection under test, and the
//! matching [`ScriptedServer`] sends lines and checks what the client wrote.
//!
//! ```text
//!   connector.accept()  ->  ScriptedServer
//!       |
//!   server.send("* OK ready")
//!       |
//!   let tag = server.expect("CAPABILITY")
//!       |
//!   server.send(&format!("{tag} OK done"))
//! ```

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mailpush_imap::connection::{
    Connector, DeflateStream, ImapSettings, Security, Transport,
};
use mailpush_imap::oauth::{OAuth2TokenProvider, TokenFuture};
use mailpush_imap::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Base64 of `\0user\0secret`, the PLAIN payload for [`settings`].
pub const PLAIN_PAYLOAD: &str = "AHVzZXIAc2VjcmV0";

/// Settings for an unencrypted test account `user` / `secret`.
pub fn settings() -> ImapSettings {
    ImapSettings::builder("imap.test")
        .security(Security::None)
        .username("user")
        .password("secret")
        .read_timeout(Duration::from_secs(5))
        .build()
}

/// Installs a test subscriber once; `RUST_LOG` selects what is shown.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connector handing out queued in-memory pipes.
///
/// `start_tls` returns the stream unchanged and only counts the upgrade.
#[derive(Debug, Default)]
pub struct MockConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
    tls_upgrades: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Queues a connection and returns its server side.
    pub fn accept(&self) -> ScriptedServer {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.streams.lock().unwrap().push_back(client);
        ScriptedServer::new(server)
    }

    pub fn tls_upgrades(&self) -> usize {
        self.tls_upgrades.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Stream = DuplexStream;

    fn connect(
        &self,
        settings: &ImapSettings,
    ) -> impl Future<Output = Result<DuplexStream>> + Send {
        let stream = self.streams.lock().unwrap().pop_front();
        let host = settings.host.clone();
        let port = settings.port;
        async move {
            stream.ok_or_else(|| Error::Connect {
                host,
                port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })
        }
    }

    fn start_tls(
        &self,
        stream: DuplexStream,
        _host: &str,
    ) -> impl Future<Output = Result<DuplexStream>> + Send {
        self.tls_upgrades.fetch_add(1, Ordering::SeqCst);
        async move { Ok(stream) }
    }
}

/// Server end of a mock connection.
pub struct ScriptedServer {
    stream: BufReader<Transport<DuplexStream>>,
}

impl ScriptedServer {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream: BufReader::new(Transport::Plain(stream)),
        }
    }

    /// Writes `line` followed by CRLF.
    pub async fn send(&mut self, line: &str) {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Reads one line from the client, without the CRLF.
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await.unwrap();
        assert!(read > 0, "client closed the connection");
        line.trim_end_matches("\r\n").to_string()
    }

    /// Reads a command, checks everything after the tag and returns the tag.
    pub async fn expect(&mut self, command: &str) -> String {
        let (tag, rest) = self.expect_prefix("").await;
        assert_eq!(rest, command, "unexpected command");
        tag
    }

    /// Reads a command starting with `prefix`. Returns the tag and the rest
    /// of the line after the prefix.
    pub async fn expect_prefix(&mut self, prefix: &str) -> (String, String) {
        let line = self.read_line().await;
        let (tag, command) = line
            .split_once(' ')
            .unwrap_or_else(|| panic!("malformed command line: {line:?}"));
        let rest = command
            .strip_prefix(prefix)
            .unwrap_or_else(|| panic!("expected {prefix:?}, got {command:?}"));
        (tag.to_string(), rest.to_string())
    }

    /// Reads an untagged line such as `DONE` or a SASL answer.
    pub async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.read_line().await, expected);
    }

    /// Answers `command` with a plain `OK`.
    pub async fn ok(&mut self, command: &str) -> String {
        let tag = self.expect(command).await;
        self.send(&format!("{tag} OK {command} completed")).await;
        tag
    }

    /// Returns true once the client has closed its end.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(self.stream.read_line(&mut line).await, Ok(0) | Err(_))
    }

    /// Switches both directions to DEFLATE after a `COMPRESS` OK.
    pub fn start_deflate(self) -> Self {
        let buffered = self.stream.buffer().to_vec();
        let transport = match self.stream.into_inner() {
            Transport::Plain(inner) => {
                Transport::Deflate(Box::new(DeflateStream::new(inner, buffered)))
            }
            compressed @ Transport::Deflate(_) => compressed,
        };
        Self {
            stream: BufReader::new(transport),
        }
    }

    /// Greets, accepts `AUTHENTICATE PLAIN` with SASL-IR and answers the
    /// delimiter probe. `capabilities` are announced after login and must
    /// not include NAMESPACE, ID or COMPRESS.
    pub async fn serve_login(&mut self, capabilities: &str) {
        self.serve_authentication(capabilities).await;
        self.serve_delimiter("/").await;
    }

    /// Greets and accepts `AUTHENTICATE PLAIN` with SASL-IR.
    pub async fn serve_authentication(&mut self, capabilities: &str) {
        self.send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR] ready")
            .await;
        let tag = self
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        self.send(&format!("{tag} OK [CAPABILITY {capabilities}] Logged in"))
            .await;
    }

    /// Answers `LIST "" ""` with `delimiter`.
    pub async fn serve_delimiter(&mut self, delimiter: &str) {
        let tag = self.expect("LIST \"\" \"\"").await;
        self.send(&format!("* LIST (\\Noselect) \"{delimiter}\" \"\""))
            .await;
        self.send(&format!("{tag} OK LIST completed")).await;
    }
}

/// Token provider handing out `token1`, `token2`, ...
#[derive(Debug, Default)]
pub struct CountingTokenProvider {
    issued: AtomicUsize,
    invalidated: AtomicUsize,
}

impl CountingTokenProvider {
    pub fn invalidated(&self) -> usize {
        self.invalidated.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl OAuth2TokenProvider for CountingTokenProvider {
    fn get_token<'a>(&'a self, _username: &'a str, _timeout: Duration) -> TokenFuture<'a> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(format!("token{n}")) })
    }

    fn invalidate_token(&self, _username: &str) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}
