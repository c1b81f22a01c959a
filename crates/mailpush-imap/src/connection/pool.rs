//! Connection factory and pool.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::client::Connection;
use super::config::ImapSettings;
use super::stream::{Connector, TcpConnector};
use crate::Result;
use crate::oauth::OAuth2TokenProvider;

/// Creates unopened connections for one account.
pub struct ConnectionFactory<C: Connector = TcpConnector> {
    settings: ImapSettings,
    connector: Arc<C>,
    token_provider: Option<Arc<dyn OAuth2TokenProvider>>,
}

impl<C: Connector> Clone for ConnectionFactory<C> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            connector: Arc::clone(&self.connector),
            token_provider: self.token_provider.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("settings", &self.settings)
            .field("token_provider", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory<TcpConnector> {
    /// Creates a factory dialing over TCP.
    ///
    /// # Errors
    ///
    /// Fails if the TLS configuration cannot be built.
    pub fn tcp(settings: ImapSettings) -> Result<Self> {
        Ok(Self::new(settings, Arc::new(TcpConnector::new()?)))
    }
}

impl<C: Connector> ConnectionFactory<C> {
    /// Creates a factory.
    #[must_use]
    pub const fn new(settings: ImapSettings, connector: Arc<C>) -> Self {
        Self {
            settings,
            connector,
            token_provider: None,
        }
    }

    /// Sets the token provider handed to every connection.
    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn OAuth2TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Account settings.
    #[must_use]
    pub const fn settings(&self) -> &ImapSettings {
        &self.settings
    }

    /// Creates a new, unopened connection.
    #[must_use]
    pub fn create(&self) -> Connection<C> {
        let connection = Connection::new(self.settings.clone(), Arc::clone(&self.connector));
        match &self.token_provider {
            Some(provider) => connection.with_token_provider(Arc::clone(provider)),
            None => connection,
        }
    }
}

struct PoolInner<C: Connector> {
    factory: ConnectionFactory<C>,
    idle: Vec<Connection<C>>,
}

/// Hands out ready connections and takes them back.
///
/// Each borrowed connection is used by one caller at a time. On release a
/// NOOP checks that the connection is still alive; dead ones are dropped and
/// replaced on the next borrow. The namespace prefix and delimiter found by
/// the first connection are reused by later ones.
pub struct ConnectionPool<C: Connector = TcpConnector> {
    inner: Mutex<PoolInner<C>>,
    max_idle: usize,
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Default number of idle connections kept.
    pub const DEFAULT_MAX_IDLE: usize = 4;

    /// Creates an empty pool.
    #[must_use]
    pub const fn new(factory: ConnectionFactory<C>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                factory,
                idle: Vec::new(),
            }),
            max_idle: Self::DEFAULT_MAX_IDLE,
        }
    }

    /// Sets how many idle connections are kept.
    #[must_use]
    pub const fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of connections waiting to be borrowed.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    /// Returns an open connection, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// Whatever [`Connection::open`] fails with.
    pub async fn borrow(&self) -> Result<Connection<C>> {
        let (reused, mut connection) = {
            let mut inner = self.lock();
            match inner.idle.pop() {
                Some(connection) => (true, connection),
                None => (false, inner.factory.create()),
            }
        };
        if reused {
            tracing::trace!(conn = connection.log_id(), "Reusing pooled connection");
            return Ok(connection);
        }

        connection.open().await?;

        let mut inner = self.lock();
        let settings = &mut inner.factory.settings;
        if settings.path_prefix.is_none() {
            settings.path_prefix = connection.path_prefix().map(str::to_string);
        }
        if settings.path_delimiter.is_none() {
            settings.path_delimiter = connection.path_delimiter().map(str::to_string);
        }
        Ok(connection)
    }

    /// Gives a connection back after probing it with NOOP.
    pub async fn release(&self, mut connection: Connection<C>) {
        if !connection.is_open() {
            return;
        }
        if let Err(e) = connection.noop().await {
            tracing::debug!(conn = connection.log_id(), ?e, "Dropping dead connection");
            connection.close();
            return;
        }

        let mut inner = self.lock();
        if inner.idle.len() < self.max_idle {
            inner.idle.push(connection);
        } else {
            drop(inner);
            connection.close();
        }
    }

    /// Closes every idle connection.
    pub fn close_all(&self) {
        let idle = std::mem::take(&mut self.lock().idle);
        for mut connection in idle {
            connection.close();
        }
    }
}
