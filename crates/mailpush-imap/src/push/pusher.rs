//! Manager for the pushers of one account.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::event::PushEvent;
use super::folder_pusher::FolderPusher;
use super::state::PushStateStore;
use crate::connection::{ConnectionFactory, Connector, PushConfig, TcpConnector};

/// Runs one [`FolderPusher`] per watched folder.
pub struct Pusher<C: Connector = TcpConnector> {
    factory: ConnectionFactory<C>,
    config: PushConfig,
    store: Arc<dyn PushStateStore>,
    events: mpsc::UnboundedSender<PushEvent>,
    pushers: HashMap<String, FolderPusher>,
}

impl<C: Connector> fmt::Debug for Pusher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pusher")
            .field("config", &self.config)
            .field("folders", &self.pushers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Pusher<C> {
    /// Creates a pusher and the receiving end of its event channel.
    #[must_use]
    pub fn new(
        factory: ConnectionFactory<C>,
        config: PushConfig,
        store: Arc<dyn PushStateStore>,
    ) -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let pusher = Self {
            factory,
            config,
            store,
            events,
            pushers: HashMap::new(),
        };
        (pusher, receiver)
    }

    /// Pushes exactly `folders`.
    ///
    /// Pushers for folders outside the set are stopped; folders without a
    /// running pusher get one.
    pub async fn start<I, S>(&mut self, folders: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: HashSet<String> = folders.into_iter().map(Into::into).collect();

        let obsolete: Vec<String> = self
            .pushers
            .keys()
            .filter(|folder| !wanted.contains(*folder))
            .cloned()
            .collect();
        for folder in obsolete {
            if let Some(pusher) = self.pushers.remove(&folder) {
                tracing::debug!(folder = %folder, "Stopping pusher for unwatched folder");
                pusher.stop().await;
            }
        }

        for folder in wanted {
            let running = self
                .pushers
                .get(&folder)
                .is_some_and(FolderPusher::is_running);
            if !running {
                self.spawn(folder);
            }
        }
    }

    /// Replaces the pusher of `folder` with a fresh one.
    pub async fn restart_folder(&mut self, folder: &str) {
        if let Some(pusher) = self.pushers.remove(folder) {
            pusher.stop().await;
        }
        self.spawn(folder.to_string());
    }

    fn spawn(&mut self, folder: String) {
        tracing::info!(folder = %folder, "Starting pusher");
        let pusher = FolderPusher::start(
            folder.clone(),
            self.factory.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            self.events.clone(),
        );
        self.pushers.insert(folder, pusher);
    }

    /// Asks every pusher to leave IDLE and check for new messages.
    pub fn refresh(&self) {
        for pusher in self.pushers.values() {
            pusher.refresh();
        }
    }

    /// Stops every pusher.
    pub async fn stop(&mut self) {
        for pusher in self.pushers.values() {
            pusher.request_stop();
        }
        for (_, pusher) in self.pushers.drain() {
            pusher.stop().await;
        }
    }

    /// Folders with a pusher, running or not.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.pushers.keys().map(String::as_str)
    }

    /// Returns true if `folder` has a running pusher.
    #[must_use]
    pub fn is_pushing(&self, folder: &str) -> bool {
        self.pushers
            .get(folder)
            .is_some_and(FolderPusher::is_running)
    }
}
