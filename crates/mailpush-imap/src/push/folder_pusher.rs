//! IDLE worker for a single folder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

use super::event::{PushEvent, PushEventKind};
use super::state::{PushState, PushStateStore};
use crate::connection::{Connection, ConnectionFactory, Connector, PushConfig};
use crate::model::{FetchResponse, SelectOrExamineResponse, VanishedResponse};
use crate::parser::{Response, keyword};
use crate::types::Status;
use crate::types::capability::names;
use crate::{Error, Result};

/// Why a pusher left IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleOutcome {
    Stop,
    Refresh,
    NewData,
}

/// Handle to a running folder pusher.
///
/// The pusher owns a dedicated connection, keeps it in IDLE on the folder
/// and reports what happens as [`PushEvent`]s. It reconnects with backoff
/// after failures and gives up after
/// [`max_failures`](PushConfig::max_failures) in a row.
#[derive(Debug)]
pub struct FolderPusher {
    folder: String,
    stop: watch::Sender<bool>,
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
    grace: Duration,
}

impl FolderPusher {
    /// Spawns a pusher for `folder`. Must be called within a Tokio runtime.
    #[must_use]
    pub fn start<C: Connector>(
        folder: impl Into<String>,
        factory: ConnectionFactory<C>,
        config: PushConfig,
        store: Arc<dyn PushStateStore>,
        events: mpsc::UnboundedSender<PushEvent>,
    ) -> Self {
        let folder = folder.into();
        let (stop, stop_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());
        let grace = config.stop_grace;
        let worker = Worker {
            folder: folder.clone(),
            factory,
            store,
            events,
            stop: stop_rx,
            refresh: Arc::clone(&refresh),
            failures: 0,
            backoff: config.initial_backoff,
            config,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            folder,
            stop,
            refresh,
            handle,
            grace,
        }
    }

    /// The watched folder.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Returns true until the worker has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Makes the pusher leave IDLE, check for new messages and re-enter IDLE.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Asks the worker to stop without waiting for it.
    pub fn request_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stops the worker: it ends IDLE and closes its connection.
    ///
    /// A worker that does not finish within the grace period is aborted.
    pub async fn stop(mut self) {
        self.request_stop();
        match tokio::time::timeout(self.grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(folder = %self.folder, ?e, "Pusher task failed"),
            Err(_) => {
                tracing::warn!(folder = %self.folder, "Pusher did not stop in time, aborting");
                self.handle.abort();
            }
        }
    }
}

struct Worker<C: Connector> {
    folder: String,
    factory: ConnectionFactory<C>,
    config: PushConfig,
    store: Arc<dyn PushStateStore>,
    events: mpsc::UnboundedSender<PushEvent>,
    stop: watch::Receiver<bool>,
    refresh: Arc<Notify>,
    failures: u32,
    backoff: Duration,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self) {
        tracing::debug!(folder = %self.folder, "Pusher started");

        while !*self.stop.borrow() {
            let mut connection = self.factory.create();
            let result = self.session(&mut connection).await;
            connection.close();

            let err = match result {
                Ok(()) => break,
                Err(err) => err,
            };
            if err.is_authentication_failure() {
                tracing::warn!(folder = %self.folder, ?err, "Authentication failed, stopping pusher");
                self.emit(PushEventKind::AuthenticationFailed {
                    message: err.to_string(),
                });
                break;
            }
            match &err {
                Error::MissingCapability(capability) => {
                    tracing::warn!(folder = %self.folder, %capability, "Server cannot push");
                    self.emit(PushEventKind::PushError {
                        message: err.to_string(),
                    });
                    break;
                }
                // Retrying cannot fix the security setup.
                Error::CertificateValidation(reason) => {
                    tracing::warn!(folder = %self.folder, %reason, "Connection security failed, stopping pusher");
                    self.emit(PushEventKind::PushError {
                        message: err.to_string(),
                    });
                    break;
                }
                _ => {}
            }

            self.failures += 1;
            tracing::warn!(folder = %self.folder, failures = self.failures, ?err, "Push connection failed");
            self.emit(PushEventKind::ConnectionLost {
                message: err.to_string(),
            });
            if self.failures >= self.config.max_failures {
                self.emit(PushEventKind::PushError {
                    message: format!(
                        "push disabled after {} consecutive failures",
                        self.failures
                    ),
                });
                break;
            }

            if self.sleep_or_stop(self.backoff).await {
                break;
            }
            self.backoff = (self.backoff * 2).min(self.config.max_backoff);
        }

        tracing::debug!(folder = %self.folder, "Pusher stopped");
    }

    /// Returns true if a stop was requested while sleeping.
    async fn sleep_or_stop(&mut self, delay: Duration) -> bool {
        tracing::debug!(folder = %self.folder, ?delay, "Waiting before reconnecting");
        tokio::select! {
            _ = self.stop.changed() => true,
            () = tokio::time::sleep(delay) => *self.stop.borrow(),
        }
    }

    fn emit(&self, kind: PushEventKind) {
        if self.events.send(PushEvent::new(self.folder.clone(), kind)).is_err() {
            tracing::trace!(folder = %self.folder, "No receiver for push event");
        }
    }

    /// One connection's worth of pushing. Returns `Ok` once stopped.
    async fn session(&mut self, connection: &mut Connection<C>) -> Result<()> {
        connection.open().await?;
        if !connection.has_capability(names::IDLE) {
            return Err(Error::MissingCapability(names::IDLE.to_string()));
        }

        let selected = connection.examine(&self.folder, None).await?;
        let mut uid_next = self.initial_sync(connection, &selected).await?;

        loop {
            let early = connection.idle().await?;
            self.failures = 0;
            self.backoff = self.config.initial_backoff;
            tracing::debug!(folder = %self.folder, conn = connection.log_id(), "Idling");

            let outcome = if self.dispatch_all(&early) {
                IdleOutcome::NewData
            } else {
                self.wait_in_idle(connection).await?
            };

            if outcome == IdleOutcome::Stop {
                if let Err(e) = connection.done().await {
                    tracing::debug!(folder = %self.folder, ?e, "DONE failed while stopping");
                }
                return Ok(());
            }

            tracing::debug!(folder = %self.folder, ?outcome, "Leaving IDLE");
            let responses = connection.done().await?;
            self.dispatch_all(&responses);
            uid_next = self.sync_new_messages(connection, uid_next).await?;
        }
    }

    async fn wait_in_idle(&mut self, connection: &mut Connection<C>) -> Result<IdleOutcome> {
        let deadline = tokio::time::sleep(self.config.refresh_interval);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.stop.changed() => return Ok(IdleOutcome::Stop),
                () = self.refresh.notified() => return Ok(IdleOutcome::Refresh),
                () = &mut deadline => return Ok(IdleOutcome::Refresh),
                ready = connection.wait_for_data() => {
                    ready?;
                    let response = connection.read_response(None).await?;
                    if response.is_tagged() {
                        return Err(Error::Protocol(format!("server ended IDLE: {response}")));
                    }
                    if response.status() == Some(Status::Bye) {
                        return Err(Error::Bye(response.status_text().unwrap_or_default().to_string()));
                    }
                    if self.dispatch(&response) {
                        return Ok(IdleOutcome::NewData);
                    }
                }
            }
        }
    }

    /// Reports new messages since the last session, bounded by the display
    /// window, and returns the current UIDNEXT.
    async fn initial_sync(
        &self,
        connection: &mut Connection<C>,
        selected: &SelectOrExamineResponse,
    ) -> Result<u64> {
        let stored = self
            .store
            .load(&self.folder)
            .map(|text| PushState::parse(&text))
            .unwrap_or_default();

        let uid_next = match selected.uid_next() {
            Some(uid_next) => uid_next,
            None => connection
                .uid_search("*:*")
                .await?
                .into_iter()
                .max()
                .map_or(1, |highest| highest + 1),
        };

        let start = stored
            .uid_next()
            .unwrap_or(0)
            .max(uid_next.saturating_sub(self.config.display_count))
            .max(1);
        tracing::debug!(folder = %self.folder, start, uid_next, "Initial sync");

        let next = if start < uid_next {
            self.sync_new_messages(connection, start).await?.max(uid_next)
        } else {
            uid_next
        };
        self.save_state(next);
        Ok(next)
    }

    /// Reports messages with UIDs from `uid_next` on. Returns the new UIDNEXT.
    async fn sync_new_messages(&self, connection: &mut Connection<C>, uid_next: u64) -> Result<u64> {
        let mut uids: Vec<u64> = connection
            .uid_search(&format!("UID {uid_next}:*"))
            .await?
            .into_iter()
            .filter(|&uid| uid >= uid_next)
            .collect();
        uids.sort_unstable();
        uids.dedup();

        let Some(&highest) = uids.last() else {
            self.save_state(uid_next);
            return Ok(uid_next);
        };
        self.emit(PushEventKind::NewMessages { uids });
        let next = highest + 1;
        self.save_state(next);
        Ok(next)
    }

    fn save_state(&self, uid_next: u64) {
        let state = PushState::new(Some(uid_next));
        self.store.save(&self.folder, &state.to_string());
    }

    fn dispatch_all(&self, responses: &[Response]) -> bool {
        responses
            .iter()
            .fold(false, |new_data, response| self.dispatch(response) || new_data)
    }

    /// Forwards one untagged update. Returns true if new messages may have
    /// arrived.
    fn dispatch(&self, response: &Response) -> bool {
        if let Some(count) = response.numbered(keyword::EXISTS) {
            self.emit(PushEventKind::Exists { count });
            return true;
        }
        if let Some(sequence_number) = response.numbered(keyword::EXPUNGE) {
            self.emit(PushEventKind::Expunged { sequence_number });
        } else if let Some(fetch) = FetchResponse::parse(response) {
            let sequence_number = fetch.sequence_number();
            let uid = fetch.uid();
            if let Some(flags) = fetch.into_flags() {
                self.emit(PushEventKind::FlagsChanged {
                    sequence_number,
                    uid,
                    flags,
                });
            }
        } else if let Some(vanished) = VanishedResponse::parse(response) {
            self.emit(PushEventKind::Vanished {
                uids: vanished.into_uids(),
            });
        }
        false
    }
}
