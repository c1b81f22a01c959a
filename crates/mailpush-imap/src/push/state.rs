//! Persisted push state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

const UID_NEXT_KEY: &str = "uidNext";

/// What a folder pusher remembers between sessions.
///
/// Stored as the text `uidNext=<n>`; `uidNext=-1` means nothing is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushState {
    uid_next: Option<u64>,
}

impl PushState {
    /// Creates a state with the given next UID.
    #[must_use]
    pub const fn new(uid_next: Option<u64>) -> Self {
        Self { uid_next }
    }

    /// Parses the stored form. Anything unreadable yields the empty state.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let uid_next = text
            .trim()
            .strip_prefix(UID_NEXT_KEY)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|&value| value > 0)
            .and_then(|value| u64::try_from(value).ok());
        Self { uid_next }
    }

    /// The next UID the server will assign, if known.
    #[must_use]
    pub const fn uid_next(&self) -> Option<u64> {
        self.uid_next
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid_next {
            Some(uid_next) => write!(f, "{UID_NEXT_KEY}={uid_next}"),
            None => write!(f, "{UID_NEXT_KEY}=-1"),
        }
    }
}

/// Storage for push state, keyed by folder name.
pub trait PushStateStore: Send + Sync {
    /// Returns the stored state text of `folder`.
    fn load(&self, folder: &str) -> Option<String>;

    /// Stores the state text of `folder`.
    fn save(&self, folder: &str, state: &str);
}

/// A [`PushStateStore`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryPushStateStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryPushStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PushStateStore for MemoryPushStateStore {
    fn load(&self, folder: &str) -> Option<String> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(folder)
            .cloned()
    }

    fn save(&self, folder: &str, state: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(folder.to_string(), state.to_string());
    }
}
