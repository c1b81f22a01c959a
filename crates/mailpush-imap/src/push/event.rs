//! Events reported by folder pushers.

use crate::types::Flags;

/// Something a pusher observed on a watched folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Folder the event belongs to.
    pub folder: String,
    /// What happened.
    pub kind: PushEventKind,
}

impl PushEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(folder: impl Into<String>, kind: PushEventKind) -> Self {
        Self {
            folder: folder.into(),
            kind,
        }
    }
}

/// Kinds of [`PushEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEventKind {
    /// Messages with these UIDs arrived.
    NewMessages {
        /// UIDs in ascending order.
        uids: Vec<u64>,
    },
    /// The server reported a new message count.
    Exists {
        /// Messages in the folder.
        count: u64,
    },
    /// Flags of a message changed.
    FlagsChanged {
        /// Message sequence number.
        sequence_number: u64,
        /// UID, when the server included it.
        uid: Option<u64>,
        /// The complete new flag set.
        flags: Flags,
    },
    /// A message was expunged.
    Expunged {
        /// Sequence number of the removed message.
        sequence_number: u64,
    },
    /// Messages were expunged (QRESYNC).
    Vanished {
        /// UIDs of the removed messages.
        uids: Vec<u64>,
    },
    /// The push connection failed; the pusher will reconnect.
    ConnectionLost {
        /// Description of the failure.
        message: String,
    },
    /// The pusher gave up on the folder.
    PushError {
        /// Why pushing stopped.
        message: String,
    },
    /// The server rejected the credentials; the pusher stopped.
    AuthenticationFailed {
        /// Description of the failure.
        message: String,
    },
}
