//! Push notifications through IMAP IDLE (RFC 2177).
//!
//! Each watched folder gets its own [`FolderPusher`] running on a Tokio task
//! with a dedicated connection. Pushers never touch shared folder state;
//! everything they observe is sent as a [`PushEvent`] over a channel owned by
//! the [`Pusher`].

mod event;
mod folder_pusher;
mod pusher;
mod state;

pub use event::{PushEvent, PushEventKind};
pub use folder_pusher::FolderPusher;
pub use pusher::Pusher;
pub use state::{MemoryPushStateStore, PushState, PushStateStore};
