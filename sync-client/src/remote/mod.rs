//! Remote service abstraction.
//!
//! The engine talks to the messaging backend only through [`RemoteService`].
//! An implementation is bound to one session and exposes:
//! - request/response reads (sessions, chats, messages, contacts, presence)
//! - presence writes (subscribe to a chat, announce online/offline)
//! - [`open_events`](RemoteService::open_events), the push channel
//!
//! # Push channel
//!
//! `open_events` yields a receiver of raw text frames, each one JSON object
//! `{"event": ..., "session": ..., "payload": {...}}`. The channel closing
//! (the receiver returning `None`) means the connection dropped; the
//! connection manager then reconnects with backoff.
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! let chats = remote.chats().await?;
//! let mut frames = remote.open_events().await?;
//! while let Some(text) = frames.recv().await { /* decode */ }
//! ```

mod mock;

pub use mock::{MockRemote, RemoteCall};

use async_trait::async_trait;
use tokio::sync::mpsc;

use sync_types::{Chat, ChatId, Contact, Message, ParticipantPresence, RemoteError, Session};

/// Receiving end of the push channel.
pub type FrameReceiver = mpsc::Receiver<String>;

/// The messaging backend, bound to one session.
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// All sessions known to the backend.
    async fn sessions(&self) -> Result<Vec<Session>, RemoteError>;

    /// Chat list of the session.
    async fn chats(&self) -> Result<Vec<Chat>, RemoteError>;

    /// The latest `limit` messages of `chat`.
    async fn messages(&self, chat: &ChatId, limit: usize) -> Result<Vec<Message>, RemoteError>;

    /// Address book of the session.
    async fn contacts(&self) -> Result<Vec<Contact>, RemoteError>;

    /// Current presence of `chat`'s participants.
    async fn presence(&self, chat: &ChatId) -> Result<Vec<ParticipantPresence>, RemoteError>;

    /// Ask the backend to push presence updates for `chat`.
    async fn subscribe_presence(&self, chat: &ChatId) -> Result<(), RemoteError>;

    /// Announce the account as online or offline.
    async fn set_presence(&self, online: bool) -> Result<(), RemoteError>;

    /// Open the push channel.
    async fn open_events(&self) -> Result<FrameReceiver, RemoteError>;
}
