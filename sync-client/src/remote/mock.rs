//! Mock remote for testing and replay.
//!
//! Serves canned data, injects failures per call and captures presence
//! writes for verification. Push frames queued before the channel opens are
//! delivered as soon as it does.

use super::{FrameReceiver, RemoteService};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use sync_types::{Chat, ChatId, Contact, Message, ParticipantPresence, RemoteError, Session};

/// Minimum capacity of the push channel handed out by the mock.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// The remote operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    /// [`RemoteService::sessions`]
    Sessions,
    /// [`RemoteService::chats`]
    Chats,
    /// [`RemoteService::messages`]
    Messages,
    /// [`RemoteService::contacts`]
    Contacts,
    /// [`RemoteService::presence`]
    Presence,
    /// [`RemoteService::subscribe_presence`]
    SubscribePresence,
    /// [`RemoteService::set_presence`]
    SetPresence,
    /// [`RemoteService::open_events`]
    OpenEvents,
}

/// Mock remote service.
///
/// Cloning shares state, so a test can keep one clone for scripting while
/// the engine owns another.
#[derive(Debug, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    sessions: Vec<Session>,
    chats: Vec<Chat>,
    messages: HashMap<ChatId, Vec<Message>>,
    contacts: Vec<Contact>,
    presence: HashMap<ChatId, Vec<ParticipantPresence>>,
    failures: HashMap<RemoteCall, VecDeque<RemoteError>>,
    calls: HashMap<RemoteCall, usize>,
    message_requests: Vec<(ChatId, usize)>,
    subscriptions: Vec<ChatId>,
    presence_broadcasts: Vec<bool>,
    pending_frames: VecDeque<String>,
    push: Option<mpsc::Sender<String>>,
}

impl MockRemoteInner {
    /// Count the call and pop an injected failure, if any.
    fn begin(&mut self, call: RemoteCall) -> Result<(), RemoteError> {
        *self.calls.entry(call).or_default() += 1;
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl MockRemote {
    /// Create an empty mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockRemoteInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the sessions returned by `sessions()`.
    pub fn set_sessions(&self, sessions: Vec<Session>) {
        self.inner().sessions = sessions;
    }

    /// Set the chat list returned by `chats()`.
    pub fn set_chats(&self, chats: Vec<Chat>) {
        self.inner().chats = chats;
    }

    /// Set the messages returned by `messages(chat, _)`.
    pub fn set_messages(&self, chat: ChatId, messages: Vec<Message>) {
        self.inner().messages.insert(chat, messages);
    }

    /// Set the contacts returned by `contacts()`.
    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        self.inner().contacts = contacts;
    }

    /// Set the presence returned by `presence(chat)`.
    pub fn set_chat_presence(&self, chat: ChatId, presence: Vec<ParticipantPresence>) {
        self.inner().presence.insert(chat, presence);
    }

    /// Make the next call of `call` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, call: RemoteCall, error: RemoteError) {
        self.inner()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Number of times `call` was invoked (failed attempts included).
    pub fn calls(&self, call: RemoteCall) -> usize {
        self.inner().calls.get(&call).copied().unwrap_or(0)
    }

    /// `(chat, limit)` of every successful `messages()` request.
    pub fn message_requests(&self) -> Vec<(ChatId, usize)> {
        self.inner().message_requests.clone()
    }

    /// Chats passed to successful `subscribe_presence()` calls.
    pub fn subscriptions(&self) -> Vec<ChatId> {
        self.inner().subscriptions.clone()
    }

    /// Values passed to successful `set_presence()` calls.
    pub fn presence_broadcasts(&self) -> Vec<bool> {
        self.inner().presence_broadcasts.clone()
    }

    /// Push a frame on the open channel, or queue it until one opens.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let frame = frame.into();
        let mut inner = self.inner();
        let unsent = match &inner.push {
            Some(push) => match push.try_send(frame) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(frame))
                | Err(mpsc::error::TrySendError::Closed(frame)) => frame,
            },
            None => frame,
        };
        // Receiver gone or stalled: hold frames for the next open.
        inner.push = None;
        inner.pending_frames.push_back(unsent);
    }

    /// Frames queued but not yet delivered.
    pub fn pending_frames(&self) -> usize {
        self.inner().pending_frames.len()
    }

    /// Whether a push channel is open.
    pub fn is_streaming(&self) -> bool {
        self.inner()
            .push
            .as_ref()
            .is_some_and(|push| !push.is_closed())
    }

    /// Drop the push channel as if the connection was lost.
    pub fn close_events(&self) {
        self.inner().push = None;
    }
}

impl Clone for MockRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn sessions(&self) -> Result<Vec<Session>, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::Sessions)?;
        Ok(inner.sessions.clone())
    }

    async fn chats(&self) -> Result<Vec<Chat>, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::Chats)?;
        Ok(inner.chats.clone())
    }

    async fn messages(&self, chat: &ChatId, limit: usize) -> Result<Vec<Message>, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::Messages)?;
        inner.message_requests.push((chat.clone(), limit));
        let mut messages = inner.messages.get(chat).cloned().unwrap_or_default();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn contacts(&self) -> Result<Vec<Contact>, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::Contacts)?;
        Ok(inner.contacts.clone())
    }

    async fn presence(&self, chat: &ChatId) -> Result<Vec<ParticipantPresence>, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::Presence)?;
        Ok(inner.presence.get(chat).cloned().unwrap_or_default())
    }

    async fn subscribe_presence(&self, chat: &ChatId) -> Result<(), RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::SubscribePresence)?;
        inner.subscriptions.push(chat.clone());
        Ok(())
    }

    async fn set_presence(&self, online: bool) -> Result<(), RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::SetPresence)?;
        inner.presence_broadcasts.push(online);
        Ok(())
    }

    async fn open_events(&self) -> Result<FrameReceiver, RemoteError> {
        let mut inner = self.inner();
        inner.begin(RemoteCall::OpenEvents)?;

        let capacity = FRAME_CHANNEL_CAPACITY.max(inner.pending_frames.len());
        let (tx, rx) = mpsc::channel(capacity);
        while let Some(frame) = inner.pending_frames.pop_front() {
            // Capacity covers every pending frame.
            let _ = tx.try_send(frame);
        }
        inner.push = Some(tx);
        Ok(rx)
    }
}
