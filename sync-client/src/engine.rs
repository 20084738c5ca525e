//! The engine actor.
//!
//! One task owns all mirrored state (chats, messages, presence, cache, list
//! diff, poll guards) and processes [`EngineMsg`]s from a single queue, so
//! handlers never run concurrently and no locks are needed.
//!
//! ```text
//! ConnectionManager ─┐
//! Scheduler timers  ─┼──► mpsc<EngineMsg> ──► Engine ──► ViewSink / NotificationSink
//! fetch tasks       ─┤                          │
//! EngineHandle      ─┘                          └── spawn fetch (RetryExecutor + RemoteService)
//! ```
//!
//! Remote reads go through the TTL cache first. Misses are fetched in
//! spawned tasks that post a `Fetched` message back, so a slow remote never
//! blocks event handling.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use sync_core::{
    cache_keys, ActivityTracker, AppendOutcome, ChatCollection, ChatRow, ConnectionStatus,
    ListDiff, MessageStore, PollGuard, PollTask, PollTicket, PresenceBroadcast, PresenceTracker,
    TtlCache,
};
use sync_types::{
    Chat, ChatId, Contact, ErrorKind, EventFrame, Message, ParticipantPresence, PushEvent,
    RemoteError, Session, SessionStatus,
};

use crate::config::EngineOptions;
use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
use crate::error::EngineError;
use crate::now;
use crate::remote::RemoteService;
use crate::retry::RetryExecutor;
use crate::scheduler::{Scheduler, Tick};
use crate::sink::{NewMessageAlert, NotificationSink, ViewChange, ViewSink};

const QUEUE_CAPACITY: usize = 256;

/// Everything the engine task reacts to.
pub(crate) enum EngineMsg {
    Connection(ConnectionEvent),
    Tick(Tick),
    Fetched(Fetched),
    Command(Command),
}

impl From<ConnectionEvent> for EngineMsg {
    fn from(event: ConnectionEvent) -> Self {
        Self::Connection(event)
    }
}

impl From<Tick> for EngineMsg {
    fn from(tick: Tick) -> Self {
        Self::Tick(tick)
    }
}

/// Why a fetch was started; decides how its result and errors are handled.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    /// Initial load, resync or selection.
    Load,
    /// Timer-driven poll.
    Poll(PollTicket),
    /// User asked for it.
    Refresh,
}

pub(crate) enum Fetched {
    Sessions(Result<Vec<Session>, RemoteError>),
    Chats {
        origin: Origin,
        result: Result<Vec<Chat>, RemoteError>,
    },
    Contacts(Result<Vec<Contact>, RemoteError>),
    Messages {
        chat: ChatId,
        origin: Origin,
        result: Result<Vec<Message>, RemoteError>,
    },
    Presence {
        chat: ChatId,
        result: Result<Vec<ParticipantPresence>, RemoteError>,
    },
    Subscribed {
        chat: ChatId,
        result: Result<(), RemoteError>,
    },
    PresenceSet {
        online: bool,
        result: Result<(), RemoteError>,
    },
}

pub(crate) enum Command {
    SelectChat(Option<ChatId>),
    SetForeground(bool),
    UserActivity,
    Refresh,
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Cached remote reads.
#[derive(Debug, Clone)]
enum CachedView {
    Chats(Vec<Chat>),
    Contacts(Vec<Contact>),
    Messages(Vec<Message>),
}

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Push channel status.
    pub connection: ConnectionStatus,
    /// Last known session status.
    pub session_status: Option<SessionStatus>,
    /// Visible chats in display order.
    pub chats: Vec<Chat>,
    /// Foreground chat.
    pub current_chat: Option<ChatId>,
    /// Messages of the foreground chat, newest first.
    pub messages: Vec<Message>,
    /// Visible chats with someone typing.
    pub typing: Vec<ChatId>,
    /// Whether the account is announced online.
    pub online: bool,
}

/// What a batch of push events touched.
#[derive(Debug, Default)]
struct Dirty {
    list: bool,
    current_messages: bool,
    new_in_current: bool,
}

struct Engine<R: RemoteService> {
    remote: Arc<R>,
    options: EngineOptions,
    retry: RetryExecutor,
    tx: mpsc::Sender<EngineMsg>,
    view: Arc<dyn ViewSink>,
    notifications: Arc<dyn NotificationSink>,

    connection: ConnectionStatus,
    session_status: Option<SessionStatus>,
    sessions_in_flight: bool,
    foreground: bool,

    chats: ChatCollection,
    messages: MessageStore,
    contacts: Vec<Contact>,
    presence: PresenceTracker,
    activity: ActivityTracker,
    cache: TtlCache<CachedView>,
    diff: ListDiff,
    poll: PollGuard,
}

impl<R: RemoteService> Engine<R> {
    fn new(
        remote: Arc<R>,
        options: EngineOptions,
        tx: mpsc::Sender<EngineMsg>,
        view: Arc<dyn ViewSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let mut presence = PresenceTracker::new(options.typing_expiry());
        if let Some(account) = &options.account_id {
            presence.set_account(account);
        }
        Self {
            retry: RetryExecutor::new(options.retry.policy()),
            connection: ConnectionStatus::Disconnected,
            session_status: None,
            sessions_in_flight: false,
            foreground: true,
            chats: ChatCollection::new(),
            messages: MessageStore::new(options.max_messages_per_chat),
            contacts: Vec::new(),
            presence,
            activity: ActivityTracker::new(options.idle_timeout(), options.presence_resubscribe()),
            cache: TtlCache::new(options.cache_capacity),
            diff: ListDiff::new(),
            poll: PollGuard::new(options.enable_polling),
            remote,
            options,
            tx,
            view,
            notifications,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EngineMsg>) {
        tracing::info!("Engine started for session {}", self.options.session);

        let connection = ConnectionManager::new(
            Arc::clone(&self.remote),
            ConnectionConfig {
                reconnect: self.options.reconnect_policy(),
                debounce: self.options.debounce(),
                max_batch: self.options.max_batch,
            },
            self.tx.clone(),
        )
        .spawn();
        let mut scheduler = Scheduler::start(&self.options, &self.tx);

        while let Some(msg) = rx.recv().await {
            match msg {
                EngineMsg::Connection(event) => self.on_connection(event),
                EngineMsg::Tick(tick) => self.on_tick(tick),
                EngineMsg::Fetched(fetched) => self.on_fetched(fetched),
                EngineMsg::Command(Command::Shutdown(done)) => {
                    // Unblocks producers waiting on queue capacity.
                    rx.close();
                    scheduler.shutdown();
                    connection.disconnect().await;
                    tracing::info!("Engine stopped");
                    let _ = done.send(());
                    return;
                }
                EngineMsg::Command(command) => self.on_command(command),
            }
        }
    }

    // ============================================================
    // Helpers
    // ============================================================

    fn session_active(&self) -> bool {
        self.session_status.is_some_and(SessionStatus::is_active)
    }

    fn is_current(&self, chat: &ChatId) -> bool {
        self.poll.current_chat() == Some(chat)
    }

    fn spawn_remote<F>(&self, fetch: F)
    where
        F: Future<Output = Fetched> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let fetched = fetch.await;
            if tx.send(EngineMsg::Fetched(fetched)).await.is_err() {
                tracing::debug!("Engine stopped before fetch completed");
            }
        });
    }

    fn render_list(&mut self) {
        let now = now();
        let rows: Vec<ChatRow> = self
            .chats
            .visible()
            .into_iter()
            .map(|chat| ChatRow::from_chat(chat, self.presence.is_typing_at(&chat.id, now)))
            .collect();
        let plan = self.diff.update(&rows);
        if !plan.is_noop() {
            self.view.on_change(ViewChange::list(plan));
        }
    }

    /// Log or surface a failed remote call.
    fn report(&self, origin: &Origin, what: &str, error: RemoteError) {
        match error.kind() {
            ErrorKind::Auth => {
                tracing::warn!("Remote rejected {} request: {}", what, error);
                self.view.on_change(ViewChange::auth_required(Some(error)));
            }
            ErrorKind::NotFound => tracing::debug!("No {} on remote: {}", what, error),
            _ => match origin {
                Origin::Refresh => {
                    tracing::warn!("Refresh of {} failed: {}", what, error);
                    self.view.on_change(ViewChange::error(error));
                }
                Origin::Poll(_) | Origin::Load => {
                    tracing::warn!("Failed to load {}: {}", what, error);
                }
            },
        }
    }

    /// Close out a poll ticket. Returns whether the result is still wanted.
    fn still_wanted(&mut self, origin: &Origin) -> bool {
        match origin {
            Origin::Poll(ticket) => {
                let wanted = self.poll.finish(ticket);
                if !wanted {
                    tracing::debug!("Discarding stale {} poll result", ticket.task);
                }
                wanted
            }
            Origin::Load | Origin::Refresh => true,
        }
    }

    // ============================================================
    // Connection
    // ============================================================

    fn on_connection(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Status(status) => {
                let degraded = matches!(status, ConnectionStatus::ReconnectScheduled { .. });
                self.connection = status;
                self.view.on_change(ViewChange::other());
                // Polling can still serve the view without a push channel.
                if degraded && self.session_status.is_none() {
                    self.load_sessions();
                }
            }
            ConnectionEvent::Batch(frames) => self.apply_batch(frames),
            ConnectionEvent::Resync => self.resync(),
        }
    }

    fn resync(&mut self) {
        tracing::info!("Resyncing session {}", self.options.session);
        let session = &self.options.session;
        self.cache.remove(&cache_keys::chats(session));
        self.cache.invalidate(&cache_keys::all_messages(session));
        self.activity.reset_subscriptions();
        self.load_sessions();
        if let Some(chat) = self.poll.current_chat().cloned() {
            self.load_messages(chat, Origin::Load);
        }
    }

    fn apply_batch(&mut self, frames: Vec<EventFrame>) {
        tracing::debug!("Applying batch of {} events", frames.len());
        let mut dirty = Dirty::default();
        for frame in frames {
            if let Some(session) = &frame.session {
                if *session != self.options.session {
                    tracing::debug!("Ignoring {} event for session {}", frame.event.name(), session);
                    continue;
                }
            }
            self.apply_event(frame.event, &mut dirty);
        }

        if dirty.list {
            self.render_list();
        }
        if let Some(chat) = self.poll.current_chat().cloned() {
            if dirty.new_in_current {
                self.view.on_change(ViewChange::scroll(chat));
            } else if dirty.current_messages {
                self.view.on_change(ViewChange::messages(chat));
            }
        }
    }

    fn apply_event(&mut self, event: PushEvent, dirty: &mut Dirty) {
        match event {
            PushEvent::Message(msg) | PushEvent::MessageAny(msg) => self.apply_message(msg, dirty),
            PushEvent::MessageAck {
                chat_id,
                message_id,
                ack,
            } => {
                self.invalidate_chat(&chat_id, true);
                if self.messages.update_ack(&chat_id, &message_id, ack) && self.is_current(&chat_id) {
                    dirty.current_messages = true;
                }
                dirty.list |= self.chats.update_last_ack(&chat_id, &message_id, ack);
            }
            PushEvent::MessageReaction {
                chat_id,
                message_id,
                sender,
                emoji,
            } => {
                self.invalidate_chat(&chat_id, false);
                if self.messages.update_reaction(&chat_id, &message_id, &sender, &emoji)
                    && self.is_current(&chat_id)
                {
                    dirty.current_messages = true;
                }
            }
            PushEvent::MessageRevoked {
                chat_id,
                message_id,
            } => {
                self.invalidate_chat(&chat_id, true);
                if self.messages.mark_revoked(&chat_id, &message_id) && self.is_current(&chat_id) {
                    dirty.current_messages = true;
                }
                dirty.list |= self.chats.mark_last_revoked(&chat_id, &message_id);
            }
            PushEvent::PresenceUpdate { chat_id, presences } => {
                dirty.list |= self.presence.apply(&chat_id, &presences, now());
            }
            PushEvent::SessionStatus { status } => {
                if self.set_session_status(status) {
                    self.load_sessions();
                }
            }
            PushEvent::ChatArchive { chat_id, archived } => {
                self.invalidate_chat(&chat_id, true);
                dirty.list |= self.chats.set_archived(&chat_id, archived);
            }
            PushEvent::ChatDelete { chat_id } => {
                tracing::info!("Chat {} deleted remotely", chat_id);
                dirty.list |= self.chats.remove(&chat_id).is_some();
                self.messages.remove_chat(&chat_id);
                self.presence.remove_chat(&chat_id);
                self.invalidate_chat(&chat_id, true);
                if self.is_current(&chat_id) {
                    self.select_chat(None);
                }
            }
            PushEvent::Unrecognized { name } => {
                tracing::debug!("Ignoring unrecognized event {}", name);
            }
        }
    }

    fn apply_message(&mut self, msg: Message, dirty: &mut Dirty) {
        let chat_id = msg.chat_id.clone();
        let current = self.is_current(&chat_id);
        let in_view = current && self.foreground;

        let outcome = self.messages.append_message(msg.clone());
        let inserted = outcome == AppendOutcome::Inserted;

        if !self.presence.clear_typing_for_sender(&msg.sender).is_empty() {
            dirty.list = true;
        }
        let count_unread = inserted && !msg.from_me && !in_view;
        dirty.list |= self.chats.bump_last_message(&msg, count_unread);

        if inserted {
            self.invalidate_chat(&chat_id, true);
        }
        if current {
            if inserted {
                dirty.new_in_current = true;
            } else if outcome.changed() {
                dirty.current_messages = true;
            }
        }
        if inserted && !msg.from_me && !in_view {
            self.notify(&msg);
        }
    }

    /// Drop cached reads a push mutation of `chat` made stale, so the next
    /// load or poll asks the remote instead of merging an old snapshot back.
    fn invalidate_chat(&mut self, chat: &ChatId, list: bool) {
        let session = &self.options.session;
        self.cache.remove(&cache_keys::messages(session, chat));
        if list {
            self.cache.remove(&cache_keys::chats(session));
        }
    }

    fn notify(&self, msg: &Message) {
        if !self.options.notifications_enabled {
            return;
        }
        let chat = self.chats.get(&msg.chat_id);
        if chat.is_some_and(|c| c.muted) {
            return;
        }
        let chat_name = chat.map_or_else(|| msg.chat_id.to_string(), |c| c.name.clone());
        self.notifications.notify(NewMessageAlert {
            chat_id: msg.chat_id.clone(),
            chat_name,
            sender: msg.sender.clone(),
            preview: msg.preview(),
            is_group: msg.chat_id.is_group(),
            is_status: msg.chat_id.is_status(),
        });
    }

    /// Record a session status. Returns true if the session just became active.
    fn set_session_status(&mut self, status: SessionStatus) -> bool {
        let previous = self.session_status.replace(status);
        self.poll.set_session_active(status.is_active());
        if previous == Some(status) {
            return false;
        }
        tracing::info!("Session {} is now {:?}", self.options.session, status);
        if status == SessionStatus::AwaitingPairing {
            self.view.on_change(ViewChange::auth_required(None));
        } else {
            self.view.on_change(ViewChange::view());
        }
        status.is_active() && !previous.is_some_and(SessionStatus::is_active)
    }

    // ============================================================
    // Loads
    // ============================================================

    fn load_sessions(&mut self) {
        if self.sessions_in_flight {
            return;
        }
        self.sessions_in_flight = true;
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move { Fetched::Sessions(retry.run(|| remote.sessions()).await) });
    }

    fn load_chats(&mut self, origin: Origin) {
        let key = cache_keys::chats(&self.options.session);
        if let Some(CachedView::Chats(chats)) = self.cache.get_at(&key, now()) {
            tracing::debug!("Chat list served from cache");
            self.on_chats(origin, Ok(chats));
            return;
        }
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move {
            let result = retry.run(|| remote.chats()).await;
            Fetched::Chats { origin, result }
        });
    }

    fn load_contacts(&mut self) {
        let key = cache_keys::contacts(&self.options.session);
        if let Some(CachedView::Contacts(contacts)) = self.cache.get_at(&key, now()) {
            self.on_contacts(Ok(contacts));
            return;
        }
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move { Fetched::Contacts(retry.run(|| remote.contacts()).await) });
    }

    fn load_messages(&mut self, chat: ChatId, origin: Origin) {
        let key = cache_keys::messages(&self.options.session, &chat);
        if let Some(CachedView::Messages(messages)) = self.cache.get_at(&key, now()) {
            tracing::debug!("Messages of {} served from cache", chat);
            self.on_messages(chat, origin, Ok(messages));
            return;
        }
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        let limit = self.options.message_page_size;
        self.spawn_remote(async move {
            let result = retry.run(|| remote.messages(&chat, limit)).await;
            Fetched::Messages {
                chat,
                origin,
                result,
            }
        });
    }

    fn load_presence(&mut self, chat: ChatId) {
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move {
            let result = retry.run(|| remote.presence(&chat)).await;
            Fetched::Presence { chat, result }
        });
    }

    /// Re-assert presence interest in the foreground chat if due.
    fn resubscribe_presence(&mut self) {
        if !self.session_active() {
            return;
        }
        let Some(chat) = self.poll.current_chat().cloned() else {
            return;
        };
        let now = now();
        if !self.activity.subscription_due(&chat, now) {
            return;
        }
        self.activity.mark_subscribed(&chat, now);
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move {
            let result = retry.run(|| remote.subscribe_presence(&chat)).await;
            Fetched::Subscribed { chat, result }
        });
    }

    fn broadcast_presence(&self, online: bool) {
        tracing::debug!("Announcing account {}", if online { "online" } else { "offline" });
        let remote = Arc::clone(&self.remote);
        let retry = self.retry;
        self.spawn_remote(async move {
            let result = retry.run(|| remote.set_presence(online)).await;
            Fetched::PresenceSet { online, result }
        });
    }

    // ============================================================
    // Fetch results
    // ============================================================

    fn on_fetched(&mut self, fetched: Fetched) {
        let session = self.options.session.clone();
        let now = now();
        let ttl = self.options.cache_ttl();
        match fetched {
            Fetched::Sessions(result) => self.on_sessions(result),
            Fetched::Chats { origin, result } => {
                if let Ok(chats) = &result {
                    self.cache
                        .set_at(cache_keys::chats(&session), CachedView::Chats(chats.clone()), ttl, now);
                }
                self.on_chats(origin, result);
            }
            Fetched::Contacts(result) => {
                if let Ok(contacts) = &result {
                    self.cache.set_at(
                        cache_keys::contacts(&session),
                        CachedView::Contacts(contacts.clone()),
                        ttl,
                        now,
                    );
                }
                self.on_contacts(result);
            }
            Fetched::Messages {
                chat,
                origin,
                result,
            } => {
                if let Ok(messages) = &result {
                    self.cache.set_at(
                        cache_keys::messages(&session, &chat),
                        CachedView::Messages(messages.clone()),
                        ttl,
                        now,
                    );
                }
                self.on_messages(chat, origin, result);
            }
            Fetched::Presence { chat, result } => match result {
                Ok(presences) => {
                    if self.presence.apply(&chat, &presences, now) {
                        self.render_list();
                    }
                }
                Err(e) => self.report(&Origin::Load, "presence", e),
            },
            Fetched::Subscribed { chat, result } => {
                if let Err(e) = result {
                    tracing::warn!("Presence subscription for {} failed: {}", chat, e);
                }
            }
            Fetched::PresenceSet { online, result } => {
                if let Err(e) = result {
                    tracing::warn!("Failed to announce online={}: {}", online, e);
                }
            }
        }
    }

    fn on_sessions(&mut self, result: Result<Vec<Session>, RemoteError>) {
        self.sessions_in_flight = false;
        let sessions = match result {
            Ok(sessions) => sessions,
            Err(e) => {
                self.report(&Origin::Load, "sessions", e);
                return;
            }
        };
        let Some(session) = sessions
            .into_iter()
            .find(|s| s.name == self.options.session)
        else {
            tracing::warn!("Session {} not found on remote", self.options.session);
            self.poll.set_session_active(false);
            return;
        };

        let account = self
            .options
            .account_id
            .clone()
            .or_else(|| session.me.as_ref().map(|me| me.id.clone()));
        if let Some(account) = account {
            self.presence.set_account(&account);
        }

        self.set_session_status(session.status);
        if session.status.is_active() {
            self.load_chats(Origin::Load);
            self.load_contacts();
            self.resubscribe_presence();
        }
    }

    fn on_chats(&mut self, origin: Origin, result: Result<Vec<Chat>, RemoteError>) {
        if !self.still_wanted(&origin) {
            return;
        }
        match result {
            Ok(chats) => {
                tracing::debug!("Loaded {} chats", chats.len());
                self.chats.apply_snapshot(chats);
                self.chats.apply_contact_names(&self.contacts);
                self.render_list();
            }
            Err(e) => self.report(&origin, "chat list", e),
        }
    }

    fn on_contacts(&mut self, result: Result<Vec<Contact>, RemoteError>) {
        match result {
            Ok(contacts) => {
                self.contacts = contacts;
                if self.chats.apply_contact_names(&self.contacts) {
                    self.render_list();
                }
            }
            Err(e) => self.report(&Origin::Load, "contacts", e),
        }
    }

    fn on_messages(&mut self, chat: ChatId, origin: Origin, result: Result<Vec<Message>, RemoteError>) {
        if !self.still_wanted(&origin) {
            return;
        }
        match result {
            Ok(messages) => {
                let changed = self.messages.set_messages(&chat, messages);
                let latest = self.messages.latest(&chat).cloned();
                if let Some(latest) = latest {
                    if self.chats.bump_last_message(&latest, false) {
                        self.render_list();
                    }
                }
                if changed && self.is_current(&chat) {
                    self.view.on_change(ViewChange::messages(chat));
                }
            }
            Err(e) => self.report(&origin, "messages", e),
        }
    }

    // ============================================================
    // Timers
    // ============================================================

    fn on_tick(&mut self, tick: Tick) {
        match tick {
            Tick::Poll(task) => self.poll_tick(task),
            Tick::ActivityCheck => {
                let now = now();
                if let Some(PresenceBroadcast::Offline) = self.activity.check_idle(now) {
                    self.broadcast_presence(false);
                }
                if !self.presence.expire_typing(now).is_empty() {
                    self.render_list();
                }
            }
            Tick::PresenceResubscribe => self.resubscribe_presence(),
        }
    }

    fn poll_tick(&mut self, task: PollTask) {
        let Some(ticket) = self.poll.try_begin(task) else {
            return;
        };
        tracing::debug!("Polling {}", task);
        match ticket.chat.clone() {
            Some(chat) => self.load_messages(chat, Origin::Poll(ticket)),
            None => self.load_chats(Origin::Poll(ticket)),
        }
    }

    // ============================================================
    // Commands
    // ============================================================

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SelectChat(chat) => self.select_chat(chat),
            Command::SetForeground(foreground) => self.set_foreground(foreground),
            Command::UserActivity => {
                if self.session_active() {
                    if let Some(PresenceBroadcast::Online) = self.activity.record_activity(now()) {
                        self.broadcast_presence(true);
                    }
                }
            }
            Command::Refresh => self.refresh(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop.
            Command::Shutdown(_) => {}
        }
    }

    fn select_chat(&mut self, chat: Option<ChatId>) {
        self.poll.set_current_chat(chat.clone());
        let plan = self.diff.select(chat.clone());
        if plan.is_noop() {
            return;
        }
        self.view.on_change(ViewChange::selection(plan, chat.clone()));

        let Some(chat) = chat else {
            return;
        };
        if self.foreground && self.chats.mark_read(&chat) {
            self.render_list();
        }
        self.load_messages(chat.clone(), Origin::Load);
        if self.session_active() {
            self.load_presence(chat);
            self.resubscribe_presence();
        }
    }

    fn set_foreground(&mut self, foreground: bool) {
        if self.foreground == foreground {
            return;
        }
        self.foreground = foreground;
        self.poll.set_foreground(foreground);
        if foreground {
            if let Some(chat) = self.poll.current_chat().cloned() {
                if self.chats.mark_read(&chat) {
                    self.render_list();
                }
            }
        }
        self.view.on_change(ViewChange::view());
    }

    fn refresh(&mut self) {
        tracing::info!("Refresh requested");
        let session = self.options.session.clone();
        self.cache.remove(&cache_keys::chats(&session));
        self.load_chats(Origin::Refresh);
        if let Some(chat) = self.poll.current_chat().cloned() {
            self.cache.remove(&cache_keys::messages(&session, &chat));
            self.load_messages(chat, Origin::Refresh);
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let now = now();
        let chats: Vec<Chat> = self.chats.visible().into_iter().cloned().collect();
        let typing = chats
            .iter()
            .filter(|chat| self.presence.is_typing_at(&chat.id, now))
            .map(|chat| chat.id.clone())
            .collect();
        let current_chat = self.poll.current_chat().cloned();
        let messages = current_chat
            .as_ref()
            .map(|chat| self.messages.messages(chat).to_vec())
            .unwrap_or_default();
        EngineSnapshot {
            connection: self.connection.clone(),
            session_status: self.session_status,
            chats,
            current_chat,
            messages,
            typing,
            online: self.activity.is_online(),
        }
    }
}

/// Handle to a running engine.
///
/// Dropping the handle without [`shutdown`](Self::shutdown) aborts the
/// engine task.
#[derive(Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Validate `options` and start the engine on the current runtime.
    ///
    /// The engine connects the push channel, starts its timers and loads
    /// the session as soon as the channel opens.
    pub fn start<R: RemoteService>(
        remote: Arc<R>,
        options: EngineOptions,
        view: Arc<dyn ViewSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        options.validate()?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let engine = Engine::new(remote, options, tx.clone(), view, notifications);
        let task = tokio::spawn(engine.run(rx));
        Ok(Self {
            tx,
            task: Some(task),
        })
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.tx
            .send(EngineMsg::Command(command))
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Bring `chat` to the foreground, or clear the selection.
    pub async fn select_chat(&self, chat: Option<ChatId>) -> Result<(), EngineError> {
        self.send(Command::SelectChat(chat)).await
    }

    /// Report whether the view is visible to the user.
    pub async fn set_foreground(&self, foreground: bool) -> Result<(), EngineError> {
        self.send(Command::SetForeground(foreground)).await
    }

    /// Report user input (keeps the account online).
    pub async fn user_activity(&self) -> Result<(), EngineError> {
        self.send(Command::UserActivity).await
    }

    /// Reload the chat list and foreground chat, bypassing the cache.
    ///
    /// Failures are surfaced through the view sink.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        self.send(Command::Refresh).await
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Disconnect, stop all timers and end the engine task.
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Shutdown(done)).await?;
        let _ = rx.await;
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| EngineError::Stopped)?;
        }
        Ok(())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemote, RemoteCall};
    use crate::sink::ChangeKind;
    use std::time::Duration;
    use sync_core::{RenderPlan, RowRef};
    use sync_types::{LastMessage, SessionMe};

    struct Harness {
        remote: MockRemote,
        handle: EngineHandle,
        views: mpsc::UnboundedReceiver<ViewChange>,
        alerts: mpsc::UnboundedReceiver<NewMessageAlert>,
    }

    impl Harness {
        fn views(&mut self) -> Vec<ViewChange> {
            let mut changes = Vec::new();
            while let Ok(change) = self.views.try_recv() {
                changes.push(change);
            }
            changes
        }

        fn alerts(&mut self) -> Vec<NewMessageAlert> {
            let mut alerts = Vec::new();
            while let Ok(alert) = self.alerts.try_recv() {
                alerts.push(alert);
            }
            alerts
        }
    }

    fn session(status: SessionStatus) -> Session {
        Session {
            name: "default".into(),
            status,
            me: Some(SessionMe {
                id: "me@c.us".into(),
                push_name: None,
            }),
        }
    }

    fn chat(id: &str, last_timestamp: u64) -> Chat {
        let mut chat = Chat::new(ChatId::from(id));
        chat.last_message = Some(LastMessage {
            id: format!("last-{}", id),
            timestamp: last_timestamp,
            ack: Default::default(),
            from_me: false,
            preview: String::new(),
        });
        chat
    }

    fn message_frame(chat: &str, id: &str, timestamp: u64, body: &str) -> String {
        format!(
            r#"{{"event":"message","session":"default","payload":{{"id":"{}","timestamp":{},"from":"{}","to":"me@c.us","body":"{}"}}}}"#,
            id, timestamp, chat, body
        )
    }

    fn typing_frame(chat: &str, participant: &str) -> String {
        format!(
            r#"{{"event":"presence.update","session":"default","payload":{{"id":"{}","presences":[{{"participant":"{}","lastKnownPresence":"composing"}}]}}}}"#,
            chat, participant
        )
    }

    fn quiet_options() -> EngineOptions {
        EngineOptions {
            enable_polling: false,
            ..EngineOptions::default()
        }
    }

    fn working_remote(chats: Vec<Chat>) -> MockRemote {
        let remote = MockRemote::new();
        remote.set_sessions(vec![session(SessionStatus::Working)]);
        remote.set_chats(chats);
        remote
    }

    async fn start(remote: MockRemote, options: EngineOptions) -> Harness {
        let (view_tx, views) = mpsc::unbounded_channel();
        let (alert_tx, alerts) = mpsc::unbounded_channel();
        let handle = EngineHandle::start(
            Arc::new(remote.clone()),
            options,
            Arc::new(view_tx),
            Arc::new(alert_tx),
        )
        .unwrap();
        settle().await;
        Harness {
            remote,
            handle,
            views,
            alerts,
        }
    }

    /// Let spawned tasks and the debounce window run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    fn list_plans(changes: &[ViewChange]) -> Vec<RenderPlan> {
        changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Data && c.chat.is_none())
            .map(|c| c.plan.clone())
            .collect()
    }

    fn ids(chats: &[Chat]) -> Vec<&str> {
        chats.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn initial_sync_loads_session_and_chats() {
        let remote = working_remote(vec![chat("a@c.us", 100), chat("b@c.us", 200)]);
        let mut h = start(remote, quiet_options()).await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionStatus::Connected);
        assert_eq!(snapshot.session_status, Some(SessionStatus::Working));
        assert_eq!(ids(&snapshot.chats), vec!["b@c.us", "a@c.us"]);
        assert_eq!(list_plans(&h.views()), vec![RenderPlan::Rebuild]);
        assert_eq!(h.remote.calls(RemoteCall::Contacts), 1);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_patches_one_row_and_notifies() {
        let remote = working_remote(vec![
            chat("a@c.us", 200),
            chat("b@c.us", 300),
            chat("c@c.us", 100),
        ]);
        let mut h = start(remote, quiet_options()).await;
        h.views();

        h.remote.push_frame(message_frame("b@c.us", "m1", 400, "hello"));
        settle().await;

        assert_eq!(
            list_plans(&h.views()),
            vec![RenderPlan::Patch {
                rows: vec![RowRef {
                    index: 0,
                    id: ChatId::from("b@c.us"),
                }],
            }]
        );
        let alerts = h.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].chat_id, ChatId::from("b@c.us"));
        assert_eq!(alerts[0].preview, "hello");
        assert!(!alerts[0].is_group);

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.chats[0].unread_count, 1);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_push_is_applied_once() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let mut h = start(remote, quiet_options()).await;
        h.handle.select_chat(Some(ChatId::from("a@c.us"))).await.unwrap();
        settle().await;

        h.remote.push_frame(message_frame("a@c.us", "m1", 400, "hi"));
        h.remote.push_frame(message_frame("a@c.us", "m1", 400, "hi"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert!(h.alerts().is_empty());

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_chat_scrolls_instead_of_notifying() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let mut h = start(remote, quiet_options()).await;
        h.handle.select_chat(Some(ChatId::from("a@c.us"))).await.unwrap();
        settle().await;
        h.views();

        h.remote.push_frame(message_frame("a@c.us", "m1", 400, "hi"));
        settle().await;

        let changes = h.views();
        assert!(changes
            .iter()
            .any(|c| c.kind == ChangeKind::Scroll && c.chat == Some(ChatId::from("a@c.us"))));
        assert!(h.alerts().is_empty());
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.chats[0].unread_count, 0);

        // In the background the same chat notifies again.
        h.handle.set_foreground(false).await.unwrap();
        h.remote.push_frame(message_frame("a@c.us", "m2", 500, "there"));
        settle().await;
        assert_eq!(h.alerts().len(), 1);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn muted_chats_and_disabled_notifications_stay_quiet() {
        let mut muted = chat("a@c.us", 100);
        muted.muted = true;
        let remote = working_remote(vec![muted]);
        let mut h = start(remote, quiet_options()).await;

        h.remote.push_frame(message_frame("a@c.us", "m1", 400, "hi"));
        settle().await;
        assert!(h.alerts().is_empty());
        h.handle.shutdown().await.unwrap();

        let remote = working_remote(vec![chat("b@c.us", 100)]);
        let options = EngineOptions {
            notifications_enabled: false,
            ..quiet_options()
        };
        let mut h = start(remote, options).await;
        h.remote.push_frame(message_frame("b@c.us", "m1", 400, "hi"));
        settle().await;
        assert!(h.alerts().is_empty());
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn message_reads_are_cached_until_a_new_message_arrives() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;
        let a = ChatId::from("a@c.us");

        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests(), vec![(a.clone(), 50)]);

        h.remote.push_frame(message_frame("b@c.us", "m1", 400, "hi"));
        settle().await;
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests().len(), 1);

        h.remote.push_frame(message_frame("a@c.us", "m2", 500, "hi"));
        settle().await;
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests().len(), 2);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_refreshes_the_foreground_chat() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let a = ChatId::from("a@c.us");
        let h = start(remote, EngineOptions::default()).await;
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;

        let incoming = Message {
            id: "m9".into(),
            chat_id: a.clone(),
            timestamp: 900,
            sender: "a@c.us".into(),
            from_me: false,
            body: "polled".into(),
            ack: sync_types::Ack::Delivered,
            reactions: Default::default(),
            revoked: false,
        };
        h.remote.set_messages(a.clone(), vec![incoming]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].body, "polled");
        assert_eq!(snapshot.chats[0].last_message.as_ref().unwrap().id, "m9");

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_prompts_for_reauthentication() {
        let remote = working_remote(vec![]);
        remote.fail_next(RemoteCall::Chats, RemoteError::Auth("token expired".into()));
        let mut h = start(remote, quiet_options()).await;

        let changes = h.views();
        let prompt = changes.iter().find(|c| c.auth_required).unwrap();
        assert_eq!(prompt.kind, ChangeKind::View);
        assert_eq!(prompt.error, Some(RemoteError::Auth("token expired".into())));
        assert_eq!(h.remote.calls(RemoteCall::Chats), 1);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_session_prompts_without_loading_chats() {
        let remote = MockRemote::new();
        remote.set_sessions(vec![session(SessionStatus::AwaitingPairing)]);
        let mut h = start(remote, quiet_options()).await;

        assert!(h.views().iter().any(|c| c.auth_required && c.error.is_none()));
        assert_eq!(h.remote.calls(RemoteCall::Chats), 0);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_refresh_surfaces_errors() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let mut h = start(remote, quiet_options()).await;
        h.views();

        for _ in 0..3 {
            h.remote.fail_next(
                RemoteCall::Chats,
                RemoteError::Server {
                    status: 503,
                    message: "unavailable".into(),
                },
            );
        }
        h.handle.refresh().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let changes = h.views();
        let failure = changes.iter().find(|c| c.error.is_some()).unwrap();
        assert_eq!(failure.kind, ChangeKind::Other);
        assert!(!failure.auth_required);
        assert_eq!(h.remote.calls(RemoteCall::Chats), 4);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn typing_shows_until_the_sender_posts() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;
        let a = ChatId::from("a@c.us");

        h.remote.push_frame(typing_frame("a@c.us", "me@c.us"));
        settle().await;
        assert!(h.handle.snapshot().await.unwrap().typing.is_empty());

        h.remote.push_frame(typing_frame("a@c.us", "a@c.us"));
        settle().await;
        assert_eq!(h.handle.snapshot().await.unwrap().typing, vec![a.clone()]);

        h.remote.push_frame(message_frame("a@c.us", "m1", 400, "done typing"));
        settle().await;
        assert!(h.handle.snapshot().await.unwrap().typing.is_empty());

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_typing_expires_on_activity_check() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;

        h.remote.push_frame(typing_frame("a@c.us", "a@c.us"));
        settle().await;
        assert_eq!(h.handle.snapshot().await.unwrap().typing.len(), 1);

        tokio::time::sleep(Duration::from_secs(36)).await;
        assert!(h.handle.snapshot().await.unwrap().typing.is_empty());

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_account_goes_offline() {
        let remote = working_remote(vec![]);
        let h = start(remote, quiet_options()).await;

        h.handle.user_activity().await.unwrap();
        h.handle.user_activity().await.unwrap();
        settle().await;
        assert_eq!(h.remote.presence_broadcasts(), vec![true]);
        assert!(h.handle.snapshot().await.unwrap().online);

        tokio::time::sleep(Duration::from_secs(36)).await;
        assert_eq!(h.remote.presence_broadcasts(), vec![true, false]);
        assert!(!h.handle.snapshot().await.unwrap().online);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_a_chat_subscribes_to_its_presence_once() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;
        let a = ChatId::from("a@c.us");

        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;

        assert_eq!(h.remote.subscriptions(), vec![a.clone()]);
        assert_eq!(h.remote.calls(RemoteCall::Presence), 2);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn presence_is_resubscribed_one_interval_after_selection() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;
        let a = ChatId::from("a@c.us");

        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.subscriptions().len(), 1);

        tokio::time::sleep(Duration::from_secs(298)).await;
        assert_eq!(h.remote.subscriptions().len(), 1);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(h.remote.subscriptions(), vec![a.clone(), a.clone()]);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn removed_reaction_is_not_restored_by_the_next_poll() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let a = ChatId::from("a@c.us");
        let mut message = Message {
            id: "m1".into(),
            chat_id: a.clone(),
            timestamp: 500,
            sender: "a@c.us".into(),
            from_me: false,
            body: "lunch?".into(),
            ack: sync_types::Ack::Delivered,
            reactions: Default::default(),
            revoked: false,
        };
        message.reactions.set("a@c.us", "X");
        remote.set_messages(a.clone(), vec![message.clone()]);

        let h = start(remote, EngineOptions::default()).await;
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.messages[0].reactions.get("a@c.us"), Some("X"));

        h.remote.push_frame(
            r#"{"event":"message.reaction","session":"default","payload":{"from":"a@c.us",
                "reaction":{"text":"","messageId":"m1"}}}"#,
        );
        settle().await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert!(snapshot.messages[0].reactions.is_empty());

        message.reactions = Default::default();
        h.remote.set_messages(a.clone(), vec![message]);

        // Next message poll at 3 s, inside the 5 s cache lifetime.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(h.remote.message_requests().len(), 2);
        assert!(snapshot.messages[0].reactions.is_empty());

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn push_mutations_drop_cached_reads() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let a = ChatId::from("a@c.us");
        let h = start(remote, quiet_options()).await;
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests().len(), 1);

        // Reselecting within the cache lifetime is served locally.
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests().len(), 1);

        h.remote.push_frame(
            r#"{"event":"message.ack","session":"default","payload":{"id":"m1","from":"a@c.us","ack":3}}"#,
        );
        settle().await;
        h.handle.select_chat(None).await.unwrap();
        h.handle.select_chat(Some(a.clone())).await.unwrap();
        settle().await;
        assert_eq!(h.remote.message_requests().len(), 2);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn archive_and_delete_events_update_the_list() {
        let remote = working_remote(vec![chat("a@c.us", 100), chat("b@c.us", 200)]);
        let h = start(remote, quiet_options()).await;
        h.handle.select_chat(Some(ChatId::from("b@c.us"))).await.unwrap();
        settle().await;

        h.remote.push_frame(
            r#"{"event":"chat.archive","session":"default","payload":{"id":"a@c.us","archived":true}}"#,
        );
        h.remote
            .push_frame(r#"{"event":"chat.delete","session":"default","payload":{"id":"b@c.us"}}"#);
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert!(snapshot.chats.is_empty());
        assert_eq!(snapshot.current_chat, None);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_other_sessions_are_ignored() {
        let remote = working_remote(vec![]);
        let h = start(remote, quiet_options()).await;

        h.remote.push_frame(
            r#"{"event":"message","session":"other","payload":{"id":"m1","timestamp":1,"from":"x@c.us","body":"hi"}}"#,
        );
        settle().await;
        assert!(h.handle.snapshot().await.unwrap().chats.is_empty());

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resyncs_the_session() {
        let remote = working_remote(vec![chat("a@c.us", 100)]);
        let h = start(remote, quiet_options()).await;
        assert_eq!(h.remote.calls(RemoteCall::Sessions), 1);

        h.remote.close_events();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.remote.calls(RemoteCall::OpenEvents), 2);
        assert_eq!(h.remote.calls(RemoteCall::Sessions), 2);
        assert_eq!(h.remote.calls(RemoteCall::Chats), 2);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_terminal() {
        let remote = working_remote(vec![]);
        let h = start(remote.clone(), EngineOptions::default()).await;
        let handle = h.handle;

        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(remote.calls(RemoteCall::OpenEvents), 1);
        assert_eq!(remote.calls(RemoteCall::Chats), 1);
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let options = EngineOptions {
            cache_capacity: 0,
            ..EngineOptions::default()
        };
        let result = EngineHandle::start(
            Arc::new(MockRemote::new()),
            options,
            Arc::new(crate::sink::Discard),
            Arc::new(crate::sink::Discard),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
