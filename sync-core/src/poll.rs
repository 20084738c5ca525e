//! Gating for the periodic pulls.
//!
//! Two polls run on independent intervals: the chat list and the messages of
//! the foreground chat. [`PollGuard`] decides whether a tick may start a
//! fetch and whether its result is still wanted when it comes back:
//! - Polling only runs while enabled, the session is active and the view is
//!   in the foreground
//! - A tick while the same poll is still in flight is skipped, not queued
//! - A message result for a chat that is no longer foreground is discarded

use sync_types::ChatId;

/// Which periodic pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollTask {
    /// Refresh the chat list.
    ChatList,
    /// Refresh the foreground chat's messages.
    CurrentChat,
}

impl std::fmt::Display for PollTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChatList => f.write_str("chat-list"),
            Self::CurrentChat => f.write_str("current-chat"),
        }
    }
}

/// Proof that a poll was started; hand it back to [`PollGuard::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    /// The poll that started.
    pub task: PollTask,
    /// Chat being refreshed, for [`PollTask::CurrentChat`].
    pub chat: Option<ChatId>,
}

/// In-flight flags and activation conditions for the polls.
#[derive(Debug, Clone)]
pub struct PollGuard {
    enabled: bool,
    session_active: bool,
    foreground: bool,
    current_chat: Option<ChatId>,
    chat_list_in_flight: bool,
    current_chat_in_flight: bool,
}

impl PollGuard {
    /// Create a guard. Polling still waits for an active session.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            session_active: false,
            foreground: true,
            current_chat: None,
            chat_list_in_flight: false,
            current_chat_in_flight: false,
        }
    }

    /// Turn polling on or off entirely.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Record whether the session can serve requests.
    pub fn set_session_active(&mut self, active: bool) {
        self.session_active = active;
    }

    /// Record whether the view is in the foreground.
    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
    }

    /// Record the foreground chat.
    pub fn set_current_chat(&mut self, chat: Option<ChatId>) {
        self.current_chat = chat;
    }

    /// The foreground chat.
    pub fn current_chat(&self) -> Option<&ChatId> {
        self.current_chat.as_ref()
    }

    /// Whether polls may run at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.session_active && self.foreground
    }

    /// Whether `task` has a fetch outstanding.
    pub fn is_in_flight(&self, task: PollTask) -> bool {
        match task {
            PollTask::ChatList => self.chat_list_in_flight,
            PollTask::CurrentChat => self.current_chat_in_flight,
        }
    }

    /// Try to start `task` on a timer tick.
    ///
    /// Returns `None` if polling is inactive, the same poll is already in
    /// flight, or (for messages) no chat is in the foreground.
    pub fn try_begin(&mut self, task: PollTask) -> Option<PollTicket> {
        if !self.is_active() || self.is_in_flight(task) {
            return None;
        }
        let chat = match task {
            PollTask::ChatList => {
                self.chat_list_in_flight = true;
                None
            }
            PollTask::CurrentChat => {
                let chat = self.current_chat.clone()?;
                self.current_chat_in_flight = true;
                Some(chat)
            }
        };
        Some(PollTicket { task, chat })
    }

    /// Mark a poll finished and report whether its result should be applied.
    pub fn finish(&mut self, ticket: &PollTicket) -> bool {
        match ticket.task {
            PollTask::ChatList => {
                self.chat_list_in_flight = false;
                self.session_active
            }
            PollTask::CurrentChat => {
                self.current_chat_in_flight = false;
                self.session_active && ticket.chat.is_some() && ticket.chat == self.current_chat
            }
        }
    }
}

impl Default for PollGuard {
    fn default() -> Self {
        Self::new(true)
    }
}
