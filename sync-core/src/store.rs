//! Per-chat message lists.
//!
//! Messages arrive from two sources that race each other: full snapshots
//! from the pull channel and single messages or mutations from the push
//! channel. Every operation here is a merge, so applying the same input
//! twice or in a different order converges to the same list.
//!
//! Lists are kept newest first, ordered by `(timestamp, id)` descending,
//! never hold two messages with the same id, and are capped per chat.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use sync_types::{Ack, ChatId, Message};

/// Default per-chat cap.
pub const DEFAULT_MAX_PER_CHAT: usize = 500;

/// Result of [`MessageStore::append_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new message was added.
    Inserted,
    /// An existing message with the same id was updated.
    Replaced,
    /// Nothing changed (identical duplicate, or older than the capped window).
    Unchanged,
}

impl AppendOutcome {
    /// Whether the store changed.
    pub fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

/// Newest-first display order.
fn display_order(a: &Message, b: &Message) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.id.cmp(&a.id))
}

/// Merge an incoming copy of a message with the locally-held one.
///
/// Incoming content wins, except that an empty reaction set falls back to
/// the local reactions, the ack only moves forward and revocation sticks.
fn merge(local: &Message, mut incoming: Message) -> Message {
    if incoming.reactions.is_empty() {
        incoming.reactions = local.reactions.clone();
    }
    incoming.ack = local.ack.advance(incoming.ack);
    incoming.revoked |= local.revoked;
    incoming
}

/// Message lists for every known chat.
#[derive(Debug)]
pub struct MessageStore {
    chats: HashMap<ChatId, Vec<Message>>,
    max_per_chat: usize,
}

impl MessageStore {
    /// Create a store keeping at most `max_per_chat` messages per chat (minimum 1).
    pub fn new(max_per_chat: usize) -> Self {
        Self {
            chats: HashMap::new(),
            max_per_chat: max_per_chat.max(1),
        }
    }

    /// Merge a pulled snapshot of `chat` with the held messages.
    ///
    /// Snapshot entries replace held ones by id (see [`merge`] for what is
    /// preserved). Held messages missing from the snapshot are kept: the
    /// snapshot is a page, not the full history. Returns true if the list
    /// changed.
    pub fn set_messages(&mut self, chat: &ChatId, snapshot: Vec<Message>) -> bool {
        let previous = self.chats.remove(chat).unwrap_or_default();
        let mut held: HashMap<&str, &Message> =
            previous.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(snapshot.len() + previous.len());
        for mut msg in snapshot {
            if !seen.insert(msg.id.clone()) {
                continue;
            }
            msg.chat_id = chat.clone();
            match held.remove(msg.id.as_str()) {
                Some(local) => merged.push(merge(local, msg)),
                None => merged.push(msg),
            }
        }
        merged.extend(held.into_values().cloned());

        merged.sort_by(display_order);
        merged.truncate(self.max_per_chat);

        let changed = merged != previous;
        if !merged.is_empty() {
            self.chats.insert(chat.clone(), merged);
        }
        changed
    }

    /// Add or update one message in its chat.
    pub fn append_message(&mut self, msg: Message) -> AppendOutcome {
        let max = self.max_per_chat;
        let list = self.chats.entry(msg.chat_id.clone()).or_default();

        if let Some(index) = list.iter().position(|m| m.id == msg.id) {
            let merged = merge(&list[index], msg);
            if merged == list[index] {
                return AppendOutcome::Unchanged;
            }
            list[index] = merged;
            list.sort_by(display_order);
            return AppendOutcome::Replaced;
        }

        let index = list
            .binary_search_by(|probe| display_order(probe, &msg))
            .unwrap_or_else(|insert_at| insert_at);
        if index >= max {
            return AppendOutcome::Unchanged;
        }
        list.insert(index, msg);
        list.truncate(max);
        AppendOutcome::Inserted
    }

    fn find_mut(&mut self, chat: &ChatId, id: &str) -> Option<&mut Message> {
        self.chats.get_mut(chat)?.iter_mut().find(|m| m.id == id)
    }

    /// Apply a delivery ack. No-op if the message is unknown.
    pub fn update_ack(&mut self, chat: &ChatId, id: &str, ack: Ack) -> bool {
        let Some(msg) = self.find_mut(chat, id) else {
            return false;
        };
        let next = msg.ack.advance(ack);
        if next == msg.ack {
            return false;
        }
        msg.ack = next;
        true
    }

    /// Set or (with an empty emoji) remove `sender`'s reaction.
    /// No-op if the message is unknown.
    pub fn update_reaction(&mut self, chat: &ChatId, id: &str, sender: &str, emoji: &str) -> bool {
        match self.find_mut(chat, id) {
            Some(msg) => msg.reactions.set(sender, emoji),
            None => false,
        }
    }

    /// Mark a message revoked. No-op if the message is unknown.
    pub fn mark_revoked(&mut self, chat: &ChatId, id: &str) -> bool {
        match self.find_mut(chat, id) {
            Some(msg) if !msg.revoked => {
                msg.revoked = true;
                true
            }
            _ => false,
        }
    }

    /// Messages of `chat`, newest first.
    pub fn messages(&self, chat: &ChatId) -> &[Message] {
        self.chats.get(chat).map(Vec::as_slice).unwrap_or_default()
    }

    /// One message by id.
    pub fn get(&self, chat: &ChatId, id: &str) -> Option<&Message> {
        self.messages(chat).iter().find(|m| m.id == id)
    }

    /// Newest message of `chat`.
    pub fn latest(&self, chat: &ChatId) -> Option<&Message> {
        self.messages(chat).first()
    }

    /// Drop all messages of `chat`.
    pub fn remove_chat(&mut self, chat: &ChatId) -> bool {
        self.chats.remove(chat).is_some()
    }

    /// Drop everything (session switch).
    pub fn clear(&mut self) {
        self.chats.clear();
    }

    /// Number of chats with held messages.
    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_CHAT)
    }
}
