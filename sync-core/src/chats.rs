//! The mirrored chat collection.
//!
//! Chats are created on the first snapshot or event that mentions them and
//! removed only by an explicit remote delete. The push channel usually knows
//! about a new message before the next chat-list poll, so a snapshot never
//! rolls a chat's last message back to an older one.

use std::collections::HashMap;

use sync_types::{Ack, Chat, ChatId, Contact, LastMessage, Message, REVOKED_PREVIEW};

/// All known chats of the active session, keyed by id.
#[derive(Debug, Default)]
pub struct ChatCollection {
    chats: HashMap<ChatId, Chat>,
}

/// Whether `candidate` is at least as recent as `current`.
fn is_newer(candidate: &LastMessage, current: Option<&LastMessage>) -> bool {
    match current {
        Some(current) => {
            (candidate.timestamp, candidate.id.as_str()) >= (current.timestamp, current.id.as_str())
        }
        None => true,
    }
}

impl ChatCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a pulled chat list.
    ///
    /// Chats missing from the snapshot are kept. A locally-known last
    /// message newer than the snapshot's is preserved. Returns true if
    /// anything changed.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Chat>) -> bool {
        let mut changed = false;
        for chat in snapshot {
            changed |= self.upsert(chat);
        }
        changed
    }

    /// Insert or update one chat. Returns true if it changed.
    pub fn upsert(&mut self, mut chat: Chat) -> bool {
        match self.chats.get_mut(&chat.id) {
            Some(existing) => {
                let keep_local = match (&existing.last_message, &chat.last_message) {
                    (Some(local), Some(remote)) => !is_newer(remote, Some(local)),
                    (Some(_), None) => true,
                    _ => false,
                };
                if keep_local {
                    chat.last_message = existing.last_message.clone();
                } else if let (Some(local), Some(remote)) =
                    (&existing.last_message, chat.last_message.as_mut())
                {
                    if local.id == remote.id {
                        remote.ack = local.ack.advance(remote.ack);
                    }
                }
                if chat.name.is_empty() {
                    chat.name = existing.name.clone();
                }
                if *existing == chat {
                    return false;
                }
                *existing = chat;
                true
            }
            None => {
                self.chats.insert(chat.id.clone(), chat);
                true
            }
        }
    }

    /// Record a new or updated message as its chat's last message.
    ///
    /// Creates the chat if unseen. `count_unread` bumps the unread counter
    /// for an incoming message that is actually newer. Returns true if the
    /// chat changed.
    pub fn bump_last_message(&mut self, msg: &Message, count_unread: bool) -> bool {
        let mut summary = LastMessage::from(msg);
        let chat = self
            .chats
            .entry(msg.chat_id.clone())
            .or_insert_with(|| Chat::new(msg.chat_id.clone()));

        let same_message = match chat.last_message.as_ref() {
            Some(last) if last.id == summary.id => {
                summary.ack = last.ack.advance(summary.ack);
                true
            }
            _ => false,
        };
        if !same_message && !is_newer(&summary, chat.last_message.as_ref()) {
            return false;
        }
        if chat.last_message.as_ref() == Some(&summary) {
            return false;
        }
        chat.last_message = Some(summary);
        if count_unread && !same_message && !msg.from_me {
            chat.unread_count = chat.unread_count.saturating_add(1);
        }
        true
    }

    /// Update the ack of a chat's last message if it is `message_id`.
    pub fn update_last_ack(&mut self, chat: &ChatId, message_id: &str, ack: Ack) -> bool {
        let Some(last) = self.last_message_mut(chat, message_id) else {
            return false;
        };
        let next = last.ack.advance(ack);
        if next == last.ack {
            return false;
        }
        last.ack = next;
        true
    }

    /// Mask a chat's last message preview if it is `message_id`.
    pub fn mark_last_revoked(&mut self, chat: &ChatId, message_id: &str) -> bool {
        let Some(last) = self.last_message_mut(chat, message_id) else {
            return false;
        };
        if last.preview == REVOKED_PREVIEW {
            return false;
        }
        last.preview = REVOKED_PREVIEW.to_string();
        true
    }

    fn last_message_mut(&mut self, chat: &ChatId, message_id: &str) -> Option<&mut LastMessage> {
        self.chats
            .get_mut(chat)?
            .last_message
            .as_mut()
            .filter(|last| last.id == message_id)
    }

    /// Archive or unarchive a chat. Unknown chats are ignored.
    pub fn set_archived(&mut self, chat: &ChatId, archived: bool) -> bool {
        match self.chats.get_mut(chat) {
            Some(existing) if existing.archived != archived => {
                existing.archived = archived;
                true
            }
            _ => false,
        }
    }

    /// Reset a chat's unread counter.
    pub fn mark_read(&mut self, chat: &ChatId) -> bool {
        match self.chats.get_mut(chat) {
            Some(existing) if existing.unread_count != 0 => {
                existing.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    /// Replace id-derived placeholder names of direct chats with contact names.
    pub fn apply_contact_names(&mut self, contacts: &[Contact]) -> bool {
        let mut changed = false;
        for contact in contacts {
            let Some(name) = contact.display_name() else {
                continue;
            };
            let id = ChatId::from(contact.id.as_str());
            let Some(chat) = self.chats.get_mut(&id) else {
                continue;
            };
            let placeholder = Chat::new(id).name;
            if chat.name == placeholder && chat.name != name {
                chat.name = name.to_string();
                changed = true;
            }
        }
        changed
    }

    /// Remove a chat (explicit remote delete).
    pub fn remove(&mut self, chat: &ChatId) -> Option<Chat> {
        self.chats.remove(chat)
    }

    /// Look up a chat.
    pub fn get(&self, chat: &ChatId) -> Option<&Chat> {
        self.chats.get(chat)
    }

    /// Whether a chat is known.
    pub fn contains(&self, chat: &ChatId) -> bool {
        self.chats.contains_key(chat)
    }

    /// Number of chats, archived included.
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    /// Whether no chat is known.
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Drop every chat (session switch).
    pub fn clear(&mut self) {
        self.chats.clear();
    }

    /// Non-archived chats, most recent activity first, ties by id.
    pub fn visible(&self) -> Vec<&Chat> {
        let mut visible: Vec<&Chat> = self.chats.values().filter(|c| !c.archived).collect();
        visible.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| a.id.cmp(&b.id))
        });
        visible
    }
}
