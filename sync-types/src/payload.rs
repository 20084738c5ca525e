//! Remote JSON shapes and their conversion into the local model.
//!
//! The remote service is not consistent about which fields it sends: chat
//! snapshots may carry a `lastMessage` or only a `timestamp`, message
//! snapshots may or may not include reactions. Everything optional here
//! defaults instead of failing the decode.

use serde::Deserialize;

use crate::ids::ChatId;
use crate::model::{Ack, Chat, LastMessage, Message, ParticipantPresence, PresenceState, Reactions};

/// A message as sent by the remote (push payload or list entry).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message id.
    pub id: String,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub timestamp: u64,
    /// Sending address (the chat for incoming messages).
    #[serde(default)]
    pub from: String,
    /// Receiving address (the chat for outgoing messages).
    #[serde(default)]
    pub to: String,
    /// Whether the local account sent it.
    #[serde(default)]
    pub from_me: bool,
    /// Group member who sent it.
    #[serde(default)]
    pub participant: Option<String>,
    /// Text body.
    #[serde(default)]
    pub body: Option<String>,
    /// Delivery state.
    #[serde(default)]
    pub ack: Option<Ack>,
    /// Reactions, when the source includes them.
    #[serde(default)]
    pub reactions: Vec<ReactionPayload>,
}

/// A reaction entry inside a message snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    /// Emoji; empty means "no reaction".
    #[serde(default)]
    pub text: String,
    /// Reacting participant.
    #[serde(alias = "from")]
    pub sender_id: String,
}

impl MessagePayload {
    /// Chat this message belongs to.
    pub fn chat_id(&self) -> ChatId {
        if self.from_me {
            ChatId::new(self.to.clone())
        } else {
            ChatId::new(self.from.clone())
        }
    }

    /// Author of the message.
    pub fn sender(&self) -> String {
        match &self.participant {
            Some(p) if !p.is_empty() => p.clone(),
            _ => self.from.clone(),
        }
    }

    /// Convert into the local model.
    pub fn into_message(self) -> Message {
        let chat_id = self.chat_id();
        let sender = self.sender();
        let reactions: Reactions = self
            .reactions
            .iter()
            .map(|r| (r.sender_id.as_str(), r.text.as_str()))
            .collect();
        Message {
            id: self.id,
            chat_id,
            timestamp: self.timestamp,
            sender,
            from_me: self.from_me,
            body: self.body.unwrap_or_default(),
            ack: self.ack.unwrap_or_default(),
            reactions,
            revoked: false,
        }
    }
}

/// A chat list entry as sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Chat id.
    pub id: ChatId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Archived flag.
    #[serde(default)]
    pub archived: bool,
    /// Muted flag.
    #[serde(default, alias = "isMuted")]
    pub muted: bool,
    /// Unread count.
    #[serde(default)]
    pub unread_count: u32,
    /// Most recent message.
    #[serde(default)]
    pub last_message: Option<MessagePayload>,
}

impl ChatPayload {
    /// Convert into the local model.
    pub fn into_chat(self) -> Chat {
        let mut chat = Chat::new(self.id);
        if let Some(name) = self.name.filter(|n| !n.is_empty()) {
            chat.name = name;
        }
        chat.archived = self.archived;
        chat.muted = self.muted;
        chat.unread_count = self.unread_count;
        chat.last_message = self
            .last_message
            .map(|m| LastMessage::from(&m.into_message()));
        chat
    }
}

/// One participant entry in a presence payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntryPayload {
    /// Participant id.
    pub participant: String,
    /// Latest known state.
    pub last_known_presence: PresenceState,
    /// Last-seen unix timestamp.
    #[serde(default)]
    pub last_seen: Option<u64>,
}

/// Presence of all known participants of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresencePayload {
    /// Chat id.
    pub id: ChatId,
    /// Participant entries.
    #[serde(default)]
    pub presences: Vec<PresenceEntryPayload>,
}

impl PresencePayload {
    /// Convert the entries into the local model.
    pub fn into_presences(self) -> (ChatId, Vec<ParticipantPresence>) {
        let presences = self
            .presences
            .into_iter()
            .map(|p| ParticipantPresence {
                participant: p.participant,
                state: p.last_known_presence,
                last_seen: p.last_seen,
            })
            .collect();
        (self.id, presences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_message_uses_from_as_chat() {
        let payload: MessagePayload = serde_json::from_str(
            r#"{"id":"m1","timestamp":100,"from":"1@c.us","to":"me@c.us","fromMe":false,"body":"hi","ack":2}"#,
        )
        .unwrap();
        let msg = payload.into_message();
        assert_eq!(msg.chat_id, ChatId::from("1@c.us"));
        assert_eq!(msg.sender, "1@c.us");
        assert_eq!(msg.ack, Ack::Delivered);
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn outgoing_message_uses_to_as_chat() {
        let payload: MessagePayload = serde_json::from_str(
            r#"{"id":"m2","from":"me@c.us","to":"1@c.us","fromMe":true}"#,
        )
        .unwrap();
        let msg = payload.into_message();
        assert_eq!(msg.chat_id, ChatId::from("1@c.us"));
        assert_eq!(msg.ack, Ack::Pending);
        assert_eq!(msg.body, "");
    }

    #[test]
    fn group_message_sender_is_participant() {
        let payload: MessagePayload = serde_json::from_str(
            r#"{"id":"m3","from":"9-9@g.us","participant":"2@c.us","body":"yo",
                "reactions":[{"text":"👍","senderId":"3@c.us"}]}"#,
        )
        .unwrap();
        let msg = payload.into_message();
        assert_eq!(msg.chat_id, ChatId::from("9-9@g.us"));
        assert_eq!(msg.sender, "2@c.us");
        assert_eq!(msg.reactions.get("3@c.us"), Some("👍"));
    }

    #[test]
    fn chat_payload_defaults() {
        let payload: ChatPayload = serde_json::from_str(
            r#"{"id":"1@c.us","isMuted":true,"unreadCount":3,
                "lastMessage":{"id":"m","timestamp":50,"from":"1@c.us","body":"last"}}"#,
        )
        .unwrap();
        let chat = payload.into_chat();
        assert_eq!(chat.name, "1");
        assert!(chat.muted);
        assert!(!chat.archived);
        assert_eq!(chat.unread_count, 3);
        assert_eq!(chat.last_activity(), 50);
        assert_eq!(chat.last_message.unwrap().preview, "last");
    }

    #[test]
    fn presence_payload_converts() {
        let payload: PresencePayload = serde_json::from_str(
            r#"{"id":"1@c.us","presences":[{"participant":"1@c.us","lastKnownPresence":"typing","lastSeen":7}]}"#,
        )
        .unwrap();
        let (chat, presences) = payload.into_presences();
        assert_eq!(chat, ChatId::from("1@c.us"));
        assert_eq!(presences[0].state, PresenceState::Typing);
        assert_eq!(presences[0].last_seen, Some(7));
    }
}
