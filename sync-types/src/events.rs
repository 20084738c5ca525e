//! Push-channel events.
//!
//! Every frame on the push channel is a JSON envelope:
//!
//! ```json
//! { "event": "message.ack", "session": "default", "payload": { ... } }
//! ```
//!
//! Frames decode into [`PushEvent`], one variant per known event name.
//! Unknown names decode to [`PushEvent::Unrecognized`] so new server-side
//! events never break the client.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::ids::ChatId;
use crate::model::{Ack, Message, ParticipantPresence, SessionStatus};
use crate::payload::{MessagePayload, PresencePayload};

/// Event names understood by the decoder.
pub mod names {
    /// Incoming message from someone else.
    pub const MESSAGE: &str = "message";
    /// Any message, including ones sent by the local account.
    pub const MESSAGE_ANY: &str = "message.any";
    /// Delivery state change.
    pub const MESSAGE_ACK: &str = "message.ack";
    /// Reaction added, changed or removed.
    pub const MESSAGE_REACTION: &str = "message.reaction";
    /// Message deleted for everyone.
    pub const MESSAGE_REVOKED: &str = "message.revoked";
    /// Presence of chat participants changed.
    pub const PRESENCE_UPDATE: &str = "presence.update";
    /// Session lifecycle change.
    pub const SESSION_STATUS: &str = "session.status";
    /// Chat archived or unarchived.
    pub const CHAT_ARCHIVE: &str = "chat.archive";
    /// Chat deleted.
    pub const CHAT_DELETE: &str = "chat.delete";
}

/// A decoded push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Incoming message from someone else.
    Message(Message),
    /// Any message, including ones the local account sent elsewhere.
    MessageAny(Message),
    /// Delivery state changed.
    MessageAck {
        /// Chat of the message.
        chat_id: ChatId,
        /// Message id.
        message_id: String,
        /// New ack.
        ack: Ack,
    },
    /// Reaction set or cleared (empty `emoji`).
    MessageReaction {
        /// Chat of the reacted message.
        chat_id: ChatId,
        /// Reacted message id.
        message_id: String,
        /// Reacting participant.
        sender: String,
        /// Emoji, empty for removal.
        emoji: String,
    },
    /// Message revoked.
    MessageRevoked {
        /// Chat of the revoked message.
        chat_id: ChatId,
        /// Revoked message id.
        message_id: String,
    },
    /// Participant presence changed.
    PresenceUpdate {
        /// Chat the presence applies to.
        chat_id: ChatId,
        /// Latest participant states.
        presences: Vec<ParticipantPresence>,
    },
    /// Session status changed.
    SessionStatus {
        /// New status.
        status: SessionStatus,
    },
    /// Chat archived or unarchived.
    ChatArchive {
        /// Chat id.
        chat_id: ChatId,
        /// New archived flag.
        archived: bool,
    },
    /// Chat deleted remotely.
    ChatDelete {
        /// Chat id.
        chat_id: ChatId,
    },
    /// Event name the decoder does not know.
    Unrecognized {
        /// Raw event name.
        name: String,
    },
}

impl PushEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &str {
        match self {
            Self::Message(_) => names::MESSAGE,
            Self::MessageAny(_) => names::MESSAGE_ANY,
            Self::MessageAck { .. } => names::MESSAGE_ACK,
            Self::MessageReaction { .. } => names::MESSAGE_REACTION,
            Self::MessageRevoked { .. } => names::MESSAGE_REVOKED,
            Self::PresenceUpdate { .. } => names::PRESENCE_UPDATE,
            Self::SessionStatus { .. } => names::SESSION_STATUS,
            Self::ChatArchive { .. } => names::CHAT_ARCHIVE,
            Self::ChatDelete { .. } => names::CHAT_DELETE,
            Self::Unrecognized { name } => name,
        }
    }

    /// Chat this event refers to, if any.
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Message(msg) | Self::MessageAny(msg) => Some(&msg.chat_id),
            Self::MessageAck { chat_id, .. }
            | Self::MessageReaction { chat_id, .. }
            | Self::MessageRevoked { chat_id, .. }
            | Self::PresenceUpdate { chat_id, .. }
            | Self::ChatArchive { chat_id, .. }
            | Self::ChatDelete { chat_id } => Some(chat_id),
            Self::SessionStatus { .. } | Self::Unrecognized { .. } => None,
        }
    }
}

/// A decoded frame: the event plus the session it was emitted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    /// Session name, when the remote includes it.
    pub session: Option<String>,
    /// The event.
    pub event: PushEvent,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionBody {
    #[serde(default)]
    text: String,
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionPayload {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    from_me: bool,
    #[serde(default)]
    participant: Option<String>,
    reaction: ReactionBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokedPayload {
    #[serde(default)]
    revoked_message_id: Option<String>,
    #[serde(default)]
    before: Option<MessagePayload>,
    #[serde(default)]
    after: Option<MessagePayload>,
}

#[derive(Deserialize)]
struct SessionStatusPayload {
    status: SessionStatus,
}

#[derive(Deserialize)]
struct ChatArchivePayload {
    id: ChatId,
    archived: bool,
}

#[derive(Deserialize)]
struct ChatDeletePayload {
    id: ChatId,
}

fn payload<T: DeserializeOwned>(event: &str, value: serde_json::Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

impl EventFrame {
    /// Decode a text frame from the push channel.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(DecodeError::InvalidFrame)?;
        let name = raw.event.as_str();
        let value = raw.payload;

        let event = match name {
            names::MESSAGE => PushEvent::Message(payload::<MessagePayload>(name, value)?.into_message()),
            names::MESSAGE_ANY => {
                PushEvent::MessageAny(payload::<MessagePayload>(name, value)?.into_message())
            }
            names::MESSAGE_ACK => {
                let msg: MessagePayload = payload(name, value)?;
                let ack = msg.ack.ok_or_else(|| DecodeError::MissingField {
                    event: name.to_string(),
                    field: "ack",
                })?;
                PushEvent::MessageAck {
                    chat_id: msg.chat_id(),
                    message_id: msg.id,
                    ack,
                }
            }
            names::MESSAGE_REACTION => {
                let reaction: ReactionPayload = payload(name, value)?;
                let chat_id = if reaction.from_me {
                    ChatId::new(reaction.to)
                } else {
                    ChatId::new(reaction.from.clone())
                };
                let sender = match reaction.participant {
                    Some(p) if !p.is_empty() => p,
                    _ => reaction.from,
                };
                PushEvent::MessageReaction {
                    chat_id,
                    message_id: reaction.reaction.message_id,
                    sender,
                    emoji: reaction.reaction.text,
                }
            }
            names::MESSAGE_REVOKED => {
                let revoked: RevokedPayload = payload(name, value)?;
                let message_id = revoked
                    .revoked_message_id
                    .or_else(|| revoked.before.as_ref().map(|m| m.id.clone()))
                    .ok_or_else(|| DecodeError::MissingField {
                        event: name.to_string(),
                        field: "revokedMessageId",
                    })?;
                let chat_id = revoked
                    .before
                    .as_ref()
                    .or(revoked.after.as_ref())
                    .map(MessagePayload::chat_id)
                    .ok_or_else(|| DecodeError::MissingField {
                        event: name.to_string(),
                        field: "before",
                    })?;
                PushEvent::MessageRevoked {
                    chat_id,
                    message_id,
                }
            }
            names::PRESENCE_UPDATE => {
                let (chat_id, presences) = payload::<PresencePayload>(name, value)?.into_presences();
                PushEvent::PresenceUpdate { chat_id, presences }
            }
            names::SESSION_STATUS => {
                let status: SessionStatusPayload = payload(name, value)?;
                PushEvent::SessionStatus {
                    status: status.status,
                }
            }
            names::CHAT_ARCHIVE => {
                let archive: ChatArchivePayload = payload(name, value)?;
                PushEvent::ChatArchive {
                    chat_id: archive.id,
                    archived: archive.archived,
                }
            }
            names::CHAT_DELETE => {
                let delete: ChatDeletePayload = payload(name, value)?;
                PushEvent::ChatDelete { chat_id: delete.id }
            }
            other => PushEvent::Unrecognized {
                name: other.to_string(),
            },
        };

        Ok(Self {
            session: raw.session,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PresenceState;

    #[test]
    fn decodes_incoming_message() {
        let frame = EventFrame::decode(
            r#"{"event":"message","session":"default","payload":
                {"id":"m1","timestamp":10,"from":"1@c.us","to":"me@c.us","body":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(frame.session.as_deref(), Some("default"));
        match frame.event {
            PushEvent::Message(msg) => {
                assert_eq!(msg.id, "m1");
                assert_eq!(msg.body, "hello");
                assert_eq!(msg.chat_id, ChatId::from("1@c.us"));
            }
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn decodes_ack() {
        let frame = EventFrame::decode(
            r#"{"event":"message.ack","payload":{"id":"m1","from":"me@c.us","to":"1@c.us","fromMe":true,"ack":3}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.event,
            PushEvent::MessageAck {
                chat_id: ChatId::from("1@c.us"),
                message_id: "m1".into(),
                ack: Ack::Read,
            }
        );
    }

    #[test]
    fn ack_without_value_is_rejected() {
        let err = EventFrame::decode(r#"{"event":"message.ack","payload":{"id":"m1","from":"1@c.us"}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "ack", .. }));
    }

    #[test]
    fn decodes_reaction_and_removal() {
        let frame = EventFrame::decode(
            r#"{"event":"message.reaction","payload":{"from":"9-9@g.us","participant":"2@c.us",
                "reaction":{"text":"","messageId":"m7"}}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.event,
            PushEvent::MessageReaction {
                chat_id: ChatId::from("9-9@g.us"),
                message_id: "m7".into(),
                sender: "2@c.us".into(),
                emoji: String::new(),
            }
        );
    }

    #[test]
    fn decodes_revoked_from_before_snapshot() {
        let frame = EventFrame::decode(
            r#"{"event":"message.revoked","payload":{"before":{"id":"m3","from":"1@c.us"}}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.event,
            PushEvent::MessageRevoked {
                chat_id: ChatId::from("1@c.us"),
                message_id: "m3".into(),
            }
        );
    }

    #[test]
    fn decodes_presence() {
        let frame = EventFrame::decode(
            r#"{"event":"presence.update","payload":{"id":"1@c.us","presences":
                [{"participant":"1@c.us","lastKnownPresence":"composing"}]}}"#,
        )
        .unwrap();
        match frame.event {
            PushEvent::PresenceUpdate { chat_id, presences } => {
                assert_eq!(chat_id, ChatId::from("1@c.us"));
                assert_eq!(presences[0].state, PresenceState::Typing);
            }
            other => panic!("Expected PresenceUpdate, got {:?}", other),
        }
    }

    #[test]
    fn decodes_session_and_chat_events() {
        let status = EventFrame::decode(r#"{"event":"session.status","payload":{"status":"WORKING"}}"#).unwrap();
        assert_eq!(
            status.event,
            PushEvent::SessionStatus {
                status: SessionStatus::Working
            }
        );

        let archive =
            EventFrame::decode(r#"{"event":"chat.archive","payload":{"id":"1@c.us","archived":true}}"#).unwrap();
        assert_eq!(archive.event.chat_id(), Some(&ChatId::from("1@c.us")));

        let delete = EventFrame::decode(r#"{"event":"chat.delete","payload":{"id":"1@c.us"}}"#).unwrap();
        assert_eq!(delete.event.name(), names::CHAT_DELETE);
    }

    #[test]
    fn unknown_event_is_unrecognized_not_an_error() {
        let frame = EventFrame::decode(r#"{"event":"call.received","payload":{"x":1}}"#).unwrap();
        assert_eq!(
            frame.event,
            PushEvent::Unrecognized {
                name: "call.received".into()
            }
        );
        assert_eq!(frame.event.name(), "call.received");
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            EventFrame::decode("not json"),
            Err(DecodeError::InvalidFrame(_))
        ));
        assert!(matches!(
            EventFrame::decode(r#"{"event":"message","payload":{"body":"no id"}}"#),
            Err(DecodeError::InvalidPayload { .. })
        ));
    }
}
