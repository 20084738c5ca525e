//! Local data model mirrored from the remote account.
//!
//! These are the normalized shapes the engine stores. Remote JSON is decoded
//! into them by [`crate::payload`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::{normalize_id, ChatId};

/// Lifecycle status of the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Session is booting on the remote.
    #[serde(rename = "STARTING")]
    Starting,
    /// Waiting for the account to be paired (QR code / pairing code).
    #[serde(rename = "SCAN_QR_CODE")]
    AwaitingPairing,
    /// Paired and operational.
    #[serde(rename = "WORKING")]
    Working,
    /// Stopped by the operator.
    #[serde(rename = "STOPPED")]
    Stopped,
    /// Crashed or unrecoverable.
    #[serde(rename = "FAILED")]
    Failed,
}

impl SessionStatus {
    /// Whether the session can serve chats and messages.
    pub fn is_active(self) -> bool {
        self == Self::Working
    }
}

/// Account the session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMe {
    /// Account id (e.g. `4915...@c.us`).
    pub id: String,
    /// Display name of the account.
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
}

/// A session on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session name.
    pub name: String,
    /// Current status.
    pub status: SessionStatus,
    /// Logged-in account, once paired.
    #[serde(default)]
    pub me: Option<SessionMe>,
}

/// Delivery state of a message.
///
/// The remote reports acks as integer codes (`-1` error, `0` pending,
/// `1` server, `2` device, `3` read, `4` played) or as their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "AckRepr", into = "i64")]
pub enum Ack {
    /// Not yet accepted by the server.
    #[default]
    Pending,
    /// Accepted by the server.
    Sent,
    /// Delivered to the recipient's device.
    Delivered,
    /// Read (or played) by the recipient.
    Read,
    /// Delivery failed.
    Failed,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AckRepr {
    Code(i64),
    Name(String),
}

impl TryFrom<AckRepr> for Ack {
    type Error = String;

    fn try_from(repr: AckRepr) -> Result<Self, Self::Error> {
        match repr {
            AckRepr::Code(code) => {
                Ack::from_code(code).ok_or_else(|| format!("unknown ack code {}", code))
            }
            AckRepr::Name(name) => {
                Ack::from_name(&name).ok_or_else(|| format!("unknown ack name {}", name))
            }
        }
    }
}

impl From<Ack> for i64 {
    fn from(ack: Ack) -> Self {
        ack.code()
    }
}

impl Ack {
    /// Decode a remote ack code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::Failed),
            0 => Some(Self::Pending),
            1 => Some(Self::Sent),
            2 => Some(Self::Delivered),
            3 | 4 => Some(Self::Read),
            _ => None,
        }
    }

    /// Decode a remote ack name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ERROR" | "FAILED" => Some(Self::Failed),
            "PENDING" => Some(Self::Pending),
            "SERVER" | "SENT" => Some(Self::Sent),
            "DEVICE" | "DELIVERED" => Some(Self::Delivered),
            "READ" | "PLAYED" => Some(Self::Read),
            _ => None,
        }
    }

    /// Remote integer code for this ack.
    pub fn code(self) -> i64 {
        match self {
            Self::Failed => -1,
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 0,
        }
    }

    /// Combine the locally-known ack with an incoming one.
    ///
    /// Acks only move forward; `Failed` always applies, and any progress
    /// report replaces a previous failure.
    pub fn advance(self, incoming: Ack) -> Ack {
        match (self, incoming) {
            (_, Self::Failed) => Self::Failed,
            (Self::Failed, next) => next,
            (current, next) if next.rank() >= current.rank() => next,
            (current, _) => current,
        }
    }
}

/// Reactions on a message, at most one per sender.
///
/// Senders are keyed by their normalized id so device-suffixed variants of
/// the same account collapse to one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, String>);

impl Reactions {
    /// Empty reaction set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reaction of `sender`. An empty emoji removes it.
    ///
    /// Returns true if the set changed.
    pub fn set(&mut self, sender: &str, emoji: &str) -> bool {
        let key = normalize_id(sender);
        if emoji.is_empty() {
            return self.0.remove(&key).is_some();
        }
        match self.0.get(&key) {
            Some(existing) if existing == emoji => false,
            _ => {
                self.0.insert(key, emoji.to_string());
                true
            }
        }
    }

    /// Reaction of `sender`, if any.
    pub fn get(&self, sender: &str) -> Option<&str> {
        self.0.get(&normalize_id(sender)).map(String::as_str)
    }

    /// Whether no sender has reacted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of senders with a reaction.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(sender, emoji)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(s, e)| (s.as_str(), e.as_str()))
    }
}

impl<S: AsRef<str>, E: AsRef<str>> FromIterator<(S, E)> for Reactions {
    fn from_iter<I: IntoIterator<Item = (S, E)>>(iter: I) -> Self {
        let mut reactions = Reactions::new();
        for (sender, emoji) in iter {
            reactions.set(sender.as_ref(), emoji.as_ref());
        }
        reactions
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id (unique within the account).
    pub id: String,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Sender id.
    pub sender: String,
    /// Whether the local account sent it.
    pub from_me: bool,
    /// Text body (caption for media).
    pub body: String,
    /// Delivery state.
    pub ack: Ack,
    /// Reactions, one per sender.
    pub reactions: Reactions,
    /// Whether the sender revoked (deleted for everyone) the message.
    pub revoked: bool,
}

/// Placeholder preview for revoked messages.
pub const REVOKED_PREVIEW: &str = "This message was deleted";

impl Message {
    /// Short text for chat list rows and notifications.
    pub fn preview(&self) -> String {
        if self.revoked {
            return REVOKED_PREVIEW.to_string();
        }
        let line = self.body.lines().next().unwrap_or_default();
        if line.chars().count() > 80 {
            let truncated: String = line.chars().take(79).collect();
            format!("{}…", truncated)
        } else {
            line.to_string()
        }
    }
}

/// Summary of the most recent message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Message id.
    pub id: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Delivery state.
    pub ack: Ack,
    /// Whether the local account sent it.
    pub from_me: bool,
    /// Preview text.
    pub preview: String,
}

impl From<&Message> for LastMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            timestamp: msg.timestamp,
            ack: msg.ack,
            from_me: msg.from_me,
            preview: msg.preview(),
        }
    }
}

/// A chat (direct, group or broadcast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: ChatId,
    /// Display name.
    pub name: String,
    /// Archived chats are hidden from the main list.
    pub archived: bool,
    /// Muted chats raise no notifications.
    pub muted: bool,
    /// Unread message count.
    pub unread_count: u32,
    /// Most recent message, if known.
    pub last_message: Option<LastMessage>,
}

impl Chat {
    /// A chat known only by id. The name falls back to the user part.
    pub fn new(id: ChatId) -> Self {
        let name = id
            .as_str()
            .split('@')
            .next()
            .unwrap_or(id.as_str())
            .to_string();
        Self {
            id,
            name,
            archived: false,
            muted: false,
            unread_count: 0,
            last_message: None,
        }
    }

    /// Timestamp of the last message, or 0.
    pub fn last_activity(&self) -> u64 {
        self.last_message.as_ref().map_or(0, |m| m.timestamp)
    }
}

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Contact id.
    pub id: String,
    /// Saved name.
    #[serde(default)]
    pub name: Option<String>,
    /// Self-chosen profile name.
    #[serde(default, alias = "pushname")]
    pub push_name: Option<String>,
}

impl Contact {
    /// Best available display name.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.push_name.as_deref().filter(|n| !n.is_empty()))
    }
}

/// Availability or activity of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    /// Available.
    #[serde(alias = "available")]
    Online,
    /// Unavailable.
    #[serde(alias = "unavailable")]
    Offline,
    /// Composing text.
    #[serde(alias = "composing")]
    Typing,
    /// Recording audio.
    Recording,
    /// Stopped typing or recording.
    Paused,
}

impl PresenceState {
    /// Whether this state means the participant is composing.
    pub fn is_typing(self) -> bool {
        matches!(self, Self::Typing | Self::Recording)
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Typing => "typing",
            Self::Recording => "recording",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Latest presence of one participant in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPresence {
    /// Participant id.
    pub participant: String,
    /// Latest state.
    pub state: PresenceState,
    /// Last-seen unix timestamp, if shared.
    pub last_seen: Option<u64>,
}
