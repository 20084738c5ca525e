//! Identity types for chatmirror.
//!
//! Chat identifiers are opaque strings owned by the remote service. The
//! address suffix tells direct, group and broadcast chats apart:
//!
//! | suffix | kind |
//! |---|---|
//! | `@c.us`, `@s.whatsapp.net`, `@lid` | direct |
//! | `@g.us` | group |
//! | `@broadcast` | broadcast (`status@broadcast` is the status feed) |

use serde::{Deserialize, Serialize};
use std::fmt;

const DIRECT_DOMAINS: [&str; 3] = ["c.us", "s.whatsapp.net", "lid"];
const GROUP_DOMAIN: &str = "g.us";
const BROADCAST_DOMAIN: &str = "broadcast";
const STATUS_CHAT: &str = "status@broadcast";

/// Addressing family of a chat, derived from its id suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    /// One-to-one chat with a single contact.
    Direct,
    /// Group chat.
    Group,
    /// Broadcast list.
    Broadcast,
    /// The status feed (`status@broadcast`).
    Status,
    /// Suffix not recognized.
    Unknown,
}

/// Identifier of a chat on the remote service.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Wrap a raw chat id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id as sent by the remote.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Addressing family of this chat.
    pub fn kind(&self) -> ChatKind {
        if self.0 == STATUS_CHAT {
            return ChatKind::Status;
        }
        match self.0.rsplit_once('@').map(|(_, domain)| domain) {
            Some(GROUP_DOMAIN) => ChatKind::Group,
            Some(BROADCAST_DOMAIN) => ChatKind::Broadcast,
            Some(domain) if DIRECT_DOMAINS.contains(&domain) => ChatKind::Direct,
            _ => ChatKind::Unknown,
        }
    }

    /// Whether this is a group chat.
    pub fn is_group(&self) -> bool {
        self.kind() == ChatKind::Group
    }

    /// Whether this is the status feed.
    pub fn is_status(&self) -> bool {
        self.kind() == ChatKind::Status
    }

    /// Whether this chat addresses the given account (the self-chat).
    pub fn is_self_chat(&self, account_id: &str) -> bool {
        is_same_participant(&self.0, account_id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChatId({})", self.0)
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Normalize a participant or account id for comparison.
///
/// Drops a `:device` part from the user segment and folds
/// `@s.whatsapp.net` into `@c.us`. A bare user id gains `@c.us`.
pub fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    let (user, domain) = match raw.split_once('@') {
        Some((user, domain)) => (user, domain),
        None => (raw, "c.us"),
    };
    let user = user.split(':').next().unwrap_or(user);
    let domain = if domain == "s.whatsapp.net" {
        "c.us"
    } else {
        domain
    };
    format!("{}@{}", user, domain)
}

/// Whether two participant ids name the same account after normalization.
pub fn is_same_participant(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && normalize_id(a) == normalize_id(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_kind_from_suffix() {
        assert_eq!(ChatId::from("123@c.us").kind(), ChatKind::Direct);
        assert_eq!(ChatId::from("123@s.whatsapp.net").kind(), ChatKind::Direct);
        assert_eq!(ChatId::from("987@lid").kind(), ChatKind::Direct);
        assert_eq!(ChatId::from("123-456@g.us").kind(), ChatKind::Group);
        assert_eq!(ChatId::from("111@broadcast").kind(), ChatKind::Broadcast);
        assert_eq!(ChatId::from("status@broadcast").kind(), ChatKind::Status);
        assert_eq!(ChatId::from("whatever").kind(), ChatKind::Unknown);
    }

    #[test]
    fn normalize_strips_device_and_folds_domain() {
        assert_eq!(normalize_id("4915:12@s.whatsapp.net"), "4915@c.us");
        assert_eq!(normalize_id("4915@c.us"), "4915@c.us");
        assert_eq!(normalize_id("4915"), "4915@c.us");
        assert_eq!(normalize_id("  4915@c.us "), "4915@c.us");
        assert_eq!(normalize_id("1-2@g.us"), "1-2@g.us");
    }

    #[test]
    fn same_participant_ignores_device_suffix() {
        assert!(is_same_participant("4915:3@s.whatsapp.net", "4915@c.us"));
        assert!(!is_same_participant("4915@c.us", "4916@c.us"));
        assert!(!is_same_participant("", ""));
    }

    #[test]
    fn self_chat_detection() {
        let chat = ChatId::from("4915@c.us");
        assert!(chat.is_self_chat("4915:7@s.whatsapp.net"));
        assert!(!chat.is_self_chat("4916@c.us"));
    }

    #[test]
    fn chat_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ChatId::from("1@c.us")).unwrap();
        assert_eq!(json, "\"1@c.us\"");
    }
}
