//! Incremental redraw decisions for the chat list.
//!
//! Each render pass fingerprints the visible list twice:
//!
//! - **structural**: the ordered chat ids
//! - **content**: every row's displayed fields (name, last message id /
//!   timestamp / ack, unread count, muted, archived, typing)
//!
//! | structural | content | plan |
//! |---|---|---|
//! | same | same | [`RenderPlan::Noop`] |
//! | same | different | [`RenderPlan::Patch`] with only the changed rows |
//! | different | - | [`RenderPlan::Rebuild`] |
//!
//! Selection moves never touch the hashes and produce
//! [`RenderPlan::Selection`].

use std::fmt;

use sync_types::{Ack, Chat, ChatId};

/// A BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &hex::encode(self.0)[..16])
    }
}

/// Length-prefixed field hashing so adjacent fields cannot alias.
struct FieldHasher(blake3::Hasher);

impl FieldHasher {
    fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    fn str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    fn u64(&mut self, n: u64) -> &mut Self {
        self.0.update(&n.to_le_bytes());
        self
    }

    fn finish(&self) -> Fingerprint {
        Fingerprint(*self.0.finalize().as_bytes())
    }
}

/// The displayed fields of one chat list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    /// Chat id.
    pub id: ChatId,
    /// Display name.
    pub name: String,
    /// Id of the last message.
    pub last_message_id: Option<String>,
    /// Timestamp of the last message (0 if none).
    pub last_timestamp: u64,
    /// Ack of the last message.
    pub last_ack: Option<Ack>,
    /// Unread counter.
    pub unread_count: u32,
    /// Muted flag.
    pub muted: bool,
    /// Archived flag.
    pub archived: bool,
    /// Someone is typing.
    pub typing: bool,
}

impl ChatRow {
    /// Build a row from a chat and its typing state.
    pub fn from_chat(chat: &Chat, typing: bool) -> Self {
        let last = chat.last_message.as_ref();
        Self {
            id: chat.id.clone(),
            name: chat.name.clone(),
            last_message_id: last.map(|m| m.id.clone()),
            last_timestamp: last.map_or(0, |m| m.timestamp),
            last_ack: last.map(|m| m.ack),
            unread_count: chat.unread_count,
            muted: chat.muted,
            archived: chat.archived,
            typing,
        }
    }

    /// Content fingerprint of this row.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut h = FieldHasher::new();
        h.str(self.id.as_str())
            .str(&self.name)
            .str(self.last_message_id.as_deref().unwrap_or_default())
            .u64(self.last_timestamp)
            .u64(self.last_ack.map_or(0, |a| (a.code() + 2) as u64))
            .u64(u64::from(self.unread_count))
            .u64(u64::from(self.muted))
            .u64(u64::from(self.archived))
            .u64(u64::from(self.typing));
        h.finish()
    }
}

/// Fingerprints of a whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFingerprint {
    /// Hash of the ordered ids.
    pub structural: Fingerprint,
    /// Hash of every row's content.
    pub content: Fingerprint,
    /// Per-row id and content hash, in display order.
    pub rows: Vec<(ChatId, Fingerprint)>,
}

impl ListFingerprint {
    /// Fingerprint `rows` in display order.
    pub fn compute(rows: &[ChatRow]) -> Self {
        let mut structural = FieldHasher::new();
        let mut content = FieldHasher::new();
        let mut per_row = Vec::with_capacity(rows.len());

        for row in rows {
            let fp = row.fingerprint();
            structural.str(row.id.as_str());
            content.bytes(fp.as_bytes());
            per_row.push((row.id.clone(), fp));
        }

        Self {
            structural: structural.finish(),
            content: content.finish(),
            rows: per_row,
        }
    }

    fn index_of(&self, id: &ChatId) -> Option<usize> {
        self.rows.iter().position(|(row_id, _)| row_id == id)
    }
}

/// A row addressed by position and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
    /// Position in the visible list.
    pub index: usize,
    /// Chat id at that position.
    pub id: ChatId,
}

/// What the renderer has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPlan {
    /// Nothing visible changed.
    Noop,
    /// Same rows in the same order; redraw only these.
    Patch {
        /// Rows whose content changed.
        rows: Vec<RowRef>,
    },
    /// Rows were added, removed or reordered.
    Rebuild,
    /// Selection moved.
    Selection {
        /// Previously selected row, if it is visible.
        previous: Option<RowRef>,
        /// Newly selected row, if it is visible.
        current: Option<RowRef>,
    },
}

impl RenderPlan {
    /// Whether the renderer can skip this pass.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

/// Remembers the last rendered list and selection.
#[derive(Debug, Default)]
pub struct ListDiff {
    last: Option<ListFingerprint>,
    selected: Option<ChatId>,
}

impl ListDiff {
    /// Create a differ with nothing rendered yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `rows` with the last rendered list and remember them.
    pub fn update(&mut self, rows: &[ChatRow]) -> RenderPlan {
        let next = ListFingerprint::compute(rows);
        let plan = match &self.last {
            None => RenderPlan::Rebuild,
            Some(prev) if prev.structural != next.structural => RenderPlan::Rebuild,
            Some(prev) if prev.content == next.content => RenderPlan::Noop,
            Some(prev) => {
                let changed = prev
                    .rows
                    .iter()
                    .zip(&next.rows)
                    .enumerate()
                    .filter(|(_, ((_, old), (_, new)))| old != new)
                    .map(|(index, (_, (id, _)))| RowRef {
                        index,
                        id: id.clone(),
                    })
                    .collect();
                RenderPlan::Patch { rows: changed }
            }
        };
        self.last = Some(next);
        plan
    }

    /// Move the selection.
    pub fn select(&mut self, chat: Option<ChatId>) -> RenderPlan {
        if self.selected == chat {
            return RenderPlan::Noop;
        }
        let previous = self.selected.take();
        let plan = RenderPlan::Selection {
            previous: previous.and_then(|id| self.row_ref(id)),
            current: chat.clone().and_then(|id| self.row_ref(id)),
        };
        self.selected = chat;
        plan
    }

    fn row_ref(&self, id: ChatId) -> Option<RowRef> {
        let index = self.last.as_ref()?.index_of(&id)?;
        Some(RowRef { index, id })
    }

    /// Currently selected chat.
    pub fn selected(&self) -> Option<&ChatId> {
        self.selected.as_ref()
    }

    /// Forget the last rendered list; the next update rebuilds.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
