//! Output seams of the engine.
//!
//! The engine never renders or notifies by itself. It hands
//! [`ViewChange`]s to a [`ViewSink`] and [`NewMessageAlert`]s to a
//! [`NotificationSink`]. Both are called from the engine task and must not
//! block.
//!
//! An unbounded channel sender implements both traits, which is how the CLI
//! and the tests observe the engine.

use tokio::sync::mpsc;

use sync_core::RenderPlan;
use sync_types::{ChatId, RemoteError};

/// What part of the view a change concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Chat list or message content changed.
    Data,
    /// The selected chat changed.
    Selection,
    /// A new message arrived in the foreground chat.
    Scroll,
    /// View-level state: foreground, session, re-auth prompt.
    View,
    /// Connection status and surfaced errors.
    Other,
}

/// One notification to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChange {
    /// Area of the change.
    pub kind: ChangeKind,
    /// How to redraw the chat list.
    pub plan: RenderPlan,
    /// Chat whose messages changed, when the change is about one chat.
    pub chat: Option<ChatId>,
    /// The session needs re-authentication or pairing.
    pub auth_required: bool,
    /// Error to show, for user-initiated actions.
    pub error: Option<RemoteError>,
}

impl ViewChange {
    fn new(kind: ChangeKind, plan: RenderPlan) -> Self {
        Self {
            kind,
            plan,
            chat: None,
            auth_required: false,
            error: None,
        }
    }

    /// The chat list needs redrawing according to `plan`.
    pub fn list(plan: RenderPlan) -> Self {
        Self::new(ChangeKind::Data, plan)
    }

    /// Messages of `chat` changed in place.
    pub fn messages(chat: ChatId) -> Self {
        Self {
            chat: Some(chat),
            ..Self::new(ChangeKind::Data, RenderPlan::Noop)
        }
    }

    /// A new message arrived in the foreground `chat`.
    pub fn scroll(chat: ChatId) -> Self {
        Self {
            chat: Some(chat),
            ..Self::new(ChangeKind::Scroll, RenderPlan::Noop)
        }
    }

    /// Selection moved.
    pub fn selection(plan: RenderPlan, chat: Option<ChatId>) -> Self {
        Self {
            chat,
            ..Self::new(ChangeKind::Selection, plan)
        }
    }

    /// View-level state changed.
    pub fn view() -> Self {
        Self::new(ChangeKind::View, RenderPlan::Noop)
    }

    /// The user has to re-authenticate or pair the session.
    pub fn auth_required(error: Option<RemoteError>) -> Self {
        Self {
            auth_required: true,
            error,
            ..Self::view()
        }
    }

    /// Connection status or another non-view change.
    pub fn other() -> Self {
        Self::new(ChangeKind::Other, RenderPlan::Noop)
    }

    /// A user-initiated action failed.
    pub fn error(error: RemoteError) -> Self {
        Self {
            error: Some(error),
            ..Self::other()
        }
    }
}

/// Receives view changes.
pub trait ViewSink: Send + Sync + 'static {
    /// Called once per change, in order.
    fn on_change(&self, change: ViewChange);
}

/// An incoming message worth alerting about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessageAlert {
    /// Chat the message arrived in.
    pub chat_id: ChatId,
    /// Display name of the chat.
    pub chat_name: String,
    /// Sender id.
    pub sender: String,
    /// Message preview.
    pub preview: String,
    /// Arrived in a group.
    pub is_group: bool,
    /// Arrived on the status feed.
    pub is_status: bool,
}

/// Delivers new-message alerts.
pub trait NotificationSink: Send + Sync + 'static {
    /// Alert about one message.
    fn notify(&self, alert: NewMessageAlert);
}

impl ViewSink for mpsc::UnboundedSender<ViewChange> {
    fn on_change(&self, change: ViewChange) {
        if self.send(change).is_err() {
            tracing::debug!("View receiver dropped");
        }
    }
}

impl NotificationSink for mpsc::UnboundedSender<NewMessageAlert> {
    fn notify(&self, alert: NewMessageAlert) {
        if self.send(alert).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ViewSink for Discard {
    fn on_change(&self, _change: ViewChange) {}
}

impl NotificationSink for Discard {
    fn notify(&self, _alert: NewMessageAlert) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_prompt_is_a_view_change() {
        let change = ViewChange::auth_required(Some(RemoteError::Auth("expired".into())));
        assert_eq!(change.kind, ChangeKind::View);
        assert!(change.auth_required);
        assert!(change.plan.is_noop());
        assert_eq!(change.error, Some(RemoteError::Auth("expired".into())));
    }

    #[test]
    fn channel_sender_forwards_changes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: &dyn ViewSink = &tx;
        sink.on_change(ViewChange::list(RenderPlan::Rebuild));
        sink.on_change(ViewChange::scroll(ChatId::from("1@c.us")));

        assert_eq!(rx.try_recv().unwrap().plan, RenderPlan::Rebuild);
        let scroll = rx.try_recv().unwrap();
        assert_eq!(scroll.kind, ChangeKind::Scroll);
        assert_eq!(scroll.chat, Some(ChatId::from("1@c.us")));
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<NewMessageAlert>();
        drop(rx);
        tx.notify(NewMessageAlert {
            chat_id: ChatId::from("1@c.us"),
            chat_name: "Alice".into(),
            sender: "1@c.us".into(),
            preview: "hi".into(),
            is_group: false,
            is_status: false,
        });
    }
}
