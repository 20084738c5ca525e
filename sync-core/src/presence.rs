//! Presence and typing state.
//!
//! [`PresenceTracker`] keeps the latest state of every participant per chat
//! and answers "is someone typing here?". [`ActivityTracker`] drives the
//! session-level online/offline signal from local user input.
//!
//! Presence is ephemeral: each update supersedes the participant's previous
//! state, nothing is persisted, and typing entries expire on their own
//! because the remote does not reliably send a "paused" after "composing".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sync_types::{normalize_id, ChatId, ParticipantPresence, PresenceState};

/// Default typing expiry.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_secs(30);

/// Default idle time before the session is reported offline.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval for re-asserting presence interest in a chat.
pub const DEFAULT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Entry {
    presence: ParticipantPresence,
    updated_at: Instant,
}

/// Per-chat participant presence with self-filtering and typing expiry.
#[derive(Debug)]
pub struct PresenceTracker {
    /// Normalized id of the local account.
    account: Option<String>,
    chats: HashMap<ChatId, HashMap<String, Entry>>,
    typing_expiry: Duration,
}

impl PresenceTracker {
    /// Create a tracker with the given typing expiry.
    pub fn new(typing_expiry: Duration) -> Self {
        Self {
            account: None,
            chats: HashMap::new(),
            typing_expiry,
        }
    }

    /// Set the local account. Entries already held for it are dropped.
    pub fn set_account(&mut self, account_id: &str) {
        let account = normalize_id(account_id);
        for participants in self.chats.values_mut() {
            participants.remove(&account);
        }
        self.account = Some(account);
    }

    fn is_self(&self, participant: &str) -> bool {
        self.account
            .as_deref()
            .is_some_and(|account| normalize_id(participant) == account)
    }

    fn is_self_chat(&self, chat: &ChatId) -> bool {
        self.account
            .as_deref()
            .is_some_and(|account| chat.is_self_chat(account))
    }

    /// Apply a presence update for `chat` received at `now`.
    ///
    /// Self-originated entries are ignored. Returns true if any
    /// participant's state or last-seen changed.
    pub fn apply(&mut self, chat: &ChatId, presences: &[ParticipantPresence], now: Instant) -> bool {
        let mut changed = false;
        for presence in presences {
            if presence.participant.is_empty() || self.is_self(&presence.participant) {
                continue;
            }
            let key = normalize_id(&presence.participant);
            let participants = self.chats.entry(chat.clone()).or_default();
            match participants.get_mut(&key) {
                Some(entry)
                    if entry.presence.state == presence.state
                        && entry.presence.last_seen == presence.last_seen =>
                {
                    entry.updated_at = now;
                }
                _ => {
                    participants.insert(
                        key,
                        Entry {
                            presence: presence.clone(),
                            updated_at: now,
                        },
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    /// Whether a non-self participant is typing or recording in `chat`.
    pub fn is_typing(&self, chat: &ChatId) -> bool {
        self.is_typing_at(chat, Instant::now())
    }

    /// [`is_typing`](Self::is_typing) with an explicit clock.
    pub fn is_typing_at(&self, chat: &ChatId, now: Instant) -> bool {
        !self.typing_participants(chat, now).is_empty()
    }

    /// Non-self participants currently typing or recording in `chat`.
    pub fn typing_participants(&self, chat: &ChatId, now: Instant) -> Vec<String> {
        if self.is_self_chat(chat) {
            return Vec::new();
        }
        let Some(participants) = self.chats.get(chat) else {
            return Vec::new();
        };
        let mut typing: Vec<String> = participants
            .iter()
            .filter(|(key, entry)| {
                entry.presence.state.is_typing()
                    && now.saturating_duration_since(entry.updated_at) < self.typing_expiry
                    && !self.is_self(key)
            })
            .map(|(key, _)| key.clone())
            .collect();
        typing.sort();
        typing
    }

    /// Latest presence of every participant in `chat`, ordered by participant.
    pub fn presence(&self, chat: &ChatId) -> Vec<ParticipantPresence> {
        let mut presences: Vec<ParticipantPresence> = self
            .chats
            .get(chat)
            .map(|participants| {
                participants
                    .iter()
                    .filter(|(key, _)| !self.is_self(key))
                    .map(|(_, entry)| entry.presence.clone())
                    .collect()
            })
            .unwrap_or_default();
        presences.sort_by(|a, b| a.participant.cmp(&b.participant));
        presences
    }

    /// Force `sender`'s typing/recording entries to paused in every chat.
    ///
    /// Called when a message from `sender` arrives. Returns the chats whose
    /// entries changed.
    pub fn clear_typing_for_sender(&mut self, sender: &str) -> Vec<ChatId> {
        let key = normalize_id(sender);
        let mut changed = Vec::new();
        for (chat, participants) in &mut self.chats {
            if let Some(entry) = participants.get_mut(&key) {
                if entry.presence.state.is_typing() {
                    entry.presence.state = PresenceState::Paused;
                    changed.push(chat.clone());
                }
            }
        }
        changed.sort();
        changed
    }

    /// Pause typing entries not refreshed within the expiry.
    ///
    /// Returns the chats whose entries changed.
    pub fn expire_typing(&mut self, now: Instant) -> Vec<ChatId> {
        let expiry = self.typing_expiry;
        let mut changed = Vec::new();
        for (chat, participants) in &mut self.chats {
            let mut chat_changed = false;
            for entry in participants.values_mut() {
                if entry.presence.state.is_typing()
                    && now.saturating_duration_since(entry.updated_at) >= expiry
                {
                    entry.presence.state = PresenceState::Paused;
                    chat_changed = true;
                }
            }
            if chat_changed {
                changed.push(chat.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Forget everything known about `chat`.
    pub fn remove_chat(&mut self, chat: &ChatId) {
        self.chats.remove(chat);
    }

    /// Forget all presence (session switch).
    pub fn clear(&mut self) {
        self.chats.clear();
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_EXPIRY)
    }
}

/// Session-level presence the engine should publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceBroadcast {
    /// Tell the remote the account is online.
    Online,
    /// Tell the remote the account is offline.
    Offline,
}

impl PresenceBroadcast {
    /// Whether this broadcast announces availability.
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Local user activity, idle detection and presence re-subscription.
#[derive(Debug)]
pub struct ActivityTracker {
    idle_timeout: Duration,
    resubscribe_interval: Duration,
    online: bool,
    last_activity: Option<Instant>,
    subscribed: HashMap<ChatId, Instant>,
}

impl ActivityTracker {
    /// Create a tracker; the session starts offline.
    pub fn new(idle_timeout: Duration, resubscribe_interval: Duration) -> Self {
        Self {
            idle_timeout,
            resubscribe_interval,
            online: false,
            last_activity: None,
            subscribed: HashMap::new(),
        }
    }

    /// Whether the session is currently reported online.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record user input at `now`.
    ///
    /// Returns `Online` if the session was offline.
    pub fn record_activity(&mut self, now: Instant) -> Option<PresenceBroadcast> {
        self.last_activity = Some(now);
        if self.online {
            return None;
        }
        self.online = true;
        Some(PresenceBroadcast::Online)
    }

    /// Periodic idle check.
    ///
    /// Returns `Offline` once no activity was seen for the idle timeout.
    pub fn check_idle(&mut self, now: Instant) -> Option<PresenceBroadcast> {
        if !self.online {
            return None;
        }
        let idle = self
            .last_activity
            .map_or(true, |last| now.saturating_duration_since(last) >= self.idle_timeout);
        if !idle {
            return None;
        }
        self.online = false;
        Some(PresenceBroadcast::Offline)
    }

    /// Whether interest in `chat`'s presence should be (re-)asserted.
    pub fn subscription_due(&self, chat: &ChatId, now: Instant) -> bool {
        match self.subscribed.get(chat) {
            Some(at) => now.saturating_duration_since(*at) >= self.resubscribe_interval,
            None => true,
        }
    }

    /// Record a successful subscription to `chat`'s presence.
    pub fn mark_subscribed(&mut self, chat: &ChatId, now: Instant) {
        self.subscribed.insert(chat.clone(), now);
    }

    /// Forget all subscriptions (reconnect or session switch).
    pub fn reset_subscriptions(&mut self) {
        self.subscribed.clear();
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT, DEFAULT_RESUBSCRIBE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "100@c.us";

    fn entry(participant: &str, state: PresenceState) -> ParticipantPresence {
        ParticipantPresence {
            participant: participant.into(),
            state,
            last_seen: None,
        }
    }

    fn tracker() -> PresenceTracker {
        let mut tracker = PresenceTracker::default();
        tracker.set_account(ME);
        tracker
    }

    #[test]
    fn typing_participant_is_reported() {
        let mut tracker = tracker();
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();

        assert!(tracker.apply(&chat, &[entry("200@c.us", PresenceState::Typing)], now));
        assert!(tracker.is_typing_at(&chat, now));
        assert_eq!(tracker.typing_participants(&chat, now), vec!["200@c.us"]);
    }

    #[test]
    fn recording_counts_as_typing() {
        let mut tracker = tracker();
        let chat = ChatId::from("1-2@g.us");
        let now = Instant::now();
        tracker.apply(&chat, &[entry("300@c.us", PresenceState::Recording)], now);
        assert!(tracker.is_typing_at(&chat, now));
    }

    #[test]
    fn self_presence_never_counts_as_typing() {
        let mut tracker = tracker();
        let group = ChatId::from("1-2@g.us");
        let now = Instant::now();

        let changed = tracker.apply(
            &group,
            &[entry("100:5@s.whatsapp.net", PresenceState::Typing)],
            now,
        );
        assert!(!changed);
        assert!(!tracker.is_typing_at(&group, now));
        assert!(tracker.presence(&group).is_empty());
    }

    #[test]
    fn self_chat_never_reports_typing() {
        let mut tracker = tracker();
        let self_chat = ChatId::from("100@c.us");
        let now = Instant::now();
        tracker.apply(&self_chat, &[entry("200@c.us", PresenceState::Typing)], now);
        assert!(!tracker.is_typing_at(&self_chat, now));
    }

    #[test]
    fn account_set_late_still_filters_at_query_time() {
        let mut tracker = PresenceTracker::default();
        let group = ChatId::from("1-2@g.us");
        let now = Instant::now();
        tracker.apply(&group, &[entry("100@c.us", PresenceState::Typing)], now);
        assert!(tracker.is_typing_at(&group, now));

        tracker.set_account(ME);
        assert!(!tracker.is_typing_at(&group, now));
    }

    #[test]
    fn latest_state_supersedes() {
        let mut tracker = tracker();
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();
        tracker.apply(&chat, &[entry("200@c.us", PresenceState::Typing)], now);
        assert!(tracker.apply(&chat, &[entry("200@c.us", PresenceState::Paused)], now));
        assert!(!tracker.is_typing_at(&chat, now));
        assert_eq!(tracker.presence(&chat).len(), 1);
    }

    #[test]
    fn repeated_state_is_not_a_change() {
        let mut tracker = tracker();
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();
        tracker.apply(&chat, &[entry("200@c.us", PresenceState::Online)], now);
        assert!(!tracker.apply(&chat, &[entry("200@c.us", PresenceState::Online)], now));
    }

    #[test]
    fn message_from_sender_clears_typing() {
        let mut tracker = tracker();
        let group = ChatId::from("1-2@g.us");
        let now = Instant::now();
        tracker.apply(
            &group,
            &[
                entry("200@c.us", PresenceState::Typing),
                entry("300@c.us", PresenceState::Typing),
            ],
            now,
        );

        let changed = tracker.clear_typing_for_sender("200:2@s.whatsapp.net");
        assert_eq!(changed, vec![group.clone()]);
        assert_eq!(tracker.typing_participants(&group, now), vec!["300@c.us"]);
        assert!(tracker.clear_typing_for_sender("200@c.us").is_empty());
    }

    #[test]
    fn typing_expires_without_refresh() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(30));
        tracker.set_account(ME);
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();
        tracker.apply(&chat, &[entry("200@c.us", PresenceState::Typing)], now);

        let later = now + Duration::from_secs(30);
        assert!(!tracker.is_typing_at(&chat, later));
        assert!(tracker.expire_typing(now + Duration::from_secs(29)).is_empty());
        assert_eq!(tracker.expire_typing(later), vec![chat.clone()]);
        assert_eq!(tracker.presence(&chat)[0].state, PresenceState::Paused);
    }

    #[test]
    fn refresh_extends_typing() {
        let mut tracker = tracker();
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();
        tracker.apply(&chat, &[entry("200@c.us", PresenceState::Typing)], now);
        let refreshed = now + Duration::from_secs(20);
        tracker.apply(&chat, &[entry("200@c.us", PresenceState::Typing)], refreshed);
        assert!(tracker.is_typing_at(&chat, now + Duration::from_secs(40)));
    }

    #[test]
    fn remove_and_clear() {
        let mut tracker = tracker();
        let a = ChatId::from("200@c.us");
        let b = ChatId::from("300@c.us");
        let now = Instant::now();
        tracker.apply(&a, &[entry("200@c.us", PresenceState::Online)], now);
        tracker.apply(&b, &[entry("300@c.us", PresenceState::Online)], now);

        tracker.remove_chat(&a);
        assert!(tracker.presence(&a).is_empty());
        assert_eq!(tracker.presence(&b).len(), 1);
        tracker.clear();
        assert!(tracker.presence(&b).is_empty());
    }

    #[test]
    fn activity_goes_online_once() {
        let mut activity = ActivityTracker::default();
        let now = Instant::now();
        assert_eq!(activity.record_activity(now), Some(PresenceBroadcast::Online));
        assert_eq!(activity.record_activity(now + Duration::from_secs(1)), None);
        assert!(activity.is_online());
    }

    #[test]
    fn idle_flips_offline_after_timeout() {
        let mut activity = ActivityTracker::new(Duration::from_secs(30), DEFAULT_RESUBSCRIBE_INTERVAL);
        let now = Instant::now();
        activity.record_activity(now);

        assert_eq!(activity.check_idle(now + Duration::from_secs(25)), None);
        assert_eq!(
            activity.check_idle(now + Duration::from_secs(30)),
            Some(PresenceBroadcast::Offline)
        );
        assert_eq!(activity.check_idle(now + Duration::from_secs(35)), None);
        assert_eq!(
            activity.record_activity(now + Duration::from_secs(40)),
            Some(PresenceBroadcast::Online)
        );
    }

    #[test]
    fn resubscribe_schedule() {
        let mut activity = ActivityTracker::new(DEFAULT_IDLE_TIMEOUT, Duration::from_secs(300));
        let chat = ChatId::from("200@c.us");
        let now = Instant::now();

        assert!(activity.subscription_due(&chat, now));
        activity.mark_subscribed(&chat, now);
        assert!(!activity.subscription_due(&chat, now + Duration::from_secs(299)));
        assert!(activity.subscription_due(&chat, now + Duration::from_secs(300)));

        activity.reset_subscriptions();
        assert!(activity.subscription_due(&chat, now));
    }
}
