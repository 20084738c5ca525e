//! Connection state machine for the push channel.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the push-channel lifecycle. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the channel, sleeping, closing) is performed by
//! the connection manager in sync-client, not by this module.
//!
//! ```text
//! Disconnected ──ConnectRequested──► Connecting ──Opened──► Connected
//!      ▲                               ▲   │                   │
//!      │ DisconnectRequested           │   │ Failed            │ Closed
//!      │ (from any state)   ReconnectTimer │                   │
//!      │                               │   ▼                   ▼
//!      └──────────────────────── ReconnectScheduled ◄──────────┘
//! ```
//!
//! The attempt counter grows with every failed connect and resets only when
//! the channel opens. A deliberate disconnect is terminal: late `Closed`,
//! `Failed` or timer events in `Disconnected` are ignored.

use std::time::Duration;

use crate::backoff::RetryPolicy;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and none wanted.
    Disconnected,
    /// Channel open in progress.
    Connecting {
        /// Consecutive failed attempts before this one.
        attempt: u32,
    },
    /// Channel open and delivering events.
    Connected,
    /// Channel lost, waiting for the reconnect timer.
    ReconnectScheduled {
        /// Consecutive failed attempts so far (1-based).
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// `policy` supplies the reconnect backoff schedule.
    pub fn on_event(self, event: Event, policy: &RetryPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => (
                Self::Connecting { attempt: 0 },
                vec![
                    Action::EmitStatus(ConnectionStatus::Connecting),
                    Action::OpenChannel,
                ],
            ),

            // From Connecting
            (Self::Connecting { .. }, Event::Opened) => (
                Self::Connected,
                vec![
                    Action::EmitStatus(ConnectionStatus::Connected),
                    Action::Resync,
                ],
            ),
            (Self::Connecting { attempt }, Event::Failed { error }) => {
                schedule_reconnect(attempt.saturating_add(1), error, policy)
            }

            // From Connected
            (Self::Connected, Event::Closed { reason }) => schedule_reconnect(1, reason, policy),

            // From ReconnectScheduled
            (Self::ReconnectScheduled { attempt }, Event::ReconnectTimer) => (
                Self::Connecting { attempt },
                vec![
                    Action::EmitStatus(ConnectionStatus::Connecting),
                    Action::OpenChannel,
                ],
            ),

            // Deliberate disconnect is terminal from every live state
            (Self::Connected, Event::DisconnectRequested)
            | (Self::Connecting { .. }, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::CloseChannel,
                    Action::EmitStatus(ConnectionStatus::Disconnected),
                ],
            ),
            (Self::ReconnectScheduled { .. }, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::CancelReconnect,
                    Action::EmitStatus(ConnectionStatus::Disconnected),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Connecting { .. } | Self::ReconnectScheduled { .. }
        )
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        match self {
            Self::Connecting { attempt } | Self::ReconnectScheduled { attempt } => *attempt,
            Self::Disconnected | Self::Connected => 0,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

fn schedule_reconnect(
    attempt: u32,
    reason: String,
    policy: &RetryPolicy,
) -> (ConnectionState, Vec<Action>) {
    let delay = policy.delay(attempt);
    (
        ConnectionState::ReconnectScheduled { attempt },
        vec![
            Action::EmitStatus(ConnectionStatus::ReconnectScheduled {
                attempt,
                delay,
                reason,
            }),
            Action::StartReconnectTimer { delay },
        ],
    )
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked for a connection.
    ConnectRequested,
    /// The channel opened.
    Opened,
    /// Opening the channel failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// An open channel closed or errored.
    Closed {
        /// Reason for the close.
        reason: String,
    },
    /// Caller asked for a terminal disconnect.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the connection manager.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the push channel.
    OpenChannel,
    /// Close the push channel (or abandon an open in progress).
    CloseChannel,
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Pull fresh state: ordering is not preserved across a reconnect.
    Resync,
    /// Publish a status change to the application.
    EmitStatus(ConnectionStatus),
}

/// Connection status published to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected and not trying.
    Disconnected,
    /// Opening the channel.
    Connecting,
    /// Channel open.
    Connected,
    /// Waiting to reconnect.
    ReconnectScheduled {
        /// Consecutive failed attempts.
        attempt: u32,
        /// Delay until the next attempt.
        delay: Duration,
        /// Why the last attempt or channel failed.
        reason: String,
    },
}
