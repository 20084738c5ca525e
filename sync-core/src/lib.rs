//! # sync-core
//!
//! Pure logic for chatmirror (no I/O, instant tests).
//!
//! This crate implements the state machines and merge algorithms of the
//! synchronization engine without any network, timer or disk I/O, enabling
//! fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input (including the
//! current `Instant` where time matters) and produce output without side
//! effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about merges and state transitions
//!
//! The actual I/O (remote calls, sleeping, rendering) is performed by
//! `sync-client`, which owns these structures inside a single engine task
//! and interprets the actions they produce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod batch;
pub mod cache;
pub mod chats;
pub mod diff;
pub mod poll;
pub mod presence;
pub mod state;
pub mod store;

pub use backoff::{PolicyError, RetryPolicy, JITTER_FACTOR};
pub use batch::EventBatcher;
pub use cache::{keys as cache_keys, CacheEntry, TtlCache};
pub use chats::ChatCollection;
pub use diff::{ChatRow, Fingerprint, ListDiff, ListFingerprint, RenderPlan, RowRef};
pub use poll::{PollGuard, PollTask, PollTicket};
pub use presence::{ActivityTracker, PresenceBroadcast, PresenceTracker};
pub use state::{Action, ConnectionState, ConnectionStatus, Event};
pub use store::{AppendOutcome, MessageStore};
