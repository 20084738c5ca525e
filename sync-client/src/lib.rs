//! # sync-client
//!
//! Async synchronization engine for chatmirror.
//!
//! This is the library a front end embeds to mirror a remote messaging
//! account. It drives the pure state machines of `sync-core` with real
//! I/O and timers.
//!
//! ## Features
//!
//! - **Push + pull**: a reconnecting push channel plus interval polling
//! - **Retry Executor**: exponential backoff with jitter for transient failures
//! - **TTL Cache**: remote reads are served from a short-lived cache
//! - **Single-writer engine**: one task owns all state, no locks
//! - **Incremental rendering**: list changes arrive as no-op / patch / rebuild plans
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_client::{EngineHandle, EngineOptions, MockRemote};
//!
//! let (views, mut changes) = tokio::sync::mpsc::unbounded_channel();
//! let (alerts, _) = tokio::sync::mpsc::unbounded_channel();
//! let engine = EngineHandle::start(
//!     Arc::new(MockRemote::new()),
//!     EngineOptions::default(),
//!     Arc::new(views),
//!     Arc::new(alerts),
//! )?;
//!
//! engine.select_chat(Some("123@c.us".into())).await?;
//! while let Some(change) = changes.recv().await { /* redraw */ }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod remote;
pub mod retry;
pub mod scheduler;
pub mod sink;

pub use config::{BackoffConfig, ConfigError, EngineOptions};
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager};
pub use engine::{EngineHandle, EngineSnapshot};
pub use error::EngineError;
pub use remote::{FrameReceiver, MockRemote, RemoteCall, RemoteService};
pub use retry::RetryExecutor;
pub use scheduler::{spawn_ticker, Scheduler, Tick};
pub use sink::{ChangeKind, Discard, NewMessageAlert, NotificationSink, ViewChange, ViewSink};

/// Current time for the pure-core clocks.
///
/// Read from tokio's clock so paused-time tests move it too.
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
