//! Periodic timers.
//!
//! Each timer is its own task that only posts a [`Tick`] to the engine queue.
//! Whether a tick actually starts a fetch is decided by the engine through
//! [`sync_core::PollGuard`]; the timers know nothing about engine state.
//!
//! | timer | default period | tick |
//! |---|---|---|
//! | chat list poll | 10 s | `Tick::Poll(PollTask::ChatList)` |
//! | current chat poll | 3 s | `Tick::Poll(PollTask::CurrentChat)` |
//! | idle check | 5 s | `Tick::ActivityCheck` |
//! | presence re-subscribe check | 5 s | `Tick::PresenceResubscribe` |
//!
//! Poll timers are not started at all when polling is disabled.
//!
//! The re-subscribe timer runs on the idle-check period, not the 5 min
//! re-subscribe interval: a chat is due a full interval after *its* last
//! subscription, which rarely lines up with engine start. The engine asks
//! [`sync_core::ActivityTracker::subscription_due`] on every tick.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use sync_core::PollTask;

use crate::config::EngineOptions;

/// A timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A poll interval elapsed.
    Poll(PollTask),
    /// Time to check for idleness and expire stale typing.
    ActivityCheck,
    /// Time to re-assert presence interest in the foreground chat.
    PresenceResubscribe,
}

/// Spawn a task that posts `make()` every `period`, first after one period.
///
/// A tick that finds the queue full is dropped; missed ticks are skipped.
/// The task ends when the receiver is gone.
pub fn spawn_ticker<M, F>(
    name: &'static str,
    period: Duration,
    tx: mpsc::Sender<M>,
    make: F,
) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn() -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match tx.try_send(make()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("Engine busy, skipping {} tick", name);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Engine gone, stopping {} timer", name);
                    return;
                }
            }
        }
    })
}

/// The set of running timers. Aborts them on drop.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Start every timer `options` asks for.
    pub fn start<M>(options: &EngineOptions, tx: &mpsc::Sender<M>) -> Self
    where
        M: From<Tick> + Send + 'static,
    {
        let mut scheduler = Self::default();

        if options.enable_polling {
            scheduler.add("chat-list poll", options.chat_poll_interval(), tx, Tick::Poll(PollTask::ChatList));
            scheduler.add(
                "current-chat poll",
                options.message_poll_interval(),
                tx,
                Tick::Poll(PollTask::CurrentChat),
            );
        } else {
            tracing::info!("Polling disabled, relying on push events only");
        }
        scheduler.add("activity check", options.activity_check(), tx, Tick::ActivityCheck);
        scheduler.add(
            "presence resubscribe",
            options.activity_check().min(options.presence_resubscribe()),
            tx,
            Tick::PresenceResubscribe,
        );

        scheduler
    }

    fn add<M>(&mut self, name: &'static str, period: Duration, tx: &mpsc::Sender<M>, tick: Tick)
    where
        M: From<Tick> + Send + 'static,
    {
        tracing::debug!("Starting {} timer every {:?}", name, period);
        let handle = spawn_ticker(name, period, tx.clone(), move || M::from(tick));
        self.tasks.push((name, handle));
    }

    /// Names of the running timers.
    pub fn timers(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Number of running timers.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no timers are running.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort all timers.
    pub fn shutdown(&mut self) {
        for (name, handle) in self.tasks.drain(..) {
            tracing::debug!("Stopping {} timer", name);
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
