//! Connection manager for the push channel.
//!
//! Runs as its own task and interprets the actions of the pure
//! [`ConnectionState`] machine from sync-core:
//!
//! ```text
//! ConnectionManager ──open_events()──► RemoteService
//!        │  ▲
//!        │  └── Event (Opened / Failed / Closed / ReconnectTimer)
//!        ▼
//!  ConnectionState::on_event ──► Action (OpenChannel, StartReconnectTimer, ...)
//! ```
//!
//! Frames are decoded into [`EventFrame`]s and batched with a debounce
//! window before being forwarded. Malformed frames are logged and dropped.
//! The manager never touches engine state; it only sends
//! [`ConnectionEvent`]s.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use sync_core::state::{Action, ConnectionState, ConnectionStatus, Event};
use sync_core::{EventBatcher, RetryPolicy};
use sync_types::EventFrame;

use crate::remote::{FrameReceiver, RemoteService};

/// What the connection manager reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection status changed.
    Status(ConnectionStatus),
    /// A debounced batch of decoded push events, in arrival order.
    Batch(Vec<EventFrame>),
    /// The channel (re)opened; local state should be pulled again.
    Resync,
}

/// Push channel settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Reconnect backoff.
    pub reconnect: RetryPolicy,
    /// Debounce window for event batches.
    pub debounce: Duration,
    /// Events per batch before a forced flush.
    pub max_batch: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: RetryPolicy::reconnect(),
            debounce: sync_core::batch::DEFAULT_WINDOW,
            max_batch: sync_core::batch::DEFAULT_MAX_BATCH,
        }
    }
}

/// Handle to a running connection manager.
#[derive(Debug)]
pub struct ConnectionHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Deliberately disconnect and wait for the task to finish.
    ///
    /// Terminal: pending reconnect timers are dropped and no further
    /// attempts are made.
    pub async fn disconnect(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Connection task failed: {}", e);
        }
    }

    /// Whether the manager task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Owns the push channel and its reconnect loop.
pub struct ConnectionManager<R: RemoteService, M> {
    remote: Arc<R>,
    config: ConnectionConfig,
    events: mpsc::Sender<M>,
    state: ConnectionState,
    actions: VecDeque<Action>,
    frames: Option<FrameReceiver>,
    reconnect_at: Option<Instant>,
    batcher: EventBatcher<EventFrame>,
}

impl<R, M> ConnectionManager<R, M>
where
    R: RemoteService,
    M: From<ConnectionEvent> + Send + 'static,
{
    /// Create a manager that reports to `events`.
    pub fn new(remote: Arc<R>, config: ConnectionConfig, events: mpsc::Sender<M>) -> Self {
        Self {
            remote,
            events,
            state: ConnectionState::new(),
            actions: VecDeque::new(),
            frames: None,
            reconnect_at: None,
            batcher: EventBatcher::new(config.debounce, config.max_batch),
            config,
        }
    }

    /// Start connecting in a background task.
    pub fn spawn(self) -> ConnectionHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        ConnectionHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    fn feed(&mut self, event: Event) {
        let (next, actions) = std::mem::take(&mut self.state).on_event(event, &self.config.reconnect);
        self.state = next;
        self.actions.extend(actions);
    }

    /// Forward to the engine. Returns false if the engine is gone.
    async fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(M::from(event)).await.is_ok()
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        self.feed(Event::ConnectRequested);

        loop {
            if !self.execute_actions().await {
                tracing::debug!("Engine gone, stopping connection manager");
                return;
            }
            if matches!(self.state, ConnectionState::Disconnected) {
                tracing::info!("Connection manager stopped");
                return;
            }

            let deadline = self.batcher.deadline().map(Instant::from_std);
            tokio::select! {
                _ = &mut stop => {
                    self.flush_batch().await;
                    self.feed(Event::DisconnectRequested);
                }
                _ = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.feed(Event::ReconnectTimer);
                }
                _ = sleep_until(deadline) => {
                    if let Some(batch) = self.batcher.flush_due(Instant::now().into_std()) {
                        if !self.emit(ConnectionEvent::Batch(batch)).await {
                            return;
                        }
                    }
                }
                frame = next_frame(&mut self.frames) => match frame {
                    Some(text) => {
                        if !self.accept(&text).await {
                            return;
                        }
                    }
                    None => {
                        self.frames = None;
                        self.flush_batch().await;
                        self.feed(Event::Closed {
                            reason: "event stream closed".to_string(),
                        });
                    }
                },
            }
        }
    }

    /// Decode one frame into the current batch.
    async fn accept(&mut self, text: &str) -> bool {
        match EventFrame::decode(text) {
            Ok(frame) => {
                tracing::debug!("Received {} event", frame.event.name());
                if let Some(batch) = self.batcher.push(frame, Instant::now().into_std()) {
                    return self.emit(ConnectionEvent::Batch(batch)).await;
                }
                true
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                true
            }
        }
    }

    async fn flush_batch(&mut self) {
        let batch = self.batcher.flush();
        if !batch.is_empty() {
            self.emit(ConnectionEvent::Batch(batch)).await;
        }
    }

    /// Run queued actions. Returns false if the engine is gone.
    async fn execute_actions(&mut self) -> bool {
        while let Some(action) = self.actions.pop_front() {
            match action {
                Action::OpenChannel => match self.remote.open_events().await {
                    Ok(frames) => {
                        self.frames = Some(frames);
                        self.feed(Event::Opened);
                    }
                    Err(e) => self.feed(Event::Failed {
                        error: e.to_string(),
                    }),
                },
                Action::CloseChannel => {
                    self.frames = None;
                }
                Action::StartReconnectTimer { delay } => {
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                Action::CancelReconnect => {
                    self.reconnect_at = None;
                }
                Action::Resync => {
                    if !self.emit(ConnectionEvent::Resync).await {
                        return false;
                    }
                }
                Action::EmitStatus(status) => {
                    log_status(&status);
                    if !self.emit(ConnectionEvent::Status(status)).await {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn log_status(status: &ConnectionStatus) {
    match status {
        ConnectionStatus::Connecting => tracing::debug!("Connecting push channel"),
        ConnectionStatus::Connected => tracing::info!("Push channel connected"),
        ConnectionStatus::Disconnected => tracing::info!("Push channel disconnected"),
        ConnectionStatus::ReconnectScheduled {
            attempt,
            delay,
            reason,
        } => tracing::warn!(
            "Push channel lost ({}), reconnect attempt {} in {:?}",
            reason,
            attempt,
            delay
        ),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_frame(frames: &mut Option<FrameReceiver>) -> Option<String> {
    match frames {
        Some(frames) => frames.recv().await,
        None => std::future::pending().await,
    }
}
