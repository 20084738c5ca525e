//! Replay captured push frames through the engine.
//!
//! The engine runs against a [`MockRemote`] that reports the configured
//! session as working and has no chats; everything shown is built from the
//! replayed events.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use sync_client::{
    ChangeKind, EngineHandle, EngineOptions, EngineSnapshot, MockRemote, NewMessageAlert,
    ViewChange,
};
use sync_core::{ConnectionStatus, RenderPlan};
use sync_types::{ChatId, Session, SessionMe, SessionStatus};

/// Run the replay command.
pub async fn run(
    options: EngineOptions,
    file: &Path,
    chat: Option<String>,
    settle_ms: u64,
) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let frames = parse_frames(&contents);
    println!("Replaying {} frames from {}", frames.len(), file.display());

    let remote = MockRemote::new();
    remote.set_sessions(vec![Session {
        name: options.session.clone(),
        status: SessionStatus::Working,
        me: options.account_id.clone().map(|id| SessionMe { id, push_name: None }),
    }]);

    let (view_tx, mut views) = mpsc::unbounded_channel();
    let (alert_tx, mut alerts) = mpsc::unbounded_channel();
    let engine = EngineHandle::start(
        Arc::new(remote.clone()),
        options,
        Arc::new(view_tx),
        Arc::new(alert_tx),
    )
    .context("Failed to start engine")?;

    if let Some(chat) = chat {
        engine.select_chat(Some(ChatId::new(chat))).await?;
    }
    for frame in frames {
        remote.push_frame(frame);
    }
    tokio::time::sleep(Duration::from_millis(settle_ms)).await;

    let snapshot = engine.snapshot().await?;
    engine.shutdown().await?;

    println!();
    println!("Changes:");
    while let Ok(change) = views.try_recv() {
        println!("  {}", describe_change(&change));
    }
    println!();
    println!("Notifications:");
    while let Ok(alert) = alerts.try_recv() {
        println!("  {}", describe_alert(&alert));
    }
    println!();
    print!("{}", describe_snapshot(&snapshot));

    Ok(())
}

/// Non-empty, non-comment lines that parse as JSON.
fn parse_frames(contents: &str) -> Vec<String> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(_) => Some(line.to_string()),
                Err(e) => {
                    tracing::warn!("Skipping line {}: {}", index + 1, e);
                    None
                }
            }
        })
        .collect()
}

fn describe_plan(plan: &RenderPlan) -> String {
    match plan {
        RenderPlan::Noop => "noop".to_string(),
        RenderPlan::Rebuild => "rebuild".to_string(),
        RenderPlan::Patch { rows } => {
            let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
            format!("patch [{}]", ids.join(", "))
        }
        RenderPlan::Selection { previous, current } => format!(
            "select {} -> {}",
            previous.as_ref().map_or("-", |r| r.id.as_str()),
            current.as_ref().map_or("-", |r| r.id.as_str()),
        ),
    }
}

fn describe_change(change: &ViewChange) -> String {
    let kind = match change.kind {
        ChangeKind::Data => "data",
        ChangeKind::Selection => "selection",
        ChangeKind::Scroll => "scroll",
        ChangeKind::View => "view",
        ChangeKind::Other => "other",
    };
    let mut line = format!("{:<9} {}", kind, describe_plan(&change.plan));
    if let Some(chat) = &change.chat {
        line.push_str(&format!(" chat={}", chat));
    }
    if change.auth_required {
        line.push_str(" auth-required");
    }
    if let Some(error) = &change.error {
        line.push_str(&format!(" error=\"{}\"", error));
    }
    line
}

fn describe_alert(alert: &NewMessageAlert) -> String {
    let mut tags = Vec::new();
    if alert.is_group {
        tags.push("group");
    }
    if alert.is_status {
        tags.push("status");
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(","))
    };
    format!(
        "{} ({}) from {}: {}{}",
        alert.chat_name, alert.chat_id, alert.sender, alert.preview, tags
    )
}

fn describe_connection(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Disconnected => "disconnected".to_string(),
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::ReconnectScheduled { attempt, delay, .. } => {
            format!("reconnect #{} in {:?}", attempt, delay)
        }
    }
}

fn describe_snapshot(snapshot: &EngineSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("Connection: {}\n", describe_connection(&snapshot.connection)));
    out.push_str(&format!(
        "Session:    {}\n",
        snapshot
            .session_status
            .map_or_else(|| "unknown".to_string(), |s| format!("{:?}", s))
    ));
    out.push_str(&format!("Chats:      {}\n", snapshot.chats.len()));
    for chat in &snapshot.chats {
        let typing = if snapshot.typing.contains(&chat.id) {
            " (typing)"
        } else {
            ""
        };
        let preview = chat
            .last_message
            .as_ref()
            .map_or("", |m| m.preview.as_str());
        out.push_str(&format!(
            "  {:<24} {:<16} unread={:<3} {}{}\n",
            chat.id.as_str(),
            chat.name,
            chat.unread_count,
            preview,
            typing
        ));
    }
    if let Some(current) = &snapshot.current_chat {
        out.push_str(&format!("Open chat:  {} ({} messages)\n", current, snapshot.messages.len()));
        for msg in &snapshot.messages {
            let reactions: Vec<String> = msg.reactions.iter().map(|(_, emoji)| emoji.to_string()).collect();
            let reactions = if reactions.is_empty() {
                String::new()
            } else {
                format!(" {}", reactions.join(""))
            };
            out.push_str(&format!(
                "  [{}] {} {:?}: {}{}\n",
                msg.timestamp,
                msg.sender,
                msg.ack,
                msg.preview(),
                reactions
            ));
        }
    }
    out
}
