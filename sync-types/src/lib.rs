//! # sync-types
//!
//! Data model and wire types for chatmirror.
//!
//! This crate provides the foundational types used across all chatmirror crates:
//! - [`ChatId`] and participant-id normalization
//! - [`Chat`], [`Message`], [`Session`], [`ParticipantPresence`] - the mirrored model
//! - [`EventFrame`] / [`PushEvent`] - push-channel event decoding
//! - [`RemoteError`] - the remote-service error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;
mod model;
pub mod payload;

pub use error::{DecodeError, ErrorKind, RemoteError};
pub use events::{names as event_names, EventFrame, PushEvent};
pub use ids::{is_same_participant, normalize_id, ChatId, ChatKind};
pub use model::{
    Ack, Chat, Contact, LastMessage, Message, ParticipantPresence, PresenceState, Reactions,
    Session, SessionMe, SessionStatus, REVOKED_PREVIEW,
};
