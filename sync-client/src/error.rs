//! Engine errors.

use thiserror::Error;

use crate::config::ConfigError;
use sync_types::RemoteError;

/// Errors surfaced by the engine and its handle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Options failed validation.
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),

    /// A remote call failed after retries.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The engine task has stopped.
    #[error("engine stopped")]
    Stopped,
}
