//! Engine options lookup for the CLI.
//!
//! An explicit `--config` path must exist. Without one, the per-user config
//! file is used when present, and built-in defaults otherwise.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use sync_client::EngineOptions;

/// File name inside the config directory.
const CONFIG_FILE: &str = "config.toml";

/// Where the options came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The file given on the command line.
    Explicit(PathBuf),
    /// The per-user config file.
    UserConfig(PathBuf),
    /// Nothing found; built-in defaults.
    Defaults,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(path) | Self::UserConfig(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Validated options plus their origin.
#[derive(Debug, Clone)]
pub struct Loaded {
    /// The options.
    pub options: EngineOptions,
    /// Where they came from.
    pub source: Source,
}

/// Resolve and load the engine options.
pub fn load(explicit: Option<&Path>) -> Result<Loaded> {
    load_from(explicit, default_config_path())
}

fn load_from(explicit: Option<&Path>, user_config: Option<PathBuf>) -> Result<Loaded> {
    let source = match explicit {
        Some(path) => Source::Explicit(path.to_path_buf()),
        None => match user_config {
            Some(path) if path.exists() => Source::UserConfig(path),
            _ => Source::Defaults,
        },
    };

    let options = match &source {
        Source::Explicit(path) | Source::UserConfig(path) => EngineOptions::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        Source::Defaults => EngineOptions::default(),
    };
    options.validate().context("Invalid engine options")?;

    tracing::debug!("Using engine options from {}", source);
    Ok(Loaded { options, source })
}

/// Per-user config file path, if a home directory is known.
fn default_config_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "chatmirror", "chatmirror")?;
    Some(dirs.config_dir().join(CONFIG_FILE))
}
