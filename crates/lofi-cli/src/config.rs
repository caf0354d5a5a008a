//! Optional TOML configuration file
//!
//! ```toml
//! db = "/var/lib/lofi/workspace.db"
//! package = "/etc/lofi/package.json"
//! log_level = "debug"
//! ```
//!
//! Command line flags and environment variables take precedence.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite workspace; in-memory when unset
    pub db: Option<PathBuf>,
    /// JSON package descriptor
    pub package: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
