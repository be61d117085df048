//! CLI command implementations for strata.

pub mod check;
pub mod events;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use strata_core::{EventTopics, StrataConfig};

/// Load the configuration and resolve topic schemas relative to the config file.
pub fn load(config_path: &Path) -> Result<(StrataConfig, EventTopics)> {
    let config = StrataConfig::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let topics = config
        .event_topics(base_dir(config_path))
        .context("Failed to load topic schemas")?;
    Ok((config, topics))
}

fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
