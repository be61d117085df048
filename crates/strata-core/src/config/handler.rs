//! Audit event handler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{duration_str, ConfigError, TableMapping};

/// Configuration for the SQL audit event handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler name, used in log output.
    #[serde(default = "default_name")]
    pub name: String,

    /// Whether the handler accepts events.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database type tag selecting the SQL dialect ("generic", "mysql", "h2",
    /// "sqlite", "postgres", "oracle").
    #[serde(default = "default_database_type")]
    pub database_type: String,

    /// Write buffering.
    #[serde(default)]
    pub buffering: BufferingConfig,

    /// One mapping per audit topic.
    #[serde(default)]
    pub table_mappings: Vec<TableMapping>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            enabled: true,
            database_type: default_database_type(),
            buffering: BufferingConfig::default(),
            table_mappings: Vec::new(),
        }
    }
}

impl HandlerConfig {
    /// Find the mapping for `topic` (case-insensitive).
    pub fn table_mapping(&self, topic: &str) -> Option<&TableMapping> {
        self.table_mappings
            .iter()
            .find(|m| m.event.eq_ignore_ascii_case(topic))
    }
}

/// Configuration of the buffered (batched, asynchronous) write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingConfig {
    /// Whether creates are buffered. When false every create is written directly.
    #[serde(default)]
    pub enabled: bool,

    /// Queue capacity. Producers wait when the queue is full.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Interval between drains of the queue.
    #[serde(default = "default_write_interval", with = "duration_str")]
    pub write_interval: Duration,

    /// Number of concurrent batch writers.
    #[serde(default = "default_writer_threads")]
    pub writer_threads: usize,

    /// Upper bound on the number of events written in one batch.
    #[serde(default = "default_max_batched_events")]
    pub max_batched_events: usize,

    /// Whether queued events are written on shutdown. When false they are discarded.
    #[serde(default = "default_true")]
    pub auto_flush: bool,

    /// How long shutdown waits for in-flight batches.
    #[serde(default = "default_shutdown_timeout", with = "duration_str")]
    pub shutdown_timeout: Duration,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: default_max_size(),
            write_interval: default_write_interval(),
            writer_threads: default_writer_threads(),
            max_batched_events: default_max_batched_events(),
            auto_flush: true,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl BufferingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Config(
                "buffering.max_size must be at least 1".to_string(),
            ));
        }
        if self.writer_threads == 0 {
            return Err(ConfigError::Config(
                "buffering.writer_threads must be at least 1".to_string(),
            ));
        }
        if self.max_batched_events == 0 {
            return Err(ConfigError::Config(
                "buffering.max_batched_events must be at least 1".to_string(),
            ));
        }
        if self.write_interval.is_zero() {
            return Err(ConfigError::Config(
                "buffering.write_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_name() -> String {
    "sql".to_string()
}

fn default_database_type() -> String {
    "generic".to_string()
}

fn default_max_size() -> usize {
    5000
}

fn default_write_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_writer_threads() -> usize {
    1
}

fn default_max_batched_events() -> usize {
    100
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}
