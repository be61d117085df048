//! Configuration types for the strata audit pipeline.
//!
//! Configuration is loaded from a single YAML file (`strata.yaml`):
//!
//! ```yaml
//! handler:
//!   database_type: postgres
//!   buffering:
//!     enabled: true
//!     max_size: 5000
//!     write_interval: 250ms
//!     writer_threads: 2
//!     max_batched_events: 100
//!   table_mappings:
//!     - event: access
//!       table: audit_access
//!       field_to_column:
//!         _id: id
//!         /timestamp: event_time
//! connection_pool:
//!   url_env: DATABASE_URL
//! topics:
//!   access: schemas/access.json
//! ```

pub mod handler;
pub mod mapping;
pub mod pool;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::EventTopics;

pub use handler::{BufferingConfig, HandlerConfig};
pub use mapping::TableMapping;
pub use pool::ConnectionPoolConfig;

/// Complete strata configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Handler settings: dialect, buffering and table mappings.
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Connection pool used when the caller does not provide one.
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Topic schemas, inline or as paths to JSON files.
    #[serde(default)]
    pub topics: HashMap<String, TopicSchemaSource>,
}

/// Where a topic schema comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicSchemaSource {
    /// Path to a JSON schema file, relative to the configuration file.
    File(PathBuf),
    /// Schema written inline in the configuration.
    Inline(serde_json::Value),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StrataConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.handler.buffering.validate()?;
        for mapping in &self.handler.table_mappings {
            mapping.validate()?;
        }
        Ok(())
    }

    /// Resolve the topic schemas, reading file references relative to `base_dir`.
    pub fn event_topics(&self, base_dir: impl AsRef<Path>) -> Result<EventTopics, ConfigError> {
        let base_dir = base_dir.as_ref();
        let mut topics = EventTopics::new();
        for (topic, source) in &self.topics {
            let schema = match source {
                TopicSchemaSource::Inline(value) => value.clone(),
                TopicSchemaSource::File(file) => {
                    let path = if file.is_absolute() {
                        file.clone()
                    } else {
                        base_dir.join(file)
                    };
                    let content = fs::read_to_string(&path)?;
                    serde_json::from_str(&content)
                        .map_err(|source| ConfigError::Json { path, source })?
                }
            };
            topics.insert(topic.clone(), schema);
        }
        Ok(topics)
    }
}

/// Serde adapter for `Duration` values written as human-readable strings
/// (`"250ms"`, `"5s"`, `"1m 30s"`).
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
