//! Connection pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{duration_str, ConfigError};

/// Settings for the pool the handler opens when none is supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    /// Database URL (`postgres://...`, `sqlite:...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment variable containing the database URL. Takes precedence over `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_env: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout", with = "duration_str")]
    pub connect_timeout: Duration,

    #[serde(default = "default_idle_timeout", with = "duration_str")]
    pub idle_timeout: Duration,

    #[serde(default = "default_max_lifetime", with = "duration_str")]
    pub max_lifetime: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: None,
            max_connections: default_max_connections(),
            min_connections: 0,
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_lifetime: default_max_lifetime(),
        }
    }
}

impl ConnectionPoolConfig {
    /// Resolve the database URL, preferring the environment variable when it is set.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(env_var) = &self.url_env
            && let Ok(url) = std::env::var(env_var)
        {
            return Ok(url);
        }

        self.url.clone().ok_or_else(|| {
            ConfigError::Config(
                "connection_pool needs either `url` or a set `url_env` variable".to_string(),
            )
        })
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_lifetime() -> Duration {
    Duration::from_secs(1800)
}
