//! # strata-core
//!
//! Shared types for the strata audit pipeline:
//!
//! - [`config`]: handler, buffering, table-mapping and connection-pool configuration
//!   loaded from YAML.
//! - [`schema`]: the per-topic JSON schemas and the field-type lookup used when binding
//!   and decoding event fields.
//! - [`path`]: field paths (JSON pointer or dotted notation) into an event record.

pub mod config;
pub mod path;
pub mod schema;

pub use config::{
    BufferingConfig, ConfigError, ConnectionPoolConfig, HandlerConfig, StrataConfig, TableMapping,
};
pub use path::FieldPath;
pub use schema::{EventSchema, EventTopics, FieldKind, SchemaError};

/// Field holding the content identifier of an audit event.
pub const CONTENT_ID_FIELD: &str = "_id";
