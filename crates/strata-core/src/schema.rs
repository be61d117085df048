//! Event-topic schemas.
//!
//! Each audit topic is described by a JSON schema. The pipeline only needs one thing
//! from it: the declared `type` of a field, which decides how the field is bound as a
//! statement parameter and how a stored column is turned back into JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::path::FieldPath;

/// Declared type of an event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    /// Map a JSON schema type name to a field kind.
    pub fn from_schema_type(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "number" | "integer" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    /// Infer a kind from the shape of a JSON value. Used for fields the schema does
    /// not describe.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) | Value::Null => Self::String,
        }
    }

    /// Whether values of this kind are stored as JSON text.
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Object | Self::Array)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Errors raised while reading field types out of a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field '{field}' declares unsupported schema type '{type_name}'")]
    UnknownFieldType { field: String, type_name: String },
}

/// JSON schema of one audit topic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSchema {
    root: Value,
}

impl EventSchema {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Schema with no properties; every field kind is inferred from its value.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Declared kind of the field at `path`, or `None` when the schema does not
    /// describe it.
    ///
    /// Nested fields are resolved through `properties`; array elements through
    /// `items`. A union type such as `["string", "null"]` resolves to its first
    /// non-null member.
    pub fn field_kind(&self, path: &FieldPath) -> Result<Option<FieldKind>, SchemaError> {
        let mut node = &self.root;
        for token in path.tokens() {
            let next = node
                .get("properties")
                .and_then(|props| props.get(token.as_str()))
                .or_else(|| node.get("items"));
            match next {
                Some(n) => node = n,
                None => return Ok(None),
            }
        }

        let type_name = match node.get("type") {
            Some(Value::String(name)) => name.as_str(),
            Some(Value::Array(names)) => match names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null")
            {
                Some(name) => name,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        FieldKind::from_schema_type(type_name)
            .map(Some)
            .ok_or_else(|| SchemaError::UnknownFieldType {
                field: path.to_string(),
                type_name: type_name.to_string(),
            })
    }
}

/// Schemas for every configured audit topic.
#[derive(Debug, Clone, Default)]
pub struct EventTopics {
    schemas: HashMap<String, EventSchema>,
}

impl EventTopics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, topic: impl Into<String>, schema: Value) -> Self {
        self.insert(topic, schema);
        self
    }

    pub fn insert(&mut self, topic: impl Into<String>, schema: Value) {
        self.schemas.insert(topic.into(), EventSchema::new(schema));
    }

    /// Schema of `topic`. Exact names win over case-insensitive matches.
    pub fn schema(&self, topic: &str) -> Option<&EventSchema> {
        self.schemas.get(topic).or_else(|| {
            self.schemas
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(topic))
                .map(|(_, schema)| schema)
        })
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
