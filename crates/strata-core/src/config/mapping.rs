//! Table mappings: which table an audit topic is stored in, and which column holds
//! each event field.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::ConfigError;
use crate::CONTENT_ID_FIELD;

/// Binds one audit topic to a table and its field-to-column dictionary.
///
/// The dictionary keeps the order it was configured in; statements list columns in
/// that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Audit topic name.
    pub event: String,

    /// Physical table name.
    pub table: String,

    /// Field path to column name, in configuration order.
    #[serde(default, with = "ordered_pairs")]
    pub field_to_column: Vec<(String, String)>,
}

impl TableMapping {
    pub fn new(event: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            table: table.into(),
            field_to_column: Vec::new(),
        }
    }

    /// Append a field-to-column pair.
    pub fn with_field(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.field_to_column.push((field.into(), column.into()));
        self
    }

    /// Iterate `(field, column)` pairs in configuration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.field_to_column
            .iter()
            .map(|(f, c)| (f.as_str(), c.as_str()))
    }

    /// Column mapped from `field`.
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.fields().find(|(f, _)| *f == field).map(|(_, c)| c)
    }

    /// Column holding the event's content identifier.
    pub fn id_column(&self) -> Option<&str> {
        self.column_for(CONTENT_ID_FIELD)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event.trim().is_empty() {
            return Err(ConfigError::Config(
                "table mapping has an empty event name".to_string(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Config(format!(
                "table mapping for '{}' has an empty table name",
                self.event
            )));
        }
        for (i, (field, column)) in self.field_to_column.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(ConfigError::Config(format!(
                    "field '{}' of '{}' maps to an empty column name",
                    field, self.event
                )));
            }
            if self.field_to_column[..i].iter().any(|(f, _)| f == field) {
                return Err(ConfigError::Config(format!(
                    "field '{}' of '{}' is mapped more than once",
                    field, self.event
                )));
            }
        }
        Ok(())
    }
}

/// (De)serializes a list of pairs as a map, preserving entry order.
mod ordered_pairs {
    use super::*;

    pub fn serialize<S: Serializer>(
        pairs: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field paths to column names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((field, column)) = access.next_entry::<String, String>()? {
                    pairs.push((field, column));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_preserved() {
        let yaml = "event: access\ntable: t\nfield_to_column:\n  z: c1\n  a: c2\n  m: c3\n";
        let mapping: TableMapping = serde_yaml::from_str(yaml).unwrap();
        let fields: Vec<_> = mapping.fields().map(|(f, _)| f).collect();
        assert_eq!(fields, ["z", "a", "m"]);

        let back = serde_yaml::to_string(&mapping).unwrap();
        assert!(back.find("z: c1").unwrap() < back.find("a: c2").unwrap());
    }

    #[test]
    fn test_id_column() {
        let mapping = TableMapping::new("access", "t")
            .with_field("_id", "id")
            .with_field("/timestamp", "ts");
        assert_eq!(mapping.id_column(), Some("id"));
        assert_eq!(mapping.column_for("/timestamp"), Some("ts"));
        assert_eq!(TableMapping::new("x", "t").id_column(), None);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_blanks() {
        let dup = TableMapping::new("access", "t")
            .with_field("a", "c1")
            .with_field("a", "c2");
        assert!(dup.validate().is_err());

        assert!(TableMapping::new("access", " ").validate().is_err());
        assert!(TableMapping::new("access", "t")
            .with_field("a", "")
            .validate()
            .is_err());
    }
}
