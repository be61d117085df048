//! Field paths into an audit event record.
//!
//! Table mappings name event fields either as JSON pointers (`/http/request/method`)
//! or in dotted notation (`http.request.method`). A bare name (`_id`) is a single
//! top-level field.

use serde_json::{Map, Value};
use std::fmt;

/// A parsed path to a (possibly nested) event field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    tokens: Vec<String>,
}

impl FieldPath {
    /// Parse a field path. Pointer syntax is used when the path starts with `/`,
    /// dotted syntax otherwise.
    pub fn parse(path: &str) -> Self {
        let tokens = if let Some(pointer) = path.strip_prefix('/') {
            pointer
                .split('/')
                .map(|t| t.replace("~1", "/").replace("~0", "~"))
                .collect()
        } else {
            path.split('.').map(str::to_string).collect()
        };
        Self { tokens }
    }

    /// The individual path segments.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Look up the value at this path. Array segments are addressed by index.
    pub fn get<'a>(&self, event: &'a Value) -> Option<&'a Value> {
        let mut node = event;
        for token in &self.tokens {
            node = match node {
                Value::Object(map) => map.get(token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Store `value` at this path, creating intermediate objects as needed and
    /// replacing any non-object value found along the way.
    pub fn put(&self, event: &mut Value, value: Value) {
        let Some((last, parents)) = self.tokens.split_last() else {
            *event = value;
            return;
        };

        let mut node = event;
        for token in parents {
            node = object_mut(node)
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        object_mut(node).insert(last.clone(), value);
    }
}

fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pointer_and_dotted() {
        assert_eq!(FieldPath::parse("/a/b").tokens(), ["a", "b"]);
        assert_eq!(FieldPath::parse("a.b").tokens(), ["a", "b"]);
        assert_eq!(FieldPath::parse("_id").tokens(), ["_id"]);
        assert_eq!(FieldPath::parse("/a~1b/c~0d").tokens(), ["a/b", "c~d"]);
    }

    #[test]
    fn test_get_nested_and_array() {
        let event = json!({ "http": { "request": { "method": "GET" } }, "tags": ["x", "y"] });
        assert_eq!(
            FieldPath::parse("/http/request/method").get(&event),
            Some(&json!("GET"))
        );
        assert_eq!(FieldPath::parse("tags.1").get(&event), Some(&json!("y")));
        assert_eq!(FieldPath::parse("/http/missing").get(&event), None);
    }

    #[test]
    fn test_put_creates_intermediate_objects() {
        let mut event = json!({ "http": "not-an-object" });
        FieldPath::parse("/http/request/method").put(&mut event, json!("POST"));
        FieldPath::parse("_id").put(&mut event, json!("abc"));
        assert_eq!(
            event,
            json!({ "http": { "request": { "method": "POST" } }, "_id": "abc" })
        );
    }

    #[test]
    fn test_display_is_pointer() {
        assert_eq!(FieldPath::parse("a.b").to_string(), "/a/b");
    }
}
