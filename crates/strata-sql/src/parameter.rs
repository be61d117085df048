//! Statement parameters and prepared operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::any::AnyArguments;
use sqlx::Arguments;
use strata_core::FieldKind;

use crate::error::StrataError;

/// One statement parameter: a declared kind plus its value.
///
/// Object and array values are already encoded as JSON text when the parameter is
/// built; every other kind binds as its native scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub kind: FieldKind,
    pub value: Value,
}

impl Parameter {
    /// Build a parameter from an event value, encoding structured kinds as JSON text.
    pub fn encode(kind: FieldKind, value: &Value) -> Result<Self, StrataError> {
        let value = if kind.is_structured() && !value.is_null() {
            Value::String(serde_json::to_string(value)?)
        } else {
            value.clone()
        };
        Ok(Self { kind, value })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::String,
            value: Value::String(value.into()),
        }
    }

    pub fn number(value: i64) -> Self {
        Self {
            kind: FieldKind::Number,
            value: Value::from(value),
        }
    }

    /// Add this parameter to `args` as the `index`-th (1-based) bound value.
    fn bind_into(&self, args: &mut AnyArguments<'_>, index: usize) -> Result<(), StrataError> {
        let mismatch = |reason: String| StrataError::Bind {
            index,
            kind: self.kind,
            reason,
        };

        let added = match (&self.kind, &self.value) {
            (_, Value::Null) => args.add(Option::<String>::None),
            (FieldKind::String | FieldKind::Object | FieldKind::Array, Value::String(s)) => {
                args.add(s.clone())
            }
            (FieldKind::Number, Value::Number(n)) => match n.as_i64() {
                Some(i) => args.add(i),
                None => match n.as_f64() {
                    Some(f) => args.add(f),
                    None => return Err(mismatch(format!("{} is out of range", n))),
                },
            },
            (FieldKind::Boolean, Value::Bool(b)) => args.add(*b),
            (kind, other) => {
                return Err(mismatch(format!(
                    "expected {} value, got {}",
                    kind,
                    json_type_name(other)
                )));
            }
        };

        added.map_err(|e| mismatch(e.to_string()))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Bind `parameters` in order.
pub fn bind_parameters<'q>(parameters: &[Parameter]) -> Result<AnyArguments<'q>, StrataError> {
    let mut args = AnyArguments::default();
    for (i, parameter) in parameters.iter().enumerate() {
        parameter.bind_into(&mut args, i + 1)?;
    }
    Ok(args)
}

/// A statement template together with its ordered parameters.
///
/// Built fresh for each call and consumed by exactly one executor. In the buffered
/// path the operation itself is the queued item.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedOperation {
    topic: String,
    sql: String,
    parameters: Vec<Parameter>,
}

impl PreparedOperation {
    pub fn new(topic: impl Into<String>, sql: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            topic: topic.into(),
            sql: sql.into(),
            parameters,
        }
    }

    /// Audit topic the operation belongs to (for diagnostics).
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Statement template.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Whether two operations can share one prepared statement in a batch.
    pub fn shares_template(&self, other: &Self) -> bool {
        self.sql == other.sql
    }

    pub fn arguments<'q>(&self) -> Result<AnyArguments<'q>, StrataError> {
        bind_parameters(&self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_values_become_json_text() {
        let p = Parameter::encode(FieldKind::Object, &json!({ "a": [1, 2] })).unwrap();
        assert_eq!(p.value, json!(r#"{"a":[1,2]}"#));

        let p = Parameter::encode(FieldKind::Array, &json!(["x"])).unwrap();
        assert_eq!(p.value, json!(r#"["x"]"#));

        let p = Parameter::encode(FieldKind::Number, &json!(42)).unwrap();
        assert_eq!(p.value, json!(42));
    }

    #[test]
    fn test_bind_accepts_matching_kinds() {
        let params = vec![
            Parameter::string("abc"),
            Parameter::number(7),
            Parameter::encode(FieldKind::Number, &json!(1.5)).unwrap(),
            Parameter::encode(FieldKind::Boolean, &json!(true)).unwrap(),
            Parameter::encode(FieldKind::Object, &json!({})).unwrap(),
            Parameter::encode(FieldKind::String, &json!(null)).unwrap(),
        ];
        assert!(bind_parameters(&params).is_ok());
    }

    #[test]
    fn test_bind_rejects_mismatched_kind() {
        let params = vec![
            Parameter::string("ok"),
            Parameter::encode(FieldKind::Number, &json!("not a number")).unwrap(),
        ];
        match bind_parameters(&params) {
            Err(StrataError::Bind { index, kind, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(kind, FieldKind::Number);
            }
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shares_template() {
        let a = PreparedOperation::new("access", "INSERT INTO a (x) VALUES (?)", vec![]);
        let b = PreparedOperation::new("access", "INSERT INTO a (x) VALUES (?)", vec![]);
        let c = PreparedOperation::new("activity", "INSERT INTO b (x) VALUES (?)", vec![]);
        assert!(a.shares_template(&b));
        assert!(!a.shares_template(&c));
    }
}
