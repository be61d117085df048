//! Query requests: filter tree, sort keys and paging.

use serde_json::Value;
use strata_core::{EventSchema, FieldKind, FieldPath, TableMapping};

use super::StatementWriter;
use crate::error::StrataError;
use crate::parameter::Parameter;

const LIKE_ESCAPE: char = '!';

/// A filter over event fields. Fields are event paths, resolved to columns through
/// the topic's table mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    True,
    False,
    Equals(String, Value),
    GreaterThan(String, Value),
    GreaterThanOrEqual(String, Value),
    LessThan(String, Value),
    LessThanOrEqual(String, Value),
    StartsWith(String, String),
    Contains(String, String),
    Present(String),
    And(Vec<QueryFilter>),
    Or(Vec<QueryFilter>),
    Not(Box<QueryFilter>),
}

impl QueryFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(field.into(), value.into())
    }

    pub fn and(filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: QueryFilter) -> Self {
        Self::Not(Box::new(filter))
    }
}

/// Sort order on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    /// Parse `+field`, `-field` or `field` (ascending).
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                ascending: false,
            },
            None => Self {
                field: key.strip_prefix('+').unwrap_or(key).to_string(),
                ascending: true,
            },
        }
    }
}

/// A query over one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub filter: QueryFilter,
    pub sort_keys: Vec<SortKey>,
    /// Maximum rows to return; no paging clause is emitted when `None`.
    pub page_size: Option<u32>,
    /// Rows to skip; only honoured together with `page_size`.
    pub paged_results_offset: u32,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            filter: QueryFilter::True,
            sort_keys: Vec::new(),
            page_size: None,
            paged_results_offset: 0,
        }
    }
}

impl QueryRequest {
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sort_by(mut self, key: &str) -> Self {
        self.sort_keys.push(SortKey::parse(key));
        self
    }

    pub fn page(mut self, page_size: u32, offset: u32) -> Self {
        self.page_size = Some(page_size);
        self.paged_results_offset = offset;
        self
    }
}

/// What a filter is compiled against.
pub(crate) struct FilterContext<'a> {
    pub mapping: &'a TableMapping,
    pub schema: &'a EventSchema,
}

impl FilterContext<'_> {
    /// Column for `field`, compared by parsed path so `/a/b` and `a.b` agree.
    pub fn column(&self, field: &str) -> Result<&str, StrataError> {
        let wanted = FieldPath::parse(field);
        self.mapping
            .fields()
            .find(|(f, _)| FieldPath::parse(f) == wanted)
            .map(|(_, c)| c)
            .ok_or_else(|| StrataError::UnmappedField {
                topic: self.mapping.event.clone(),
                field: field.to_string(),
            })
    }

    fn parameter(&self, field: &str, value: &Value) -> Result<Parameter, StrataError> {
        let kind = self
            .schema
            .field_kind(&FieldPath::parse(field))?
            .unwrap_or_else(|| FieldKind::of_value(value));
        Parameter::encode(kind, value)
    }
}

pub(crate) fn compile(
    filter: &QueryFilter,
    ctx: &FilterContext<'_>,
    w: &mut StatementWriter,
) -> Result<String, StrataError> {
    let comparison = |w: &mut StatementWriter, field: &str, op: &str, value: &Value| {
        let column = w.identifier(ctx.column(field)?)?;
        let marker = w.bind(ctx.parameter(field, value)?);
        Ok::<_, StrataError>(format!("{} {} {}", column, op, marker))
    };

    let sql = match filter {
        QueryFilter::True => "1 = 1".to_string(),
        QueryFilter::False => "1 = 0".to_string(),
        QueryFilter::Equals(field, value) => comparison(w, field, "=", value)?,
        QueryFilter::GreaterThan(field, value) => comparison(w, field, ">", value)?,
        QueryFilter::GreaterThanOrEqual(field, value) => comparison(w, field, ">=", value)?,
        QueryFilter::LessThan(field, value) => comparison(w, field, "<", value)?,
        QueryFilter::LessThanOrEqual(field, value) => comparison(w, field, "<=", value)?,
        QueryFilter::StartsWith(field, prefix) => {
            let column = w.identifier(ctx.column(field)?)?;
            let marker = w.bind(Parameter::string(format!("{}%", escape_like(prefix))));
            format!("{} LIKE {} ESCAPE '{}'", column, marker, LIKE_ESCAPE)
        }
        QueryFilter::Contains(field, needle) => {
            let column = w.identifier(ctx.column(field)?)?;
            let marker = w.bind(Parameter::string(format!("%{}%", escape_like(needle))));
            format!("{} LIKE {} ESCAPE '{}'", column, marker, LIKE_ESCAPE)
        }
        QueryFilter::Present(field) => {
            format!("{} IS NOT NULL", w.identifier(ctx.column(field)?)?)
        }
        QueryFilter::And(parts) if parts.is_empty() => "1 = 1".to_string(),
        QueryFilter::Or(parts) if parts.is_empty() => "1 = 0".to_string(),
        QueryFilter::And(parts) => join(parts, " AND ", ctx, w)?,
        QueryFilter::Or(parts) => join(parts, " OR ", ctx, w)?,
        QueryFilter::Not(inner) => format!("NOT ({})", compile(inner, ctx, w)?),
    };
    Ok(sql)
}

fn join(
    parts: &[QueryFilter],
    separator: &str,
    ctx: &FilterContext<'_>,
    w: &mut StatementWriter,
) -> Result<String, StrataError> {
    let compiled = parts
        .iter()
        .map(|p| compile(p, ctx, w).map(|sql| format!("({})", sql)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(compiled.join(separator))
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("-timestamp"),
            SortKey {
                field: "timestamp".to_string(),
                ascending: false
            }
        );
        assert!(SortKey::parse("+a").ascending);
        assert_eq!(SortKey::parse("a").field, "a");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
    }
}
