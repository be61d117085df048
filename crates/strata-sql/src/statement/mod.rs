//! Statement building.
//!
//! A [`StatementProvider`] turns a logical operation on one audit topic into a
//! [`PreparedOperation`]: a statement template plus its ordered parameters. Field
//! types come from the topic schema; object and array fields are stored as JSON text.
//!
//! [`Dialect`] is the closed set of providers, chosen once from the configured
//! database type.

pub mod dialect;
pub mod filter;

use serde_json::Value;
use strata_core::{EventSchema, FieldKind, FieldPath, TableMapping};

use crate::error::StrataError;
use crate::parameter::{Parameter, PreparedOperation};

pub use dialect::Dialect;
pub use filter::{QueryFilter, QueryRequest, SortKey};

/// Builds create, read and query statements for a topic.
pub trait StatementProvider: Send + Sync {
    /// Insert statement for `event`, covering every mapped field present in it.
    fn build_create(
        &self,
        event: &Value,
        mapping: &TableMapping,
        schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError>;

    /// Select statement fetching the event with content identifier `id`.
    fn build_read(
        &self,
        mapping: &TableMapping,
        id: &str,
        schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError>;

    /// Filtered, sorted, paged select.
    fn build_query(
        &self,
        mapping: &TableMapping,
        request: &QueryRequest,
        schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError>;
}

/// Declared kind of `field`, falling back to the value's own shape when the schema
/// does not describe it.
pub fn field_kind(
    schema: &EventSchema,
    path: &FieldPath,
    value: &Value,
) -> Result<FieldKind, StrataError> {
    Ok(schema
        .field_kind(path)?
        .unwrap_or_else(|| FieldKind::of_value(value)))
}

/// Accumulates parameters and hands out the dialect's markers for them.
pub(crate) struct StatementWriter {
    dialect: Dialect,
    parameters: Vec<Parameter>,
}

impl StatementWriter {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parameters: Vec::new(),
        }
    }

    /// Record `parameter` and return its marker.
    pub(crate) fn bind(&mut self, parameter: Parameter) -> String {
        self.parameters.push(parameter);
        self.dialect.placeholder(self.parameters.len())
    }

    pub(crate) fn identifier(&self, ident: &str) -> Result<String, StrataError> {
        self.dialect.quote_identifier(ident)
    }

    fn finish(self, topic: &str, sql: String) -> PreparedOperation {
        PreparedOperation::new(topic, sql, self.parameters)
    }
}

impl StatementProvider for Dialect {
    fn build_create(
        &self,
        event: &Value,
        mapping: &TableMapping,
        schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError> {
        let mut w = StatementWriter::new(*self);
        let mut columns = Vec::new();
        let mut markers = Vec::new();

        for (field, column) in mapping.fields() {
            let path = FieldPath::parse(field);
            let Some(value) = path.get(event).filter(|v| !v.is_null()) else {
                continue;
            };
            let kind = field_kind(schema, &path, value)?;
            columns.push(w.identifier(column)?);
            markers.push(w.bind(Parameter::encode(kind, value)?));
        }

        if columns.is_empty() {
            return Err(StrataError::NoMappedFields {
                topic: mapping.event.clone(),
            });
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            w.identifier(&mapping.table)?,
            columns.join(", "),
            markers.join(", ")
        );
        Ok(w.finish(&mapping.event, sql))
    }

    fn build_read(
        &self,
        mapping: &TableMapping,
        id: &str,
        _schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError> {
        let id_column = mapping.id_column().ok_or_else(|| StrataError::MissingIdMapping {
            topic: mapping.event.clone(),
        })?;

        let mut w = StatementWriter::new(*self);
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            w.identifier(&mapping.table)?,
            w.identifier(id_column)?,
            w.bind(Parameter::string(id))
        );
        Ok(w.finish(&mapping.event, sql))
    }

    fn build_query(
        &self,
        mapping: &TableMapping,
        request: &QueryRequest,
        schema: &EventSchema,
    ) -> Result<PreparedOperation, StrataError> {
        let mut w = StatementWriter::new(*self);
        let ctx = filter::FilterContext { mapping, schema };

        let mut sql = format!("SELECT * FROM {}", w.identifier(&mapping.table)?);

        if request.filter != QueryFilter::True {
            let condition = filter::compile(&request.filter, &ctx, &mut w)?;
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }

        if !request.sort_keys.is_empty() {
            let order = request
                .sort_keys
                .iter()
                .map(|key| {
                    let column = w.identifier(ctx.column(&key.field)?)?;
                    let direction = if key.ascending { "ASC" } else { "DESC" };
                    Ok(format!("{} {}", column, direction))
                })
                .collect::<Result<Vec<_>, StrataError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(page_size) = request.page_size {
            let offset = request.paged_results_offset;
            let (limit, offset) = match (offset, self.offset_first()) {
                (0, _) => (w.bind(Parameter::number(page_size.into())), None),
                (offset, true) => {
                    let offset = w.bind(Parameter::number(offset.into()));
                    (w.bind(Parameter::number(page_size.into())), Some(offset))
                }
                (offset, false) => {
                    let limit = w.bind(Parameter::number(page_size.into()));
                    (limit, Some(w.bind(Parameter::number(offset.into()))))
                }
            };
            sql.push(' ');
            sql.push_str(&self.pagination(&limit, offset.as_deref()));
        }

        Ok(w.finish(&mapping.event, sql))
    }
}
