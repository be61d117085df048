//! Audit event handler.
//!
//! The boundary of the pipeline: resolves a topic to its table mapping and schema,
//! asks the statement provider for a prepared operation and hands it to the
//! configured executor. Rows coming back from reads and queries are decoded into
//! events using the same field kinds that were used to store them.

use serde_json::{Map, Value};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::sync::Arc;
use strata_core::{
    ConnectionPoolConfig, EventSchema, EventTopics, FieldKind, FieldPath, HandlerConfig,
    TableMapping, CONTENT_ID_FIELD,
};

use crate::buffered::BufferedExecutor;
use crate::error::StrataError;
use crate::executor::{AuditEventExecutor, DirectExecutor, Row};
use crate::statement::{field_kind, Dialect, QueryRequest, StatementProvider};

/// Summary returned by [`AuditEventHandler::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    /// Offset to pass as `paged_results_offset` to fetch the following page. Set on
    /// every query, paged or not.
    pub paged_results_cookie: Option<String>,
    /// Number of events returned by this query.
    pub total_paged_results: usize,
}

/// Publishes, reads and queries audit events stored in SQL tables.
pub struct AuditEventHandler {
    config: HandlerConfig,
    topics: EventTopics,
    empty_schema: EventSchema,
    statements: Arc<dyn StatementProvider>,
    executor: Arc<dyn AuditEventExecutor>,
    pool: AnyPool,
    owns_pool: bool,
}

impl AuditEventHandler {
    /// Build a handler on a pool owned by the caller. Shutting the handler down
    /// leaves the pool open.
    ///
    /// When buffering is enabled this spawns background tasks and must be called
    /// from within a Tokio runtime.
    pub fn new(
        config: HandlerConfig,
        topics: EventTopics,
        pool: AnyPool,
    ) -> Result<Self, StrataError> {
        Self::build(config, topics, pool, false)
    }

    /// Open a pool from `pool_config` and build a handler owning it.
    pub async fn connect(
        config: HandlerConfig,
        pool_config: &ConnectionPoolConfig,
        topics: EventTopics,
    ) -> Result<Self, StrataError> {
        sqlx::any::install_default_drivers();

        let url = pool_config.connection_url()?;
        let pool = AnyPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .min_connections(pool_config.min_connections)
            .acquire_timeout(pool_config.connect_timeout)
            .idle_timeout(Some(pool_config.idle_timeout))
            .max_lifetime(Some(pool_config.max_lifetime))
            .connect(&url)
            .await?;

        tracing::info!(
            handler = %config.name,
            max_connections = pool_config.max_connections,
            "Connected audit event handler"
        );

        Self::build(config, topics, pool, true)
    }

    fn build(
        config: HandlerConfig,
        topics: EventTopics,
        pool: AnyPool,
        owns_pool: bool,
    ) -> Result<Self, StrataError> {
        for mapping in &config.table_mappings {
            mapping.validate()?;
        }

        let statements: Arc<dyn StatementProvider> =
            Arc::new(Dialect::from_tag(&config.database_type));

        let direct: Arc<dyn AuditEventExecutor> = Arc::new(DirectExecutor::new(pool.clone()));
        let executor: Arc<dyn AuditEventExecutor> = if config.buffering.enabled {
            Arc::new(BufferedExecutor::new(
                &config.buffering,
                direct,
                pool.clone(),
            )?)
        } else {
            direct
        };

        Ok(Self {
            config,
            topics,
            empty_schema: EventSchema::empty(),
            statements,
            executor,
            pool,
            owns_pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Store `event` under `topic`, assigning a content identifier when it has none.
    ///
    /// With buffering enabled this returns once the event is queued; write failures
    /// after that point are logged, not reported.
    pub async fn publish(&self, topic: &str, mut event: Value) -> Result<Value, StrataError> {
        let (mapping, schema) = self.resolve(topic)?;

        if let Some(fields) = event.as_object_mut()
            && fields.get(CONTENT_ID_FIELD).is_none_or(Value::is_null)
        {
            fields.insert(
                CONTENT_ID_FIELD.to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let operation = self.statements.build_create(&event, mapping, schema)?;
        if let Err(e) = self.executor.create(operation).await {
            tracing::error!(topic = %topic, error = %e, "Unable to create audit entry");
            return Err(e);
        }
        Ok(event)
    }

    /// Fetch the event of `topic` with content identifier `id`.
    pub async fn read(&self, topic: &str, id: &str) -> Result<Value, StrataError> {
        let (mapping, schema) = self.resolve(topic)?;

        let operation = self.statements.build_read(mapping, id, schema)?;
        let rows = self.executor.read(operation).await.inspect_err(|e| {
            tracing::error!(topic = %topic, id = %id, error = %e, "Unable to read audit entry");
        })?;

        match rows.first() {
            Some(row) => decode_event(row, mapping, schema),
            None => Err(StrataError::NotFound {
                topic: topic.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Run `request` against `topic`, passing each matching event to `on_event` in
    /// result order.
    pub async fn query<F>(
        &self,
        topic: &str,
        request: &QueryRequest,
        mut on_event: F,
    ) -> Result<QueryResponse, StrataError>
    where
        F: FnMut(Value),
    {
        let (mapping, schema) = self.resolve(topic)?;

        let operation = self.statements.build_query(mapping, request, schema)?;
        let rows = self.executor.query(operation).await.inspect_err(|e| {
            tracing::error!(topic = %topic, error = %e, "Unable to query audit entries");
        })?;

        for row in &rows {
            on_event(decode_event(row, mapping, schema)?);
        }

        Ok(QueryResponse {
            paged_results_cookie: Some(
                (request.paged_results_offset as usize + rows.len()).to_string(),
            ),
            total_paged_results: rows.len(),
        })
    }

    /// Close the executor, flushing or discarding buffered events as configured,
    /// then close the pool if this handler opened it.
    pub async fn shutdown(&self) {
        self.executor.close().await;
        if self.owns_pool {
            self.pool.close().await;
        }
        tracing::info!(handler = %self.config.name, "Audit event handler shut down");
    }

    fn resolve(&self, topic: &str) -> Result<(&TableMapping, &EventSchema), StrataError> {
        if !self.config.enabled {
            return Err(StrataError::Disabled(self.config.name.clone()));
        }

        let mapping = self.config.table_mapping(topic).ok_or_else(|| {
            tracing::error!(topic = %topic, "No table mapping found for audit event type");
            StrataError::NoTableMapping {
                topic: topic.to_string(),
            }
        })?;
        let schema = self.topics.schema(topic).unwrap_or(&self.empty_schema);
        Ok((mapping, schema))
    }
}

/// Rebuild an event from a result row, following the mapping's field order.
fn decode_event(
    row: &Row,
    mapping: &TableMapping,
    schema: &EventSchema,
) -> Result<Value, StrataError> {
    let mut event = Value::Object(Map::new());
    for (field, column) in mapping.fields() {
        let Some(stored) = row.get(&column.to_lowercase()).filter(|v| !v.is_null()) else {
            continue;
        };
        let path = FieldPath::parse(field);
        let kind = field_kind(schema, &path, stored)?;
        path.put(&mut event, restore(kind, stored)?);
    }
    Ok(event)
}

/// Convert a stored column value back to the field's kind.
fn restore(kind: FieldKind, stored: &Value) -> Result<Value, StrataError> {
    let mismatch = || StrataError::Decode(format!("cannot read {} as {}", stored, kind));

    match (kind, stored) {
        (FieldKind::Object | FieldKind::Array, Value::String(text)) => {
            serde_json::from_str(text).map_err(|e| StrataError::Decode(e.to_string()))
        }
        (FieldKind::Number, Value::String(text)) => {
            if let Ok(n) = text.parse::<i64>() {
                Ok(Value::from(n))
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(mismatch)
            }
        }
        (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(mismatch()),
        },
        (FieldKind::Boolean, Value::String(text)) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        (FieldKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        _ => Ok(stored.clone()),
    }
}
