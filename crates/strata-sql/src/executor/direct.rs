//! Unbuffered executor.

use async_trait::async_trait;
use sqlx::AnyPool;

use super::{decode_row, AuditEventExecutor, Row};
use crate::error::StrataError;
use crate::parameter::PreparedOperation;

/// Runs each operation on a pooled connection as soon as it is submitted.
#[derive(Debug, Clone)]
pub struct DirectExecutor {
    pool: AnyPool,
}

impl DirectExecutor {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn fetch(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError> {
        let args = operation.arguments()?;
        let rows = sqlx::query_with(operation.sql(), args)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl AuditEventExecutor for DirectExecutor {
    async fn create(&self, operation: PreparedOperation) -> Result<(), StrataError> {
        let args = operation.arguments()?;
        let result = sqlx::query_with(operation.sql(), args)
            .execute(&self.pool)
            .await?;
        tracing::trace!(
            topic = %operation.topic(),
            rows = result.rows_affected(),
            "Audit event written"
        );
        Ok(())
    }

    async fn read(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError> {
        self.fetch(operation).await
    }

    async fn query(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError> {
        self.fetch(operation).await
    }

    async fn close(&self) {}
}
