//! Executors run prepared operations against the database.
//!
//! [`DirectExecutor`] writes synchronously on the caller's task.
//! [`BufferedExecutor`](crate::buffered::BufferedExecutor) decorates it, queueing
//! creates and writing them in batches.

mod direct;
mod row;

use async_trait::async_trait;

use crate::error::StrataError;
use crate::parameter::PreparedOperation;

pub use direct::DirectExecutor;
pub use row::{decode_row, Row};

/// Runs prepared audit operations.
#[async_trait]
pub trait AuditEventExecutor: Send + Sync {
    /// Persist one event.
    async fn create(&self, operation: PreparedOperation) -> Result<(), StrataError>;

    /// Fetch the rows of a read statement.
    async fn read(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError>;

    /// Fetch the rows of a query statement.
    async fn query(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError>;

    /// Release held resources. The connection pool is owned by the caller and is
    /// not closed here.
    async fn close(&self);
}
