//! Batched, transactional insert of queued events.

use sqlx::AnyPool;

use crate::error::StrataError;
use crate::parameter::PreparedOperation;

/// Counts from one written batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Events committed.
    pub written: usize,
    /// Events dropped because their parameters could not be bound.
    pub skipped: usize,
}

/// Write `batch` in a single transaction on one pooled connection.
///
/// The statement template is taken from the first item; sqlx prepares it once and
/// reuses the prepared statement for every following item on that connection. An
/// item whose parameters cannot be bound is logged and left out. Any statement
/// failure rolls the whole batch back. The connection goes back to the pool when
/// the transaction is dropped, on every path.
pub async fn write_batch(
    pool: &AnyPool,
    batch: Vec<PreparedOperation>,
) -> Result<BatchOutcome, StrataError> {
    let Some(first) = batch.first() else {
        return Ok(BatchOutcome::default());
    };
    let topic = first.topic().to_string();
    let sql = first.sql().to_string();

    let mut tx = pool.begin().await?;
    let mut outcome = BatchOutcome::default();

    for (position, item) in batch.iter().enumerate() {
        if item.sql() != sql {
            tracing::error!(
                topic = %topic,
                item_topic = %item.topic(),
                position,
                "Audit event does not share the batch statement, skipping it"
            );
            outcome.skipped += 1;
            continue;
        }

        let args = match item.arguments() {
            Ok(args) => args,
            Err(e) => {
                tracing::error!(
                    topic = %topic,
                    position,
                    error = %e,
                    "Unable to bind audit event parameters, skipping it"
                );
                outcome.skipped += 1;
                continue;
            }
        };

        if let Err(e) = sqlx::query_with(&sql, args).execute(&mut *tx).await {
            tracing::error!(
                topic = %topic,
                batch_size = batch.len(),
                error = %e,
                "Unable to write audit events, rolling back batch"
            );
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(topic = %topic, error = %rollback, "Rollback failed");
            }
            return Err(e.into());
        }
        outcome.written += 1;
    }

    tx.commit().await?;
    Ok(outcome)
}
