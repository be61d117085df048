//! # strata-sql
//!
//! Persists audit events into SQL tables.
//!
//! The pipeline, leaves first:
//!
//! - [`statement`]: dialect-aware builders turning a create, read or query on one
//!   topic into a [`PreparedOperation`] (template plus typed parameters).
//! - [`executor`]: the executor contract and the unbuffered [`DirectExecutor`].
//! - [`buffered`]: [`BufferedExecutor`], which queues creates and writes them in
//!   batched transactions on a fixed pool of background writers.
//! - [`handler`]: [`AuditEventHandler`], the boundary that resolves topics to table
//!   mappings and decodes stored rows back into events.
//!
//! Database access goes through sqlx's `Any` driver, so the same code runs against
//! PostgreSQL and SQLite.

pub mod buffered;
pub mod error;
pub mod executor;
pub mod handler;
pub mod parameter;
pub mod statement;

pub use buffered::{BatchOutcome, BatchStats, BufferedExecutor};
pub use error::StrataError;
pub use executor::{AuditEventExecutor, DirectExecutor, Row};
pub use handler::{AuditEventHandler, QueryResponse};
pub use parameter::{Parameter, PreparedOperation};
pub use statement::{Dialect, QueryFilter, QueryRequest, SortKey, StatementProvider};
