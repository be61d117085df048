//! Shared fixtures for the strata-sql integration tests.
//!
//! Every test gets its own in-memory SQLite database. The pool holds a single
//! connection that never expires, so all statements see the same database.

#![allow(dead_code)]

use serde_json::{Value, json};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::time::Duration;
use strata_core::{BufferingConfig, EventTopics, FieldKind, HandlerConfig, TableMapping};
use strata_sql::{Parameter, PreparedOperation};

// =============================================================================
// DATABASE
// =============================================================================

pub async fn memory_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite pool");

    for ddl in [
        "CREATE TABLE auditaccess (
            objectid TEXT PRIMARY KEY,
            eventname TEXT,
            userid TEXT,
            seq INTEGER,
            status TEXT,
            elapsed INTEGER,
            secure INTEGER,
            roles TEXT,
            detail TEXT
        )",
        "CREATE TABLE auditactivity (
            objectid TEXT PRIMARY KEY,
            eventname TEXT,
            userid TEXT,
            seq INTEGER,
            operation TEXT
        )",
    ] {
        sqlx::query(ddl).execute(&pool).await.expect("create table");
    }
    pool
}

pub async fn count(pool: &AnyPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

/// `seq` values of `table` in insertion order.
pub async fn sequence(pool: &AnyPool, table: &str) -> Vec<i64> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT seq FROM {} ORDER BY rowid", table))
        .fetch_all(pool)
        .await
        .expect("select seq")
}

/// Ids stored in `table`, sorted.
pub async fn ids(pool: &AnyPool, table: &str) -> Vec<String> {
    sqlx::query_scalar::<_, String>(&format!("SELECT objectid FROM {} ORDER BY objectid", table))
        .fetch_all(pool)
        .await
        .expect("select ids")
}

/// Poll until `table` holds `expected` rows or `deadline` passes.
pub async fn wait_for_rows(pool: &AnyPool, table: &str, expected: i64, deadline: Duration) -> i64 {
    let started = tokio::time::Instant::now();
    loop {
        let rows = count(pool, table).await;
        if rows >= expected || started.elapsed() >= deadline {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Insert into `auditaccess` carrying an id and a sequence number.
pub fn access_insert(id: &str, seq: i64) -> PreparedOperation {
    PreparedOperation::new(
        "access",
        "INSERT INTO auditaccess (objectid, seq) VALUES (?, ?)",
        vec![Parameter::string(id), Parameter::number(seq)],
    )
}

/// Insert into `auditactivity`.
pub fn activity_insert(id: &str, seq: i64) -> PreparedOperation {
    PreparedOperation::new(
        "activity",
        "INSERT INTO auditactivity (objectid, seq) VALUES (?, ?)",
        vec![Parameter::string(id), Parameter::number(seq)],
    )
}

/// Same template as [`access_insert`], but the sequence number cannot be bound.
pub fn unbindable_access_insert(id: &str) -> PreparedOperation {
    PreparedOperation::new(
        "access",
        "INSERT INTO auditaccess (objectid, seq) VALUES (?, ?)",
        vec![
            Parameter::string(id),
            Parameter {
                kind: FieldKind::Number,
                value: json!("not a number"),
            },
        ],
    )
}

// =============================================================================
// HANDLER CONFIGURATION
// =============================================================================

pub fn buffering(max_size: usize, max_batched_events: usize, write_interval: Duration) -> BufferingConfig {
    BufferingConfig {
        enabled: true,
        max_size,
        write_interval,
        writer_threads: 1,
        max_batched_events,
        auto_flush: true,
        shutdown_timeout: Duration::from_secs(5),
    }
}

pub fn handler_config(buffering: BufferingConfig) -> HandlerConfig {
    HandlerConfig {
        name: "test".to_string(),
        buffering,
        table_mappings: vec![
            TableMapping::new("access", "auditaccess")
                .with_field("_id", "objectid")
                .with_field("eventName", "eventname")
                .with_field("userId", "userid")
                .with_field("seq", "seq")
                .with_field("/response/status", "status")
                .with_field("/response/elapsedTime", "elapsed")
                .with_field("/http/request/secure", "secure")
                .with_field("roles", "roles")
                .with_field("detail", "detail"),
            TableMapping::new("activity", "auditactivity")
                .with_field("_id", "objectid")
                .with_field("eventName", "eventname")
                .with_field("userId", "userid")
                .with_field("seq", "seq")
                .with_field("operation", "operation"),
        ],
        ..HandlerConfig::default()
    }
}

pub fn topics() -> EventTopics {
    EventTopics::new()
        .with_schema("access", access_schema())
        .with_schema("activity", json!({
            "properties": {
                "_id": {"type": "string"},
                "eventName": {"type": "string"},
                "userId": {"type": "string"},
                "seq": {"type": "integer"},
                "operation": {"type": "string"}
            }
        }))
}

fn access_schema() -> Value {
    json!({
        "properties": {
            "_id": {"type": "string"},
            "eventName": {"type": "string"},
            "userId": {"type": "string"},
            "seq": {"type": "integer"},
            "response": {"properties": {
                "status": {"type": "string"},
                "elapsedTime": {"type": "integer"}
            }},
            "http": {"properties": {"request": {"properties": {
                "secure": {"type": "boolean"}
            }}}},
            "roles": {"type": "array", "items": {"type": "string"}},
            "detail": {"type": "object"}
        }
    })
}
