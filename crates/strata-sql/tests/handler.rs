//! Audit event handler tests: publish, read and query round trips.
//!
//! Run with:
//!   cargo test -p strata-sql --test handler

mod common;

use common::*;
use serde_json::{Value, json};
use std::time::Duration;
use strata_core::BufferingConfig;
use strata_sql::{AuditEventHandler, QueryFilter, QueryRequest, StrataError};

fn access_event(id: &str, user: &str, seq: i64) -> Value {
    json!({
        "_id": id,
        "eventName": "AM-ACCESS-OUTCOME",
        "userId": user,
        "seq": seq,
        "response": {"status": "SUCCESSFUL", "elapsedTime": 12 + seq},
        "http": {"request": {"secure": seq % 2 == 0}},
        "roles": ["openidm-authorized", "openidm-admin"],
        "detail": {"path": "/managed/user", "method": "GET"}
    })
}

async fn direct_handler() -> (AuditEventHandler, sqlx::AnyPool) {
    let pool = memory_pool().await;
    let handler = AuditEventHandler::new(
        handler_config(BufferingConfig::default()),
        topics(),
        pool.clone(),
    )
    .expect("handler");
    (handler, pool)
}

// =============================================================================
// PUBLISH / READ
// =============================================================================

#[tokio::test]
async fn test_publish_then_read_round_trips_types() {
    let (handler, _pool) = direct_handler().await;
    let event = access_event("evt-1", "bjensen", 4);

    let stored = handler.publish("access", event.clone()).await.unwrap();
    assert_eq!(stored, event);

    let read = handler.read("access", "evt-1").await.unwrap();
    assert_eq!(read, event);
    assert!(read["roles"].is_array());
    assert!(read["detail"].is_object());
    assert_eq!(read["http"]["request"]["secure"], json!(true));
}

#[tokio::test]
async fn test_publish_assigns_missing_id() {
    let (handler, _pool) = direct_handler().await;

    let stored = handler
        .publish("access", json!({"eventName": "AM-LOGIN", "userId": "bjensen"}))
        .await
        .unwrap();
    let id = stored["_id"].as_str().expect("generated id");
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let read = handler.read("access", id).await.unwrap();
    assert_eq!(read["userId"], "bjensen");
}

#[tokio::test]
async fn test_topic_lookup_ignores_case() {
    let (handler, pool) = direct_handler().await;

    handler
        .publish("Access", access_event("evt-1", "bjensen", 1))
        .await
        .unwrap();
    assert_eq!(count(&pool, "auditaccess").await, 1);
    assert!(handler.read("ACCESS", "evt-1").await.is_ok());
}

#[tokio::test]
async fn test_read_unknown_id_is_not_found() {
    let (handler, _pool) = direct_handler().await;

    let err = handler.read("access", "missing").await.unwrap_err();
    assert!(matches!(err, StrataError::NotFound { ref id, .. } if id == "missing"));
}

#[tokio::test]
async fn test_unmapped_topic_is_a_configuration_error() {
    let (handler, _pool) = direct_handler().await;

    let err = handler
        .publish("config", json!({"_id": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::NoTableMapping { ref topic } if topic == "config"));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_unknown_schema_type_is_a_configuration_error() {
    let pool = memory_pool().await;
    let topics = strata_core::EventTopics::new().with_schema(
        "activity",
        json!({"properties": {"operation": {"type": "tuple"}}}),
    );
    let handler = AuditEventHandler::new(handler_config(BufferingConfig::default()), topics, pool)
        .unwrap();

    let err = handler
        .publish("activity", json!({"_id": "v1", "operation": "PATCH"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Schema(_)));
}

#[tokio::test]
async fn test_disabled_handler_rejects_operations() {
    let pool = memory_pool().await;
    let config = strata_core::HandlerConfig {
        enabled: false,
        ..handler_config(BufferingConfig::default())
    };
    let handler = AuditEventHandler::new(config, topics(), pool).unwrap();

    assert!(!handler.is_enabled());
    let err = handler
        .publish("access", access_event("evt-1", "bjensen", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Disabled(_)));
}

// =============================================================================
// QUERY
// =============================================================================

#[tokio::test]
async fn test_query_filters_sorts_and_pages() {
    let (handler, _pool) = direct_handler().await;
    for seq in 0..6 {
        let user = if seq % 2 == 0 { "bjensen" } else { "scarter" };
        handler
            .publish("access", access_event(&format!("evt-{}", seq), user, seq))
            .await
            .unwrap();
    }

    let request = QueryRequest::new(QueryFilter::equals("/userId", "bjensen"))
        .sort_by("-seq")
        .page(2, 0);
    let mut seen = Vec::new();
    let response = handler
        .query("access", &request, |event| seen.push(event["seq"].clone()))
        .await
        .unwrap();

    assert_eq!(seen, [json!(4), json!(2)]);
    assert_eq!(response.total_paged_results, 2);
    assert_eq!(response.paged_results_cookie.as_deref(), Some("2"));

    let next = request.clone().page(2, 2);
    let mut rest = Vec::new();
    handler
        .query("access", &next, |event| rest.push(event["seq"].clone()))
        .await
        .unwrap();
    assert_eq!(rest, [json!(0)]);
}

#[tokio::test]
async fn test_unpaged_query_still_returns_a_cookie() {
    let (handler, _pool) = direct_handler().await;
    for seq in 0..3 {
        handler
            .publish("access", access_event(&format!("evt-{}", seq), "bjensen", seq))
            .await
            .unwrap();
    }

    let mut seen = 0;
    let response = handler
        .query("access", &QueryRequest::default(), |_| seen += 1)
        .await
        .unwrap();

    assert_eq!(seen, 3);
    assert_eq!(response.total_paged_results, 3);
    assert_eq!(response.paged_results_cookie.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_query_on_unmapped_field_fails() {
    let (handler, _pool) = direct_handler().await;

    let request = QueryRequest::new(QueryFilter::equals("/transactionId", "t-1"));
    let err = handler
        .query("access", &request, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::UnmappedField { .. }));
}

// =============================================================================
// BUFFERED HANDLER
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_buffered_handler_flushes_on_shutdown() {
    let pool = memory_pool().await;
    let config = handler_config(buffering(50, 4, Duration::from_secs(60)));
    let handler = AuditEventHandler::new(config, topics(), pool.clone()).unwrap();

    for seq in 0..5 {
        handler
            .publish("access", access_event(&format!("a{}", seq), "bjensen", seq))
            .await
            .unwrap();
        handler
            .publish(
                "activity",
                json!({"_id": format!("v{}", seq), "userId": "bjensen", "seq": seq, "operation": "PATCH"}),
            )
            .await
            .unwrap();
    }
    assert_eq!(count(&pool, "auditaccess").await, 0);

    handler.shutdown().await;

    assert_eq!(sequence(&pool, "auditaccess").await, [0, 1, 2, 3, 4]);
    assert_eq!(sequence(&pool, "auditactivity").await, [0, 1, 2, 3, 4]);
}
