use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use telemetry::init_test_tracing;
use warehouse::clients::WarehouseError;
use warehouse::operations::{AppContext, execute_query, get_table_schema};
use warehouse::service::{QueryService, ServiceConfig};
use warehouse::test_utils::secrets::StaticCredentialProvider;
use warehouse::test_utils::warehouse::{FakeWarehouse, column, numbered_rows};

type TestContext = AppContext<StaticCredentialProvider, FakeWarehouse>;

async fn context(warehouse: &FakeWarehouse, default_max_rows: u64) -> TestContext {
    let service = QueryService::connect(
        StaticCredentialProvider::for_project("analytics"),
        warehouse.clone(),
        ServiceConfig {
            default_project: None,
            query_timeout: Duration::from_secs(300),
            row_chunk_size: 2,
        },
    )
    .await
    .unwrap();

    AppContext::new(Arc::new(service), default_max_rows)
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

#[tokio::test]
async fn schema_lookup_returns_the_columns() {
    init_test_tracing();
    let warehouse = FakeWarehouse::new().with_table(
        "analytics.sales.orders",
        vec![column("id", "INTEGER"), column("total", "NUMERIC")],
    );
    let ctx = context(&warehouse, 100).await;

    let envelope = to_json(&get_table_schema(&ctx, "sales", "orders").await);

    assert_eq!(envelope["request_id"].as_str().unwrap().len(), 32);
    assert!(envelope.get("error").is_none());
    assert_eq!(
        envelope["data"],
        json!({
            "schema": [
                {"name": "id", "type": "INTEGER", "mode": "NULLABLE", "description": null, "fields": []},
                {"name": "total", "type": "NUMERIC", "mode": "NULLABLE", "description": null, "fields": []}
            ],
            "dataset_id": "sales",
            "table_name": "orders"
        })
    );
}

#[tokio::test]
async fn missing_table_has_no_data() {
    let warehouse = FakeWarehouse::new();
    let ctx = context(&warehouse, 100).await;

    let envelope = to_json(&get_table_schema(&ctx, "sales", "missing").await);

    assert!(envelope.get("data").is_none());
    assert_eq!(
        envelope["error"],
        json!({
            "code": "TABLE_NOT_FOUND",
            "message": "Table was not found: analytics.sales.missing"
        })
    );
}

#[tokio::test]
async fn other_schema_failures_are_schema_errors() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_schema(WarehouseError::with_status(500, "Backend error"));
    let ctx = context(&warehouse, 100).await;

    let envelope = to_json(&get_table_schema(&ctx, "sales", "orders").await);

    assert_eq!(
        envelope["error"],
        json!({
            "code": "SCHEMA_ERROR",
            "message": "Unable to load schema",
            "detail": "Failed to retrieve table schema: Backend error"
        })
    );
}

#[tokio::test]
async fn successful_query_returns_result_with_sql_and_limit() {
    let warehouse = FakeWarehouse::new().with_rows(numbered_rows(3));
    let ctx = context(&warehouse, 100).await;

    let envelope =
        to_json(&execute_query(Some(&ctx), "  SELECT * FROM sales.orders; ", None).await);
    let data = &envelope["data"];

    assert_eq!(
        data.as_object().unwrap().keys().collect::<Vec<_>>(),
        [
            "job_id",
            "statement_type",
            "row_count",
            "chunks",
            "cache_hit",
            "bytes_processed",
            "slot_millis",
            "duration_ms",
            "truncated",
            "sql",
            "max_rows"
        ]
    );
    assert_eq!(data["sql"], "SELECT * FROM sales.orders");
    assert_eq!(data["max_rows"], 100);
    assert_eq!(data["row_count"], 3);
    assert_eq!(data["truncated"], false);
    assert_eq!(
        data["chunks"],
        json!([
            {"chunk_index": 0, "row_count": 2, "rows": [
                {"id": 0, "name": "row-0"},
                {"id": 1, "name": "row-1"}
            ]},
            {"chunk_index": 1, "row_count": 1, "rows": [
                {"id": 2, "name": "row-2"}
            ]}
        ])
    );
    assert_eq!(warehouse.submitted_queries(), vec!["SELECT * FROM sales.orders"]);
}

#[tokio::test]
async fn write_statements_never_reach_the_warehouse() {
    let warehouse = FakeWarehouse::new();
    let ctx = context(&warehouse, 100).await;

    let envelope = to_json(&execute_query(Some(&ctx), "DELETE FROM sales.orders", None).await);

    assert!(envelope.get("data").is_none());
    assert_eq!(
        envelope["error"],
        json!({
            "code": "INVALID_SQL",
            "message": "Only read-only queries are allowed (SELECT/WITH/EXPLAIN)."
        })
    );
    assert!(warehouse.submitted_queries().is_empty());
}

#[tokio::test]
async fn non_positive_max_rows_is_rejected() {
    let warehouse = FakeWarehouse::new();
    let ctx = context(&warehouse, 100).await;

    for max_rows in [0, -1] {
        let envelope = to_json(&execute_query(Some(&ctx), "SELECT 1", Some(max_rows)).await);

        assert_eq!(envelope["error"]["code"], "INVALID_SQL");
        assert_eq!(
            envelope["error"]["message"],
            "max_rows must be greater than zero"
        );
    }
    assert!(warehouse.submitted_queries().is_empty());
}

#[tokio::test]
async fn max_rows_above_the_server_limit_is_clamped() {
    let warehouse = FakeWarehouse::new().with_rows(numbered_rows(10));
    let ctx = context(&warehouse, 5).await;

    let envelope = to_json(&execute_query(Some(&ctx), "SELECT 1", Some(50)).await);
    let data = &envelope["data"];

    assert_eq!(data["max_rows"], 5);
    assert_eq!(data["row_count"], 5);
    assert_eq!(data["truncated"], true);
}

#[tokio::test]
async fn query_failures_are_reported_with_detail() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_submit(WarehouseError::with_status(
        400,
        "Unrecognized name: totl at [1:8]",
    ));
    let ctx = context(&warehouse, 100).await;

    let envelope =
        to_json(&execute_query(Some(&ctx), "SELECT totl FROM sales.orders", None).await);

    assert_eq!(
        envelope["error"],
        json!({
            "code": "QUERY_FAILURE",
            "message": "BigQuery query failed",
            "detail": "Failed to execute query: Unrecognized name: totl at [1:8]"
        })
    );
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_initialization() {
    let ctx: Option<&TestContext> = None;

    let envelope = to_json(&execute_query(ctx, "DROP TABLE sales.orders", None).await);
    assert_eq!(envelope["error"]["code"], "INVALID_SQL");

    let envelope = to_json(&execute_query(ctx, "SELECT 1", Some(0)).await);
    assert_eq!(envelope["error"]["code"], "INVALID_SQL");

    let envelope = to_json(&execute_query(ctx, "SELECT 1", None).await);
    assert_eq!(
        envelope["error"],
        json!({
            "code": "QUERY_FAILURE",
            "message": "BigQuery query failed",
            "detail": "service has not been initialized"
        })
    );
}

#[tokio::test]
async fn every_invocation_gets_a_fresh_request_id() {
    let warehouse = FakeWarehouse::new();
    let ctx = context(&warehouse, 100).await;

    let first = execute_query(Some(&ctx), "SELECT 1", None).await;
    let second = execute_query(Some(&ctx), "SELECT 1", None).await;

    assert_ne!(first.request_id(), second.request_id());
}
