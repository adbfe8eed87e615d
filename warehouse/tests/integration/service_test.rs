use std::time::Duration;

use telemetry::init_test_tracing;
use warehouse::clients::WarehouseError;
use warehouse::error::ErrorKind;
use warehouse::service::{QueryService, ServiceConfig};
use warehouse::test_utils::secrets::{StaticCredentialProvider, service_account_json};
use warehouse::test_utils::warehouse::{FakeWarehouse, column, numbered_rows};

type TestService = QueryService<StaticCredentialProvider, FakeWarehouse>;

fn service_config(row_chunk_size: usize) -> ServiceConfig {
    ServiceConfig {
        default_project: None,
        query_timeout: Duration::from_secs(300),
        row_chunk_size,
    }
}

async fn connected_service(warehouse: &FakeWarehouse, row_chunk_size: usize) -> TestService {
    QueryService::connect(
        StaticCredentialProvider::for_project("analytics"),
        warehouse.clone(),
        service_config(row_chunk_size),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn connect_uses_the_project_of_the_credentials() {
    init_test_tracing();
    let warehouse = FakeWarehouse::new();

    let service = connected_service(&warehouse, 500).await;

    assert!(service.is_initialized().await);
    assert_eq!(service.project_id().await.as_deref(), Some("analytics"));
    assert_eq!(warehouse.connected_projects(), vec!["analytics"]);
}

#[tokio::test]
async fn configured_project_takes_precedence() {
    let warehouse = FakeWarehouse::new();
    let config = ServiceConfig {
        default_project: Some("billing".to_owned()),
        ..service_config(500)
    };

    QueryService::connect(
        StaticCredentialProvider::for_project("analytics"),
        warehouse.clone(),
        config,
    )
    .await
    .unwrap();

    assert_eq!(warehouse.connected_projects(), vec!["billing"]);
}

#[tokio::test]
async fn missing_project_is_a_configuration_error() {
    let warehouse = FakeWarehouse::new();

    let err = QueryService::connect(
        StaticCredentialProvider::new(service_account_json(None)),
        warehouse.clone(),
        service_config(500),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(warehouse.connects(), 0);
}

#[tokio::test]
async fn credential_failures_are_refresh_errors() {
    let warehouse = FakeWarehouse::new();

    let err = QueryService::connect(
        StaticCredentialProvider::failing(),
        warehouse.clone(),
        service_config(500),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.kind(), ErrorKind::CredentialRefresh);
    assert_eq!(err.description(), "Unable to load credentials from secret");
    assert_eq!(warehouse.connects(), 0);
}

#[tokio::test]
async fn client_build_failures_are_refresh_errors() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_connect(WarehouseError::new("invalid service account key"));

    let service = QueryService::new(
        StaticCredentialProvider::for_project("analytics"),
        warehouse.clone(),
        service_config(500),
    );
    let err = service.refresh().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRefresh);
    assert_eq!(
        err.to_string(),
        "Unable to create BigQuery client: invalid service account key"
    );
    assert!(!service.is_initialized().await);
}

#[tokio::test]
async fn refresh_replaces_and_closes_the_previous_handle() {
    let warehouse = FakeWarehouse::new();
    let service = connected_service(&warehouse, 500).await;

    service.refresh().await.unwrap();

    assert_eq!(warehouse.connects(), 2);
    assert_eq!(warehouse.closes(), 1);
    assert!(service.is_initialized().await);
}

#[tokio::test]
async fn close_is_idempotent() {
    let warehouse = FakeWarehouse::new();
    let service = connected_service(&warehouse, 500).await;

    service.close().await;
    service.close().await;

    assert_eq!(warehouse.closes(), 1);
    assert!(!service.is_initialized().await);
    assert_eq!(service.project_id().await, None);

    let err = service.execute_query("SELECT 1", 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryExecution);
    assert_eq!(err.to_string(), "BigQuery client is not initialized");
}

#[tokio::test]
async fn bare_dataset_is_qualified_with_the_client_project() {
    let schema = vec![column("id", "INTEGER"), column("name", "STRING")];
    let warehouse = FakeWarehouse::new().with_table("analytics.sales.orders", schema.clone());
    let service = connected_service(&warehouse, 500).await;

    assert_eq!(
        service.get_table_schema("sales", "orders").await.unwrap(),
        schema
    );
    assert_eq!(
        service.get_table_schema("`sales`", "orders").await.unwrap(),
        schema
    );
}

#[tokio::test]
async fn qualified_dataset_is_used_verbatim() {
    let schema = vec![column("event", "STRING")];
    let warehouse = FakeWarehouse::new().with_table("shared.public.events", schema.clone());
    let service = connected_service(&warehouse, 500).await;

    assert_eq!(
        service
            .get_table_schema("shared.public", "events")
            .await
            .unwrap(),
        schema
    );
}

#[tokio::test]
async fn missing_table_is_reported_as_not_found() {
    let warehouse = FakeWarehouse::new();
    let service = connected_service(&warehouse, 500).await;

    let err = service
        .get_table_schema("sales", "missing")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TableNotFound);
    assert_eq!(
        err.to_string(),
        "Table was not found: analytics.sales.missing"
    );
}

#[tokio::test]
async fn other_schema_failures_are_execution_errors() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_schema(WarehouseError::with_status(500, "Backend error"));
    let service = connected_service(&warehouse, 500).await;

    let err = service.get_table_schema("sales", "orders").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryExecution);
    assert_eq!(
        err.to_string(),
        "Failed to retrieve table schema: Backend error"
    );
}

#[tokio::test]
async fn table_names_with_backticks_are_rejected_locally() {
    let warehouse = FakeWarehouse::new();
    let service = connected_service(&warehouse, 500).await;

    let err = service
        .get_table_schema("sales", "orders` WHERE 1=1 --")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryValidation);
}

#[tokio::test]
async fn rows_are_split_into_contiguous_chunks() {
    for (row_total, chunk_size) in [(0, 3), (1, 3), (3, 3), (7, 3), (10, 4), (5, 1)] {
        let warehouse = FakeWarehouse::new().with_rows(numbered_rows(row_total));
        let service = connected_service(&warehouse, chunk_size).await;

        let result = service.execute_query("SELECT * FROM t", 100).await.unwrap();

        assert_eq!(result.row_count, row_total);
        assert_eq!(result.chunks.len(), row_total.div_ceil(chunk_size));
        assert!(!result.truncated);
        assert_eq!(warehouse.page_sizes(), vec![chunk_size]);

        let mut total = 0;
        for (index, chunk) in result.chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, index);
            if index + 1 < result.chunks.len() {
                assert_eq!(chunk.rows.len(), chunk_size);
            }
            total += chunk.rows.len();
        }
        assert_eq!(total, row_total);
    }
}

#[tokio::test]
async fn stops_at_max_rows_and_reports_truncation() {
    let warehouse = FakeWarehouse::new().with_rows(numbered_rows(10));
    let service = connected_service(&warehouse, 3).await;

    let result = service.execute_query("SELECT * FROM t", 4).await.unwrap();

    assert_eq!(result.row_count, 4);
    assert_eq!(
        result
            .chunks
            .iter()
            .map(|chunk| chunk.rows.len())
            .collect::<Vec<_>>(),
        vec![3, 1]
    );
    assert!(result.truncated);
    assert_eq!(result.chunks[1].rows[0]["id"], 3);
}

#[tokio::test]
async fn unknown_total_is_not_truncated() {
    let warehouse = FakeWarehouse::new()
        .with_rows(numbered_rows(10))
        .with_total_rows(None);
    let service = connected_service(&warehouse, 3).await;

    let result = service.execute_query("SELECT * FROM t", 4).await.unwrap();

    assert_eq!(result.row_count, 4);
    assert!(!result.truncated);
}

#[tokio::test]
async fn reports_job_metadata() {
    let warehouse = FakeWarehouse::new().with_rows(numbered_rows(2));
    let service = connected_service(&warehouse, 500).await;

    let result = service.execute_query("SELECT 1", 10).await.unwrap();

    assert_eq!(result.job_id, "job_0");
    assert_eq!(result.statement_type.as_deref(), Some("SELECT"));
    assert_eq!(result.cache_hit, Some(false));
    assert_eq!(result.bytes_processed, Some(1024));
    assert_eq!(result.slot_millis, Some(42));
    assert!(result.duration_ms >= 0.0);
    assert_eq!(warehouse.submitted_queries(), vec!["SELECT 1"]);
}

#[tokio::test]
async fn auth_failure_refreshes_the_client_without_retrying_the_query() {
    init_test_tracing();
    let warehouse = FakeWarehouse::new().with_rows(numbered_rows(1));
    warehouse.fail_next_submit(WarehouseError::with_status(403, "Access Denied"));
    let provider = StaticCredentialProvider::for_project("analytics");
    let service = QueryService::connect(provider.clone(), warehouse.clone(), service_config(500))
        .await
        .unwrap();

    let err = service.execute_query("SELECT 1", 10).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryExecution);
    assert_eq!(err.to_string(), "Failed to execute query: Access Denied");
    assert_eq!(provider.fetches(), 2);
    assert_eq!(warehouse.connects(), 2);
    assert_eq!(warehouse.closes(), 1);
    assert!(warehouse.submitted_queries().is_empty());

    let result = service.execute_query("SELECT 1", 10).await.unwrap();
    assert_eq!(result.row_count, 1);
}

#[tokio::test]
async fn failed_refresh_after_auth_failure_keeps_the_query_error() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_submit(WarehouseError::with_status(401, "Invalid Credentials"));
    let provider = StaticCredentialProvider::for_project("analytics");
    let service = QueryService::connect(provider.clone(), warehouse.clone(), service_config(500))
        .await
        .unwrap();
    provider.withdraw();

    let err = service.execute_query("SELECT 1", 10).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryExecution);
    assert_eq!(warehouse.connects(), 1);
    assert!(service.is_initialized().await);
}

#[tokio::test]
async fn configuration_error_during_auth_refresh_propagates() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_submit(WarehouseError::with_status(401, "Invalid Credentials"));
    let provider = StaticCredentialProvider::for_project("analytics");
    let service = QueryService::connect(provider.clone(), warehouse.clone(), service_config(500))
        .await
        .unwrap();
    provider.set_payload(service_account_json(None));

    let err = service.execute_query("SELECT 1", 10).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn other_submission_failures_do_not_refresh() {
    let warehouse = FakeWarehouse::new();
    warehouse.fail_next_submit(WarehouseError::with_status(400, "Syntax error: Unexpected end"));
    let service = connected_service(&warehouse, 500).await;

    let err = service.execute_query("SELECT", 10).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Failed to execute query: Syntax error: Unexpected end"
    );
    assert_eq!(warehouse.connects(), 1);
}

#[tokio::test]
async fn streaming_failures_are_execution_errors() {
    let warehouse = FakeWarehouse::new()
        .with_rows(numbered_rows(5))
        .with_stream_error_after(2);
    let service = connected_service(&warehouse, 500).await;

    let err = service.execute_query("SELECT 1", 10).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryExecution);
    assert_eq!(err.description(), "Error streaming query results");
}

#[tokio::test(start_paused = true)]
async fn concurrent_queries_complete_independently() {
    let warehouse = FakeWarehouse::new()
        .with_rows(numbered_rows(5))
        .with_query_delay(Duration::from_millis(100));
    let service = connected_service(&warehouse, 2).await;

    let (first, second) = tokio::join!(
        service.execute_query("SELECT * FROM a", 5),
        service.execute_query("SELECT * FROM b", 3),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.row_count, 5);
    assert_eq!(first.chunks.len(), 3);
    assert!(!first.truncated);
    assert_eq!(second.row_count, 3);
    assert_eq!(second.chunks.len(), 2);
    assert!(second.truncated);
    assert_ne!(first.job_id, second.job_id);
}

#[tokio::test(start_paused = true)]
async fn refresh_does_not_interrupt_a_running_query() {
    let warehouse = FakeWarehouse::new()
        .with_rows(numbered_rows(4))
        .with_query_delay(Duration::from_millis(100));
    let service = connected_service(&warehouse, 2).await;

    let (query, refresh) = tokio::join!(service.execute_query("SELECT 1", 10), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        service.refresh().await
    });

    refresh.unwrap();
    assert_eq!(query.unwrap().row_count, 4);
    assert_eq!(warehouse.connects(), 2);
    assert_eq!(warehouse.closes(), 1);
}
