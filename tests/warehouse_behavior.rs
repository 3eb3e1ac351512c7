//! Behaviour tests for the DuckDB warehouse behind the query executor.

use adlens_tests::{campaign_day, order, TestWarehouse};
use adlens_warehouse::{
    QueryExecutor, QueryGuardrails, QueryParams, SqlValue, Warehouse, WarehouseConfig,
    WarehouseError,
};

#[test]
fn when_facts_are_reingested_the_latest_values_win() {
    // Given: a campaign day
    let fixture = TestWarehouse::new();
    fixture.campaign_days(&[campaign_day("2024-01-02", "meta_ads", "c-1", 10.0, 100, 1, 0.0)]);

    // When: the same key is loaded again with new spend
    fixture.campaign_days(&[campaign_day("2024-01-02", "meta_ads", "c-1", 25.0, 100, 1, 0.0)]);

    // Then: one row with the new value
    let rows = fixture
        .warehouse
        .execute(
            "SELECT COUNT(*) AS N, SUM(spend) AS SPEND FROM fct_campaign_performance",
            &QueryParams::new(),
        )
        .expect("query");
    assert_eq!(rows[0].get("n"), Some(&SqlValue::Int(1)));
    assert_eq!(rows[0].get("spend"), Some(&SqlValue::Float(25.0)));
}

#[test]
fn when_named_parameters_repeat_they_bind_the_same_value() {
    let fixture = TestWarehouse::new();
    fixture.orders(&[
        order("o-1", "p-1", "2024-01-05"),
        order("o-2", "p-2", "2024-03-05"),
    ]);
    let params = QueryParams::new()
        .with("date_from", "2024-01-01")
        .with("date_to", "2024-01-31");

    let rows = fixture
        .warehouse
        .execute(
            "SELECT o.order_id AS ORDER_ID, CAST(o.order_date AS VARCHAR) AS DAY \
             FROM fct_order_details o \
             WHERE o.order_date >= CAST($date_from AS DATE) \
               AND o.order_date <= CAST($date_to AS DATE) \
               AND o.order_date BETWEEN CAST($date_from AS DATE) AND CAST($date_to AS DATE)",
            &params,
        )
        .expect("query");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ORDER_ID"), Some(&SqlValue::from("o-1")));
    assert_eq!(rows[0].get("day"), Some(&SqlValue::from("2024-01-05")));
}

#[test]
fn when_a_parameter_is_missing_the_query_is_rejected_before_running() {
    let fixture = TestWarehouse::new();

    let error = fixture
        .warehouse
        .execute("SELECT * FROM dim_person WHERE person_id = $person", &QueryParams::new())
        .expect_err("missing parameter");

    assert!(matches!(error, WarehouseError::QueryRejected(message) if message.contains("$person")));
}

#[test]
fn when_the_executor_receives_a_write_it_refuses() {
    let fixture = TestWarehouse::new();

    for sql in [
        "DELETE FROM fct_order_details",
        "SELECT 1; DROP TABLE dim_person",
        "   ",
    ] {
        let error = fixture
            .warehouse
            .execute(sql, &QueryParams::new())
            .expect_err("refused");
        assert!(matches!(error, WarehouseError::QueryRejected(_)), "{sql}");
    }
}

#[test]
fn when_a_metric_query_exceeds_the_row_limit_it_fails_instead_of_truncating() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = WarehouseConfig::at(dir.path().join("limits.duckdb"));
    config.guardrails = QueryGuardrails {
        max_rows: 3,
        query_timeout_ms: 5_000,
    };
    let warehouse = Warehouse::open(config).expect("open");

    let error = warehouse
        .execute("SELECT * FROM range(10)", &QueryParams::new())
        .expect_err("too many rows");
    assert!(matches!(error, WarehouseError::QueryRejected(_)));

    let raw = warehouse
        .execute_query("SELECT * FROM range(10)", QueryGuardrails { max_rows: 3, query_timeout_ms: 5_000 }, false)
        .expect("raw sql truncates");
    assert!(raw.truncated);
    assert_eq!(raw.row_count, 3);
}

#[test]
fn when_the_warehouse_is_reopened_schema_and_data_persist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("persist.duckdb");

    {
        let warehouse = Warehouse::open(WarehouseConfig::at(&path)).expect("open");
        warehouse
            .ingest_orders(&[order("o-1", "p-1", "2024-01-05")])
            .expect("ingest");
    }

    let warehouse = Warehouse::open(WarehouseConfig::at(&path)).expect("reopen");
    let rows = warehouse
        .execute("SELECT COUNT(*) AS N FROM fct_order_details", &QueryParams::new())
        .expect("count");
    assert_eq!(rows[0].get("N"), Some(&SqlValue::Int(1)));

    let tables = warehouse.describe_schema().expect("schema");
    assert!(tables.iter().any(|table| table.name == "fct_customer_metrics"));
}

#[test]
fn when_a_cte_wraps_a_write_the_executor_refuses_and_nothing_lands() {
    // Given: an empty person dimension
    let fixture = TestWarehouse::new();

    // When: a write hides behind a leading WITH
    let error = fixture
        .warehouse
        .execute(
            "WITH seed AS (SELECT 1) INSERT INTO dim_person (person_id) \
             SELECT 'intruder' RETURNING person_id",
            &QueryParams::new(),
        )
        .expect_err("write behind a CTE");

    // Then: it is rejected up front and the table is untouched
    assert!(matches!(error, WarehouseError::QueryRejected(message) if message.contains("INSERT")));
    let rows = fixture
        .warehouse
        .execute("SELECT COUNT(*) AS N FROM dim_person", &QueryParams::new())
        .expect("count");
    assert_eq!(rows[0].get("N"), Some(&SqlValue::Int(0)));
}

#[test]
fn when_raw_sql_is_read_only_keywords_inside_literals_are_allowed() {
    let fixture = TestWarehouse::new();

    let result = fixture
        .warehouse
        .execute_query(
            "SELECT 'insert into nowhere' AS LABEL, \"delete\" FROM (SELECT 1 AS \"delete\")",
            QueryGuardrails::default(),
            false,
        )
        .expect("quoted keywords are data");

    assert_eq!(result.row_count, 1);
    assert_eq!(result.columns.len(), 2);
}

#[test]
fn when_the_write_path_runs_a_returning_insert_it_lands_once() {
    let fixture = TestWarehouse::new();

    let result = fixture
        .warehouse
        .execute_query(
            "WITH seed AS (SELECT 1) INSERT INTO dim_person (person_id) \
             SELECT 'p-1' RETURNING person_id",
            QueryGuardrails::default(),
            true,
        )
        .expect("single execution");

    assert_eq!(result.row_count, 1);
    let rows = fixture
        .warehouse
        .execute("SELECT COUNT(*) AS N FROM dim_person", &QueryParams::new())
        .expect("count");
    assert_eq!(rows[0].get("N"), Some(&SqlValue::Int(1)));
}
