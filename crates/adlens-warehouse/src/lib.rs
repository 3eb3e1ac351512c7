//! # Adlens Warehouse
//!
//! DuckDB-backed marketing warehouse for adlens.
//!
//! The crate owns everything on the far side of the [`QueryExecutor`] seam:
//! the connection pool, the star-schema migrations, guardrails, and the
//! conversion of `DuckDB` values into [`SqlValue`]s. Metric families in
//! `adlens-core` only ever see `execute(sql, params) -> Vec<MetricRow>`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adlens_warehouse::{QueryExecutor, QueryParams, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     let params = QueryParams::new().with("platform", "meta_ads");
//!     let rows = warehouse.execute(
//!         "SELECT SUM(spend) AS TOTAL_SPEND FROM fct_campaign_performance WHERE platform = $platform",
//!         &params,
//!     )?;
//!
//!     println!("{:?}", rows[0].get("total_spend"));
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Grain |
//! |-------|-------|
//! | `fct_campaign_performance` | day x platform x campaign |
//! | `fct_meta_delivery` | day x platform (reach) |
//! | `dim_keyword` | keyword snapshot with quality score |
//! | `fct_ga4_traffic` | day x traffic source |
//! | `fct_ga4_device_browser` | day x device x browser |
//! | `fct_ga4_first_touch` | day x first-touch channel |
//! | `fct_ecommerce_item` | day (funnel item counts) |
//! | `fct_order_details` | order |
//! | `fct_customer_metrics` | acquisition cohort month |
//! | `dim_person` | customer |

pub mod duckdb;
pub mod migrations;
pub mod row;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ::duckdb::types::{TimeUnit, Value as DuckValue};
use ::duckdb::Connection;
use ::duckdb::ToSql;
use serde::Serialize;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};
pub use row::{bind_named, MetricRow, QueryExecutor, QueryParams, SqlValue};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for adlens data.
    pub adlens_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept per access mode.
    pub max_pool_size: usize,
    /// Limits applied to every query issued through [`QueryExecutor`].
    pub guardrails: QueryGuardrails,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let adlens_home = resolve_adlens_home();
        let db_path = env::var_os("ADLENS_DB_PATH")
            .filter(|path| !path.is_empty())
            .map_or_else(|| adlens_home.join("warehouse.duckdb"), PathBuf::from);
        let max_pool_size = env::var("ADLENS_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(4);
        Self {
            adlens_home,
            db_path,
            max_pool_size,
            guardrails: QueryGuardrails::analytics(),
        }
    }
}

impl WarehouseConfig {
    /// Configuration rooted at `db_path`, ignoring the environment.
    #[must_use]
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let adlens_home = db_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            adlens_home,
            db_path,
            max_pool_size: 4,
            guardrails: QueryGuardrails::analytics(),
        }
    }
}

/// Guardrails for query execution to prevent resource exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryGuardrails {
    /// Maximum number of rows to return.
    pub max_rows: usize,
    /// Query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    /// Limits for ad-hoc SQL typed by a user.
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    /// Limits for metric-family queries, which may scan full order history.
    #[must_use]
    pub const fn analytics() -> Self {
        Self {
            max_rows: 1_000_000,
            query_timeout_ms: 30_000,
        }
    }

    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Column metadata for query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Result of an ad-hoc SQL query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<SqlValue>>,
    pub row_count: usize,
    /// Whether rows were cut at `max_rows`.
    pub truncated: bool,
}

/// A table and its columns, as reported by `information_schema`.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<SqlColumn>,
}

/// One day of one campaign on one ad platform.
#[derive(Debug, Clone)]
pub struct CampaignPerformanceRecord {
    /// Calendar day as `YYYY-MM-DD`.
    pub date_day: String,
    /// Source platform key, e.g. `google_ads` or `meta_ads`.
    pub platform: String,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub campaign_type: Option<String>,
    pub status: Option<String>,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub conversion_value: f64,
}

/// A single customer order.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_id: String,
    pub person_id: String,
    /// Calendar day as `YYYY-MM-DD`.
    pub order_date: String,
    pub revenue: f64,
}

/// What to do when a result set reaches `max_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLimit {
    Truncate,
    Reject,
}

/// The marketing warehouse.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with configuration resolved from the environment.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse, creating the database file and schema if needed.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        config.guardrails.validate()?;
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        info!(path = %warehouse.db_path().display(), "warehouse ready");
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Execute ad-hoc SQL with guardrails.
    ///
    /// Read-only mode accepts a single SELECT/CTE statement. Results past
    /// `max_rows` are dropped and flagged with `truncated`.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
        allow_write: bool,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;

        if !allow_write {
            enforce_read_only_query(sql)?;
        }

        let mode = if allow_write {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly
        };
        let connection = self.manager.acquire(mode)?;
        let started = Instant::now();

        if is_select_like(sql) {
            let fetch =
                || fetch_rows(&connection, sql, &[], guardrails, started, RowLimit::Truncate);
            let (columns, rows, truncated) = if allow_write {
                fetch()?
            } else {
                read_and_discard(&connection, fetch)?
            };
            Ok(QueryResult {
                columns,
                row_count: rows.len(),
                rows,
                truncated,
            })
        } else {
            connection.execute_batch(sql)?;
            ensure_timeout(started, guardrails.timeout())?;
            Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                row_count: 0,
                truncated: false,
            })
        }
    }

    /// List user tables and their columns.
    pub fn describe_schema(&self) -> Result<Vec<TableSchema>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT table_name, column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema = 'main' \
             ORDER BY table_name, ordinal_position",
        )?;
        let mut rows = statement.query([] as [&dyn ToSql; 0])?;

        let mut tables: Vec<TableSchema> = Vec::new();
        while let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            let column = SqlColumn {
                name: row.get(1)?,
                r#type: row.get(2)?,
            };
            match tables.last_mut() {
                Some(last) if last.name == table => last.columns.push(column),
                _ => tables.push(TableSchema {
                    name: table,
                    columns: vec![column],
                }),
            }
        }

        Ok(tables)
    }

    /// Load campaign-day facts, replacing rows with the same key.
    pub fn ingest_campaign_performance(
        &self,
        rows: &[CampaignPerformanceRecord],
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 11] = [
                    &row.date_day,
                    &row.platform,
                    &row.campaign_id,
                    &row.campaign_name,
                    &row.campaign_type,
                    &row.status,
                    &row.spend,
                    &row.impressions,
                    &row.clicks,
                    &row.conversions,
                    &row.conversion_value,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO fct_campaign_performance \
                     (date_day, platform, campaign_id, campaign_name, campaign_type, status, \
                      spend, impressions, clicks, conversions, conversion_value) \
                     VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        let result = finalize_transaction(&connection, result);
        if result.is_ok() {
            debug!(rows = rows.len(), "ingested campaign performance");
        }
        result
    }

    /// Load customer orders, replacing rows with the same order id.
    pub fn ingest_orders(&self, rows: &[OrderRecord]) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 4] =
                    [&row.order_id, &row.person_id, &row.order_date, &row.revenue];
                connection.execute(
                    "INSERT OR REPLACE INTO fct_order_details \
                     (order_id, person_id, order_date, revenue) \
                     VALUES (?, ?, CAST(? AS DATE), ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        let result = finalize_transaction(&connection, result);
        if result.is_ok() {
            debug!(rows = rows.len(), "ingested orders");
        }
        result
    }
}

impl QueryExecutor for Warehouse {
    /// Run one read-only statement under the configured guardrails.
    ///
    /// A result larger than `max_rows` is rejected rather than truncated.
    fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<MetricRow>, WarehouseError> {
        let sql = normalize_sql(sql)?;
        enforce_read_only_query(sql)?;
        let (sql, values) = bind_named(sql, params)?;

        let guardrails = self.config.guardrails;
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let started = Instant::now();
        let (columns, rows, _) = read_and_discard(&connection, || {
            fetch_rows(
                &connection,
                sql.as_str(),
                values.as_slice(),
                guardrails,
                started,
                RowLimit::Reject,
            )
        })?;

        debug!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warehouse query executed"
        );

        Ok(rows
            .into_iter()
            .map(|values| {
                MetricRow::from_pairs(
                    columns
                        .iter()
                        .map(|column| column.name.clone())
                        .zip(values),
                )
            })
            .collect())
    }
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

type FetchedRows = (Vec<SqlColumn>, Vec<Vec<SqlValue>>, bool);

/// Run a SELECT and collect column metadata and rows.
fn fetch_rows(
    connection: &Connection,
    sql: &str,
    values: &[SqlValue],
    guardrails: QueryGuardrails,
    started: Instant,
    limit: RowLimit,
) -> Result<FetchedRows, WarehouseError> {
    let bound: Vec<&dyn ToSql> = values.iter().map(|value| value as &dyn ToSql).collect();
    let mut statement = connection.prepare(sql)?;

    // Column metadata is only available once the statement has run, so it
    // is read from the same execution that yields the rows.
    let mut cursor = statement.query(bound.as_slice())?;
    let columns = match cursor.as_ref() {
        Some(executed) => describe_columns(executed)?,
        None => Vec::new(),
    };
    let column_count = columns.len();
    let mut rows = Vec::new();
    let mut truncated = false;

    while let Some(row) = cursor.next()? {
        ensure_timeout(started, guardrails.timeout())?;

        if rows.len() >= guardrails.max_rows {
            match limit {
                RowLimit::Truncate => {
                    truncated = true;
                    break;
                }
                RowLimit::Reject => {
                    return Err(WarehouseError::QueryRejected(format!(
                        "result exceeds {} rows",
                        guardrails.max_rows
                    )))
                }
            }
        }

        rows.push(read_row(row, column_count)?);
    }

    ensure_timeout(started, guardrails.timeout())?;
    Ok((columns, rows, truncated))
}

fn describe_columns(statement: &::duckdb::Statement<'_>) -> Result<Vec<SqlColumn>, WarehouseError> {
    let column_count = statement.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let name = statement.column_name(index)?.to_string();
        columns.push(SqlColumn {
            name,
            r#type: statement.column_type(index).to_string(),
        });
    }
    Ok(columns)
}

/// Run a read inside a transaction that is always rolled back.
fn read_and_discard<T>(
    connection: &Connection,
    read: impl FnOnce() -> Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = read();
    connection.execute_batch("ROLLBACK")?;
    result
}

fn read_row(row: &::duckdb::Row<'_>, column_count: usize) -> Result<Vec<SqlValue>, ::duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_sql_value(value));
    }
    Ok(output)
}

/// Convert a `DuckDB` value into the executor's scalar model.
///
/// Dates and timestamps become ISO-8601 text; non-finite floats become NULL.
fn to_sql_value(value: DuckValue) -> SqlValue {
    match value {
        DuckValue::Null => SqlValue::Null,
        DuckValue::Boolean(value) => SqlValue::Bool(value),
        DuckValue::TinyInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::SmallInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::Int(value) => SqlValue::Int(i64::from(value)),
        DuckValue::BigInt(value) => SqlValue::Int(value),
        DuckValue::UTinyInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::USmallInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::UInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::UBigInt(value) => {
            i64::try_from(value).map_or_else(|_| SqlValue::from(value as f64), SqlValue::Int)
        }
        DuckValue::HugeInt(value) => {
            i64::try_from(value).map_or_else(|_| SqlValue::from(value as f64), SqlValue::Int)
        }
        DuckValue::Float(value) => SqlValue::from(f64::from(value)),
        DuckValue::Double(value) => SqlValue::from(value),
        DuckValue::Decimal(value) => {
            let text = value.to_string();
            text.parse::<f64>()
                .map_or(SqlValue::Text(text), SqlValue::from)
        }
        DuckValue::Text(value) => SqlValue::Text(value),
        DuckValue::Blob(value) => SqlValue::Text(hex::encode(value)),
        DuckValue::Date32(days) => format_date32(days),
        DuckValue::Timestamp(unit, raw) => format_timestamp(unit, raw),
        other => SqlValue::Text(format!("{other:?}")),
    }
}

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

fn format_date32(days: i32) -> SqlValue {
    days.checked_add(UNIX_EPOCH_JULIAN_DAY)
        .and_then(|julian| Date::from_julian_day(julian).ok())
        .map_or_else(|| SqlValue::Int(i64::from(days)), |date| SqlValue::Text(date.to_string()))
}

fn format_timestamp(unit: TimeUnit, raw: i64) -> SqlValue {
    let raw = i128::from(raw);
    let nanos = match unit {
        TimeUnit::Second => raw * 1_000_000_000,
        TimeUnit::Millisecond => raw * 1_000_000,
        TimeUnit::Microsecond => raw * 1_000,
        TimeUnit::Nanosecond => raw,
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|ts| {
            ts.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .ok()
        })
        .map_or_else(|| SqlValue::Text(raw.to_string()), SqlValue::Text)
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

/// Enforce that a query is a single SELECT/CTE statement.
fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "read-only mode accepts only SELECT/CTE queries; use --write for write statements",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed in read-only mode",
        )));
    }
    if let Some(keyword) = find_write_keyword(sql) {
        return Err(WarehouseError::QueryRejected(format!(
            "read-only mode does not allow {keyword}"
        )));
    }
    Ok(())
}

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "CREATE", "DROP", "ALTER", "TRUNCATE",
    "COPY", "ATTACH", "DETACH", "INSTALL", "LOAD", "PRAGMA", "CALL", "EXPORT", "IMPORT",
    "VACUUM", "CHECKPOINT", "GRANT", "REVOKE",
];

/// First write keyword outside quoted text, if any.
fn find_write_keyword(sql: &str) -> Option<String> {
    let mut word = String::new();
    let mut quote: Option<char> = None;

    for ch in sql.chars().chain(std::iter::once(' ')) {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch.to_ascii_uppercase());
            continue;
        }
        if WRITE_KEYWORDS.contains(&word.as_str()) {
            return Some(word);
        }
        word.clear();
        if ch == '\'' || ch == '"' {
            quote = Some(ch);
        }
    }
    None
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';')
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

/// `ADLENS_HOME`, else `$HOME/.adlens`, else `./.adlens`.
fn resolve_adlens_home() -> PathBuf {
    if let Some(path) = env::var_os("ADLENS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".adlens");
    }

    PathBuf::from(".adlens")
}
