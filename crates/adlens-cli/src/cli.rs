//! CLI argument definitions for adlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `metrics` | Run one metric family over an optional date range |
//! | `sql` | Query the local DuckDB warehouse |
//! | `schema` | List warehouse tables and columns |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--db-path` | `$ADLENS_DB_PATH` | Warehouse file |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! adlens metrics meta-ads-overview --from 2024-01-01 --to 2024-01-31
//! adlens metrics cohort-retention --limit 6 --pretty
//! adlens sql "SELECT platform, SUM(spend) FROM fct_campaign_performance GROUP BY 1"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Marketing analytics over a local DuckDB warehouse.
#[derive(Debug, Parser)]
#[command(
    name = "adlens",
    author,
    version,
    about = "Marketing analytics over a local DuckDB warehouse"
)]
pub struct Cli {
    /// Warehouse database file. Overrides ADLENS_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Key/value summary for terminal display.
    Table,
    /// Single JSON object.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a metric family.
    ///
    /// # Examples
    ///
    ///   adlens metrics ga4-traffic-sources --from 2024-03-01
    ///   adlens metrics meta-ads-daily --campaign-id 120210 --pretty
    Metrics(MetricsArgs),

    /// Run SQL against the warehouse.
    ///
    /// Read-only by default; use --write for data modifications.
    Sql(SqlArgs),

    /// List warehouse tables and their columns.
    Schema,
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Metric family name, e.g. `meta-ads-overview` or `cohort-retention`.
    pub family: String,

    /// Inclusive start date (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Inclusive end date (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,

    /// Number of cohorts for `cohort-retention`.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Restrict `meta-ads-daily` to one campaign.
    #[arg(long)]
    pub campaign_id: Option<String>,

    /// Restrict `meta-ads-campaigns` to one delivery status.
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Allow write operations (INSERT, UPDATE, DELETE, CREATE, etc.).
    #[arg(long, default_value_t = false)]
    pub write: bool,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}
