use ::duckdb::Connection;
use tracing::info;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ad_platform_facts",
        sql: r#"
CREATE TABLE IF NOT EXISTS fct_campaign_performance (
    date_day DATE NOT NULL,
    platform TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    campaign_name TEXT,
    campaign_type TEXT,
    status TEXT,
    spend DOUBLE,
    impressions BIGINT,
    clicks BIGINT,
    conversions DOUBLE,
    conversion_value DOUBLE,
    PRIMARY KEY(date_day, platform, campaign_id)
);

CREATE TABLE IF NOT EXISTS fct_meta_delivery (
    date_day DATE NOT NULL,
    platform TEXT NOT NULL,
    campaign_id TEXT,
    reach BIGINT
);

CREATE TABLE IF NOT EXISTS dim_keyword (
    platform TEXT NOT NULL,
    keyword TEXT NOT NULL,
    quality_score DOUBLE,
    is_current BOOLEAN NOT NULL DEFAULT TRUE
);
"#,
    },
    Migration {
        version: "0002_web_analytics_facts",
        sql: r#"
CREATE TABLE IF NOT EXISTS fct_ga4_traffic (
    date_day DATE NOT NULL,
    platform TEXT NOT NULL DEFAULT 'ga4',
    source TEXT,
    sessions BIGINT,
    total_users BIGINT,
    engaged_sessions BIGINT,
    conversions DOUBLE,
    revenue DOUBLE
);

CREATE TABLE IF NOT EXISTS fct_ga4_device_browser (
    date_day DATE NOT NULL,
    source_platform TEXT,
    device_category TEXT,
    browser_group TEXT,
    users BIGINT
);

CREATE TABLE IF NOT EXISTS fct_ga4_first_touch (
    date_day DATE NOT NULL,
    channel_grouping TEXT,
    conversions DOUBLE,
    revenue DOUBLE
);

CREATE TABLE IF NOT EXISTS fct_ecommerce_item (
    date_day DATE NOT NULL,
    items_viewed BIGINT,
    items_added_to_cart BIGINT,
    items_purchased BIGINT
);
"#,
    },
    Migration {
        version: "0003_customer_facts",
        sql: r#"
CREATE TABLE IF NOT EXISTS dim_person (
    person_id TEXT PRIMARY KEY,
    historic_clv DOUBLE,
    predicted_clv DOUBLE,
    total_clv DOUBLE,
    churn_probability DOUBLE,
    churn_risk_segment TEXT,
    clv_segment TEXT
);

CREATE TABLE IF NOT EXISTS fct_order_details (
    order_id TEXT PRIMARY KEY,
    person_id TEXT NOT NULL,
    order_date DATE NOT NULL,
    revenue DOUBLE
);

CREATE TABLE IF NOT EXISTS fct_customer_metrics (
    cohort_month DATE PRIMARY KEY,
    total_revenue DOUBLE,
    total_orders BIGINT,
    repeat_purchase_rate DOUBLE,
    ltv_cac_ratio DOUBLE,
    cac_google DOUBLE,
    cac_meta DOUBLE,
    google_ads_spend DOUBLE,
    meta_ads_spend DOUBLE,
    total_ad_spend DOUBLE,
    new_customers BIGINT,
    repeat_customers BIGINT,
    one_time_customers BIGINT,
    retention_rate_30d DOUBLE,
    retention_rate_60d DOUBLE,
    retention_rate_90d DOUBLE,
    retained_30d_count BIGINT,
    retained_60d_count BIGINT,
    retained_90d_count BIGINT
);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
            info!(version = migration.version, "applied warehouse migration");
        }
    }

    Ok(())
}
