//! Revenue, acquisition cost, retention and lifetime value.
//!
//! Monthly cohort aggregates live in `fct_customer_metrics`, keyed by the
//! first day of the cohort month, so those families floor both range bounds
//! to the month. Person-level families read `dim_person` and, when the range
//! has a bound, keep only customers with an order inside it.

use std::cmp::Ordering;

use adlens_warehouse::{MetricRow, QueryExecutor, QueryParams};
use serde::Serialize;

use crate::cohort::{compute_retention, CohortFilter, CohortRetentionReport, CustomerOrder};
use crate::derive::{share_of_total, AVG_ORDER_VALUE, CAC_BLENDED};
use crate::error::{AnalyticsError, MappingError};
use crate::mapper::RowMapper;
use crate::predicate::{Predicate, PredicateBuilder};
use crate::range::DateRange;

use super::{count_shares, fetch, first_or_empty, CountShare};

const COHORT_MONTH: PredicateBuilder = PredicateBuilder::on("m.cohort_month").by_month();
const ORDER_DAY: PredicateBuilder = PredicateBuilder::on("o.order_date");

/// Churn segments in reporting order; anything else sorts after them.
const CHURN_ORDER: [&str; 4] = ["Low Risk", "Healthy", "Medium Risk", "High Risk"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueOverview {
    pub total_revenue: f64,
    pub avg_clv: f64,
    pub historic_clv: f64,
    pub predicted_clv: f64,
    pub repeat_purchase_rate: f64,
    pub clv_cac_ratio: f64,
    pub avg_aov: f64,
    /// Mean churn probability as a percentage.
    pub churn_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacMetrics {
    pub cac_google: f64,
    pub cac_meta: f64,
    pub cac_blended: f64,
    pub google_ads_spend: f64,
    pub meta_ads_spend: f64,
    pub total_ad_spend: f64,
    pub new_customers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerTypes {
    pub new_customers: i64,
    pub repeat_customers: i64,
    pub one_time_customers: i64,
    pub repeat_percentage: f64,
    pub one_time_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionMetrics {
    pub retention_30d: f64,
    pub retention_60d: f64,
    pub retention_90d: f64,
    pub retained_30d_count: i64,
    pub retained_60d_count: i64,
    pub retained_90d_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClvBreakdown {
    pub historic_clv: f64,
    pub predicted_clv: f64,
    pub total_clv: f64,
}

/// Revenue from the cohort table plus the current CLV snapshot.
///
/// CLV averages describe every known customer and ignore the range.
pub fn revenue_overview(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<RevenueOverview, AnalyticsError> {
    let predicate = COHORT_MONTH.build(range)?;

    let sql = format!(
        "SELECT SUM(m.total_revenue) AS TOTAL_REVENUE, SUM(m.total_orders) AS TOTAL_ORDERS, \
                AVG(m.repeat_purchase_rate) AS REPEAT_PURCHASE_RATE, \
                AVG(m.ltv_cac_ratio) AS CLV_CAC_RATIO \
         FROM fct_customer_metrics m{}",
        predicate.where_clause()
    );
    let metrics = first_or_empty(fetch(
        executor,
        "revenue_overview",
        &sql,
        predicate.params(),
    )?);

    let clv = first_or_empty(fetch(
        executor,
        "revenue_overview_clv",
        "SELECT AVG(p.total_clv) AS AVG_CLV, AVG(p.historic_clv) AS HISTORIC_CLV, \
                AVG(p.predicted_clv) AS PREDICTED_CLV, \
                AVG(p.churn_probability) * 100.0 AS CHURN_RISK \
         FROM dim_person p",
        &QueryParams::new(),
    )?);

    let m = RowMapper::new(&metrics);
    let c = RowMapper::new(&clv);
    Ok(RevenueOverview {
        total_revenue: m.float("total_revenue")?,
        avg_clv: c.float("avg_clv")?,
        historic_clv: c.float("historic_clv")?,
        predicted_clv: c.float("predicted_clv")?,
        repeat_purchase_rate: m.float("repeat_purchase_rate")?,
        clv_cac_ratio: m.float("clv_cac_ratio")?,
        avg_aov: AVG_ORDER_VALUE.value(&metrics)?,
        churn_risk: c.float("churn_risk")?,
    })
}

pub fn cac_metrics(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<CacMetrics, AnalyticsError> {
    let predicate = COHORT_MONTH.build(range)?;

    let sql = format!(
        "SELECT AVG(m.cac_google) AS CAC_GOOGLE, AVG(m.cac_meta) AS CAC_META, \
                SUM(m.google_ads_spend) AS GOOGLE_ADS_SPEND, \
                SUM(m.meta_ads_spend) AS META_ADS_SPEND, \
                SUM(m.total_ad_spend) AS TOTAL_AD_SPEND, \
                SUM(m.new_customers) AS NEW_CUSTOMERS \
         FROM fct_customer_metrics m{}",
        predicate.where_clause()
    );
    let row = first_or_empty(fetch(executor, "cac_metrics", &sql, predicate.params())?);

    let m = RowMapper::new(&row);
    Ok(CacMetrics {
        cac_google: m.float("cac_google")?,
        cac_meta: m.float("cac_meta")?,
        cac_blended: CAC_BLENDED.value(&row)?,
        google_ads_spend: m.float("google_ads_spend")?,
        meta_ads_spend: m.float("meta_ads_spend")?,
        total_ad_spend: m.float("total_ad_spend")?,
        new_customers: m.int("new_customers")?,
    })
}

/// New, repeat and one-time customers. Shares split repeat against one-time.
pub fn customer_types(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<CustomerTypes, AnalyticsError> {
    let predicate = COHORT_MONTH.build(range)?;

    let sql = format!(
        "SELECT SUM(m.new_customers) AS NEW_CUSTOMERS, \
                SUM(m.repeat_customers) AS REPEAT_CUSTOMERS, \
                SUM(m.one_time_customers) AS ONE_TIME_CUSTOMERS \
         FROM fct_customer_metrics m{}",
        predicate.where_clause()
    );
    let row = first_or_empty(fetch(executor, "customer_types", &sql, predicate.params())?);

    let m = RowMapper::new(&row);
    let repeat_customers = m.int("repeat_customers")?;
    let one_time_customers = m.int("one_time_customers")?;
    let split = share_of_total(&[repeat_customers as f64, one_time_customers as f64]);

    Ok(CustomerTypes {
        new_customers: m.int("new_customers")?,
        repeat_customers,
        one_time_customers,
        repeat_percentage: split[0],
        one_time_percentage: split[1],
    })
}

pub fn retention_metrics(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<RetentionMetrics, AnalyticsError> {
    let predicate = COHORT_MONTH.build(range)?;

    let sql = format!(
        "SELECT AVG(m.retention_rate_30d) AS RETENTION_30D, \
                AVG(m.retention_rate_60d) AS RETENTION_60D, \
                AVG(m.retention_rate_90d) AS RETENTION_90D, \
                SUM(m.retained_30d_count) AS RETAINED_30D_COUNT, \
                SUM(m.retained_60d_count) AS RETAINED_60D_COUNT, \
                SUM(m.retained_90d_count) AS RETAINED_90D_COUNT \
         FROM fct_customer_metrics m{}",
        predicate.where_clause()
    );
    let row = first_or_empty(fetch(executor, "retention_metrics", &sql, predicate.params())?);

    let m = RowMapper::new(&row);
    Ok(RetentionMetrics {
        retention_30d: m.float("retention_30d")?,
        retention_60d: m.float("retention_60d")?,
        retention_90d: m.float("retention_90d")?,
        retained_30d_count: m.int("retained_30d_count")?,
        retained_60d_count: m.int("retained_60d_count")?,
        retained_90d_count: m.int("retained_90d_count")?,
    })
}

/// Customers per churn risk level in fixed risk order.
pub fn churn_distribution(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<Vec<CountShare>, AnalyticsError> {
    let predicate = ORDER_DAY.build(range)?;
    let sql = people_by("p.churn_risk_segment", &predicate);

    let mut labelled = fetch(executor, "churn_distribution", &sql, predicate.params())?
        .iter()
        .map(label_and_count)
        .collect::<Result<Vec<_>, MappingError>>()?;
    labelled.sort_by(|(left, _), (right, _)| churn_rank(left, right));

    Ok(count_shares(labelled))
}

/// Customers per CLV segment, largest first.
pub fn customer_segments(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<Vec<CountShare>, AnalyticsError> {
    let predicate = ORDER_DAY.build(range)?;
    let sql = people_by("p.clv_segment", &predicate);

    let mut labelled = fetch(executor, "customer_segments", &sql, predicate.params())?
        .iter()
        .map(label_and_count)
        .collect::<Result<Vec<_>, MappingError>>()?;
    labelled.sort_by(|(left_name, left), (right_name, right)| {
        right.cmp(left).then_with(|| left_name.cmp(right_name))
    });

    Ok(count_shares(labelled))
}

pub fn clv_breakdown(executor: &dyn QueryExecutor) -> Result<ClvBreakdown, AnalyticsError> {
    let row = first_or_empty(fetch(
        executor,
        "clv_breakdown",
        "SELECT AVG(p.historic_clv) AS HISTORIC_CLV, AVG(p.predicted_clv) AS PREDICTED_CLV, \
                AVG(p.total_clv) AS TOTAL_CLV \
         FROM dim_person p",
        &QueryParams::new(),
    )?);

    let m = RowMapper::new(&row);
    Ok(ClvBreakdown {
        historic_clv: m.float("historic_clv")?,
        predicted_clv: m.float("predicted_clv")?,
        total_clv: m.float("total_clv")?,
    })
}

/// Monthly acquisition cohorts and their retention curves.
///
/// Cohort membership needs every customer's first order, so the whole order
/// history is scanned and `range` only chooses which cohorts are reported.
pub fn cohort_retention(
    executor: &dyn QueryExecutor,
    range: &DateRange,
    limit: usize,
) -> Result<CohortRetentionReport, AnalyticsError> {
    range.validate()?;

    let rows = fetch(
        executor,
        "cohort_retention",
        "SELECT CAST(o.person_id AS VARCHAR) AS CUSTOMER_ID, \
                CAST(DATE_TRUNC('month', o.order_date) AS DATE) AS ORDER_MONTH \
         FROM fct_order_details o \
         WHERE o.person_id IS NOT NULL \
         GROUP BY 1, 2",
        &QueryParams::new(),
    )?;
    let orders = rows
        .iter()
        .map(map_order)
        .collect::<Result<Vec<_>, MappingError>>()?;

    let filter = CohortFilter::from_range(range).with_limit(limit);
    Ok(compute_retention(&orders, &filter))
}

/// Count people per `column`, restricted to buyers in range when bounded.
fn people_by(column: &str, predicate: &Predicate) -> String {
    if predicate.is_empty() {
        format!(
            "SELECT {column} AS LABEL, COUNT(*) AS CUSTOMER_COUNT \
             FROM dim_person p \
             GROUP BY {column} \
             ORDER BY {column} ASC NULLS LAST"
        )
    } else {
        format!(
            "SELECT {column} AS LABEL, COUNT(DISTINCT p.person_id) AS CUSTOMER_COUNT \
             FROM dim_person p \
             JOIN fct_order_details o ON p.person_id = o.person_id{} \
             GROUP BY {column} \
             ORDER BY {column} ASC NULLS LAST",
            predicate.where_clause()
        )
    }
}

fn label_and_count(row: &MetricRow) -> Result<(String, i64), MappingError> {
    let m = RowMapper::new(row);
    Ok((m.text_or("label", "Unknown")?, m.int("customer_count")?))
}

fn churn_rank(left: &str, right: &str) -> Ordering {
    let position = |label: &str| {
        CHURN_ORDER
            .iter()
            .position(|known| *known == label)
            .unwrap_or(CHURN_ORDER.len())
    };
    position(left)
        .cmp(&position(right))
        .then_with(|| left.cmp(right))
}

fn map_order(row: &MetricRow) -> Result<CustomerOrder, MappingError> {
    let m = RowMapper::new(row);
    Ok(CustomerOrder::new(
        m.text("customer_id")?,
        m.date("order_month")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::YearMonth;
    use crate::families::testing::ScriptedExecutor;
    use adlens_warehouse::SqlValue;
    use time::macros::date;

    #[test]
    fn cohort_families_floor_bounds_to_the_month() {
        let executor = ScriptedExecutor::new();
        let range = DateRange::new(Some(date!(2024 - 03 - 15)), Some(date!(2024 - 05 - 20)));

        retention_metrics(&executor, &range).expect("retention metrics");

        let calls = executor.calls.borrow();
        assert!(calls[0].0.contains("m.cohort_month >= CAST($date_from AS DATE)"));
        assert_eq!(
            calls[0].1.get("date_from"),
            Some(&SqlValue::Text("2024-03-01".to_string()))
        );
        assert_eq!(
            calls[0].1.get("date_to"),
            Some(&SqlValue::Text("2024-05-01".to_string()))
        );
    }

    #[test]
    fn blended_cac_divides_total_spend_by_new_customers() {
        let executor = ScriptedExecutor::new().respond(vec![MetricRow::new()
            .with("CAC_GOOGLE", 40.0)
            .with("CAC_META", SqlValue::Null)
            .with("GOOGLE_ADS_SPEND", 600.0)
            .with("META_ADS_SPEND", 400.0)
            .with("TOTAL_AD_SPEND", 1000.0)
            .with("NEW_CUSTOMERS", 25_i64)]);

        let cac = cac_metrics(&executor, &DateRange::unbounded()).expect("cac");

        assert_eq!(cac.cac_blended, 40.0);
        assert_eq!(cac.cac_meta, 0.0);
    }

    #[test]
    fn revenue_overview_reads_metrics_and_clv_snapshot() {
        let executor = ScriptedExecutor::new()
            .respond(vec![MetricRow::new()
                .with("TOTAL_REVENUE", 900.0)
                .with("TOTAL_ORDERS", 30_i64)
                .with("REPEAT_PURCHASE_RATE", 12.5)
                .with("CLV_CAC_RATIO", 3.0)])
            .respond(vec![MetricRow::new()
                .with("AVG_CLV", 150.0)
                .with("HISTORIC_CLV", 100.0)
                .with("PREDICTED_CLV", 50.0)
                .with("CHURN_RISK", 20.0)]);

        let overview = revenue_overview(&executor, &DateRange::unbounded()).expect("overview");

        assert_eq!(overview.avg_aov, 30.0);
        assert_eq!(overview.avg_clv, 150.0);
        assert_eq!(overview.churn_risk, 20.0);
        assert!(executor.calls.borrow()[1].1.is_empty());
    }

    #[test]
    fn customer_type_shares_split_repeat_and_one_time() {
        let executor = ScriptedExecutor::new().respond(vec![MetricRow::new()
            .with("NEW_CUSTOMERS", 10_i64)
            .with("REPEAT_CUSTOMERS", 1_i64)
            .with("ONE_TIME_CUSTOMERS", 3_i64)]);

        let types = customer_types(&executor, &DateRange::unbounded()).expect("types");
        assert_eq!(types.repeat_percentage, 25.0);
        assert_eq!(types.one_time_percentage, 75.0);

        let empty = customer_types(&ScriptedExecutor::new(), &DateRange::unbounded())
            .expect("empty types");
        assert_eq!(empty.repeat_percentage, 0.0);
    }

    #[test]
    fn churn_levels_follow_risk_order_and_unknowns_sort_last() {
        let executor = ScriptedExecutor::new().respond(vec![
            MetricRow::new().with("LABEL", "High Risk").with("CUSTOMER_COUNT", 1_i64),
            MetricRow::new().with("LABEL", "Healthy").with("CUSTOMER_COUNT", 4_i64),
            MetricRow::new().with("LABEL", SqlValue::Null).with("CUSTOMER_COUNT", 1_i64),
            MetricRow::new().with("LABEL", "Low Risk").with("CUSTOMER_COUNT", 2_i64),
        ]);

        let levels = churn_distribution(&executor, &DateRange::unbounded()).expect("churn");

        let names: Vec<&str> = levels.iter().map(|level| level.name.as_str()).collect();
        assert_eq!(names, vec!["Low Risk", "Healthy", "High Risk", "Unknown"]);
        assert_eq!(levels[1].percentage, 50.0);
        assert!(!executor.sql(0).contains("JOIN"));
    }

    #[test]
    fn bounded_segment_counts_join_orders_in_range() {
        let executor = ScriptedExecutor::new().respond(vec![
            MetricRow::new().with("LABEL", "Silver").with("CUSTOMER_COUNT", 2_i64),
            MetricRow::new().with("LABEL", "Gold").with("CUSTOMER_COUNT", 5_i64),
        ]);
        let range = DateRange::new(Some(date!(2024 - 01 - 01)), None);

        let segments = customer_segments(&executor, &range).expect("segments");

        assert_eq!(segments[0].name, "Gold");
        assert!(executor.sql(0).contains("JOIN fct_order_details o"));
        assert!(executor.sql(0).contains("o.order_date >= CAST($date_from AS DATE)"));
    }

    #[test]
    fn cohort_retention_scans_full_history_and_selects_cohorts_by_range() {
        let executor = ScriptedExecutor::new().respond(vec![
            MetricRow::new().with("CUSTOMER_ID", "a").with("ORDER_MONTH", "2023-12-01"),
            MetricRow::new().with("CUSTOMER_ID", "a").with("ORDER_MONTH", "2024-01-01"),
            MetricRow::new().with("CUSTOMER_ID", "b").with("ORDER_MONTH", "2024-01-01"),
            MetricRow::new().with("CUSTOMER_ID", "b").with("ORDER_MONTH", "2024-02-01"),
        ]);
        let range = DateRange::new(Some(date!(2024 - 01 - 01)), Some(date!(2024 - 01 - 31)));

        let report = cohort_retention(&executor, &range, 12).expect("cohorts");

        // Customer "a" belongs to December even though January is in range.
        assert_eq!(report.cohorts.len(), 1);
        assert_eq!(report.cohorts[0].cohort_month, YearMonth::new(2024, 1).expect("month"));
        assert_eq!(report.cohorts[0].initial_size, 1);
        assert_eq!(report.periods[1].months_since, 1);
        assert_eq!(report.periods[1].retention_rate, 100.0);
        assert!(executor.calls.borrow()[0].1.is_empty());
    }

    #[test]
    fn cohort_scan_skips_null_customers_and_rejects_any_that_slip_through() {
        let executor = ScriptedExecutor::new().respond(vec![
            MetricRow::new().with("CUSTOMER_ID", "a").with("ORDER_MONTH", "2024-01-01"),
            MetricRow::new()
                .with("CUSTOMER_ID", SqlValue::Null)
                .with("ORDER_MONTH", "2024-01-01"),
        ]);

        let error = cohort_retention(&executor, &DateRange::unbounded(), 12)
            .expect_err("null customer id");

        assert!(matches!(
            error,
            AnalyticsError::Mapping(MappingError { ref column, .. }) if column == "customer_id"
        ));
        assert!(executor.sql(0).contains("o.person_id IS NOT NULL"));
    }

    #[test]
    fn clv_breakdown_without_people_is_zeros() {
        let breakdown = clv_breakdown(&ScriptedExecutor::new()).expect("breakdown");
        assert_eq!(breakdown.total_clv, 0.0);
    }
}
