use adlens_warehouse::{MetricRow, QueryExecutor, QueryParams};
use serde::Serialize;
use time::Date;

use crate::derive::{CPC, CPM, CTR, ROAS};
use crate::error::{AnalyticsError, MappingError};
use crate::mapper::RowMapper;
use crate::predicate::PredicateBuilder;
use crate::range::DateRange;

use super::{fetch, first_or_empty, require_row};

const PERFORMANCE_DAY: PredicateBuilder = PredicateBuilder::on("f.date_day");
const DELIVERY_DAY: PredicateBuilder = PredicateBuilder::on("d.date_day");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaOverview {
    pub spend: f64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPerformance {
    pub date: Date,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: Option<String>,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub revenue: f64,
    pub roas: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignList {
    pub campaigns: Vec<CampaignSummary>,
    pub total_count: usize,
}

/// Account-level totals. Reach comes from the delivery table.
pub fn overview(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<MetaOverview, AnalyticsError> {
    let performance = PERFORMANCE_DAY.build(range)?;
    let delivery = DELIVERY_DAY.build(range)?;

    let sql = format!(
        "SELECT SUM(f.spend) AS SPEND, SUM(f.impressions) AS IMPRESSIONS, \
                SUM(f.clicks) AS CLICKS, SUM(f.conversions) AS CONVERSIONS, \
                SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f \
         WHERE f.platform = 'meta_ads'{} \
         HAVING COUNT(*) > 0",
        performance.and_clause()
    );
    let row = require_row(
        fetch(executor, "meta_ads_overview", &sql, performance.params())?,
        "meta_ads_overview",
        range,
    )?;

    let reach_sql = format!(
        "SELECT SUM(d.reach) AS REACH \
         FROM fct_meta_delivery d \
         WHERE d.platform = 'meta_ads'{}",
        delivery.and_clause()
    );
    let reach_row = first_or_empty(fetch(
        executor,
        "meta_ads_reach",
        &reach_sql,
        delivery.params(),
    )?);

    let m = RowMapper::new(&row);
    Ok(MetaOverview {
        spend: m.float("spend")?,
        impressions: m.int("impressions")?,
        reach: RowMapper::new(&reach_row).int("reach")?,
        clicks: m.int("clicks")?,
        conversions: m.float("conversions")?,
        revenue: m.float("conversion_value")?,
        ctr: CTR.value(&row)?,
        cpc: CPC.value(&row)?,
        cpm: CPM.value(&row)?,
        roas: ROAS.value(&row)?,
    })
}

/// One row per day, oldest first, optionally for a single campaign.
pub fn daily_performance(
    executor: &dyn QueryExecutor,
    range: &DateRange,
    campaign_id: Option<&str>,
) -> Result<Vec<DailyPerformance>, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;
    let mut params = predicate.params().clone();
    let campaign_filter = match campaign_id {
        Some(campaign_id) => {
            params.insert("campaign_id", campaign_id);
            " AND f.campaign_id = $campaign_id"
        }
        None => "",
    };

    let sql = format!(
        "SELECT CAST(f.date_day AS VARCHAR) AS DATE_DAY, SUM(f.spend) AS SPEND, \
                SUM(f.impressions) AS IMPRESSIONS, SUM(f.clicks) AS CLICKS, \
                SUM(f.conversions) AS CONVERSIONS, SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f \
         WHERE f.platform = 'meta_ads'{}{campaign_filter} \
         GROUP BY f.date_day \
         ORDER BY f.date_day ASC",
        predicate.and_clause()
    );

    let days = fetch(executor, "meta_ads_daily_performance", &sql, &params)?
        .iter()
        .map(map_day)
        .collect::<Result<Vec<_>, MappingError>>()?;
    Ok(days)
}

/// Campaign totals, highest spend first, optionally for one status.
pub fn campaigns(
    executor: &dyn QueryExecutor,
    range: &DateRange,
    status: Option<&str>,
) -> Result<CampaignList, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;
    let mut params: QueryParams = predicate.params().clone();
    let status_filter = match status {
        Some(status) => {
            params.insert("status", status);
            " AND UPPER(f.status) = UPPER($status)"
        }
        None => "",
    };

    let sql = format!(
        "SELECT f.campaign_id AS CAMPAIGN_ID, MAX(f.campaign_name) AS CAMPAIGN_NAME, \
                MAX(f.status) AS STATUS, SUM(f.spend) AS SPEND, \
                SUM(f.impressions) AS IMPRESSIONS, SUM(f.clicks) AS CLICKS, \
                SUM(f.conversions) AS CONVERSIONS, SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f \
         WHERE f.platform = 'meta_ads'{}{status_filter} \
         GROUP BY f.campaign_id \
         ORDER BY SUM(f.spend) DESC NULLS LAST, f.campaign_id ASC",
        predicate.and_clause()
    );

    let campaigns = fetch(executor, "meta_ads_campaigns", &sql, &params)?
        .iter()
        .map(map_campaign)
        .collect::<Result<Vec<_>, MappingError>>()?;

    Ok(CampaignList {
        total_count: campaigns.len(),
        campaigns,
    })
}

fn map_day(row: &MetricRow) -> Result<DailyPerformance, MappingError> {
    let m = RowMapper::new(row);
    Ok(DailyPerformance {
        date: m.date("date_day")?,
        spend: m.float("spend")?,
        impressions: m.int("impressions")?,
        clicks: m.int("clicks")?,
        conversions: m.float("conversions")?,
        revenue: m.float("conversion_value")?,
        ctr: CTR.value(row)?,
        cpc: CPC.value(row)?,
    })
}

fn map_campaign(row: &MetricRow) -> Result<CampaignSummary, MappingError> {
    let m = RowMapper::new(row);
    Ok(CampaignSummary {
        campaign_id: m.text_or("campaign_id", "")?,
        campaign_name: m.text_or("campaign_name", "")?,
        status: m.optional_text("status")?,
        spend: m.float("spend")?,
        impressions: m.int("impressions")?,
        clicks: m.int("clicks")?,
        conversions: m.float("conversions")?,
        revenue: m.float("conversion_value")?,
        roas: ROAS.value(row)?,
        ctr: CTR.value(row)?,
        cpc: CPC.value(row)?,
        cpm: CPM.value(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::testing::ScriptedExecutor;
    use adlens_warehouse::SqlValue;
    use time::macros::date;

    fn january() -> DateRange {
        DateRange::new(Some(date!(2024 - 01 - 01)), Some(date!(2024 - 01 - 31)))
    }

    #[test]
    fn overview_derives_unit_economics_from_raw_totals() {
        let executor = ScriptedExecutor::new()
            .respond(vec![MetricRow::new()
                .with("SPEND", 200.0)
                .with("IMPRESSIONS", 1000_i64)
                .with("CLICKS", 50_i64)
                .with("CONVERSIONS", 6.0)
                .with("CONVERSION_VALUE", 600.0)])
            .respond(vec![MetricRow::new().with("REACH", 750_i64)]);

        let overview = overview(&executor, &january()).expect("overview");

        assert_eq!(overview.ctr, 5.0);
        assert_eq!(overview.cpc, 4.0);
        assert_eq!(overview.roas, 3.0);
        assert_eq!(overview.cpm, 200.0);
        assert_eq!(overview.reach, 750);
        assert!(executor.sql(0).contains("f.date_day >= CAST($date_from AS DATE)"));
        assert!(executor.sql(1).contains("d.date_day <= CAST($date_to AS DATE)"));
    }

    #[test]
    fn overview_without_rows_is_no_data() {
        let executor = ScriptedExecutor::new().respond(Vec::new());

        let error = overview(&executor, &january()).expect_err("no data");

        assert!(matches!(
            error,
            AnalyticsError::NoData { family: "meta_ads_overview", .. }
        ));
        assert_eq!(executor.call_count(), 1);
    }

    #[test]
    fn daily_performance_binds_campaign_filter() {
        let executor = ScriptedExecutor::new().respond(vec![MetricRow::new()
            .with("DATE_DAY", "2024-01-02")
            .with("SPEND", 10.0)
            .with("IMPRESSIONS", 0_i64)
            .with("CLICKS", 0_i64)
            .with("CONVERSIONS", SqlValue::Null)
            .with("CONVERSION_VALUE", SqlValue::Null)]);

        let days = daily_performance(&executor, &DateRange::unbounded(), Some("c-9"))
            .expect("daily performance");

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, date!(2024 - 01 - 02));
        assert_eq!(days[0].ctr, 0.0);
        assert_eq!(days[0].cpc, 0.0);
        let calls = executor.calls.borrow();
        assert!(calls[0].0.contains("f.campaign_id = $campaign_id"));
        assert_eq!(
            calls[0].1.get("campaign_id"),
            Some(&SqlValue::Text("c-9".to_string()))
        );
    }

    #[test]
    fn campaigns_report_total_count_and_tolerate_empty_results() {
        let executor = ScriptedExecutor::new().respond(Vec::new());
        let list = campaigns(&executor, &january(), Some("ACTIVE")).expect("campaigns");

        assert!(list.campaigns.is_empty());
        assert_eq!(list.total_count, 0);
    }
}
