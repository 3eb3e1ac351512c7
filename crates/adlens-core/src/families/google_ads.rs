use adlens_warehouse::{QueryExecutor, QueryParams};
use serde::Serialize;

use crate::derive::{CPC, CTR, ROAS};
use crate::error::{AnalyticsError, MappingError};
use crate::mapper::RowMapper;
use crate::predicate::PredicateBuilder;
use crate::range::DateRange;

use super::{fetch, first_or_empty, require_row, shares, Share};

const PERFORMANCE_DAY: PredicateBuilder = PredicateBuilder::on("f.date_day");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoogleAdsOverview {
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub revenue: f64,
    pub roas: f64,
    pub ctr: f64,
    pub cpc: f64,
    /// Average over current keywords; absent when none are scored.
    pub avg_quality_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignTypeSpend {
    pub campaign_types: Vec<Share>,
    pub total: f64,
}

pub fn overview(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<GoogleAdsOverview, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;

    let sql = format!(
        "SELECT SUM(f.spend) AS SPEND, SUM(f.impressions) AS IMPRESSIONS, \
                SUM(f.clicks) AS CLICKS, SUM(f.conversions) AS CONVERSIONS, \
                SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f \
         WHERE f.platform = 'google_ads'{} \
         HAVING COUNT(*) > 0",
        predicate.and_clause()
    );
    let row = require_row(
        fetch(executor, "google_ads_overview", &sql, predicate.params())?,
        "google_ads_overview",
        range,
    )?;

    // Keyword quality is a current snapshot and ignores the date range.
    let quality = first_or_empty(fetch(
        executor,
        "google_ads_quality_score",
        "SELECT AVG(k.quality_score) AS AVG_QUALITY_SCORE \
         FROM dim_keyword k \
         WHERE k.platform = 'google_ads' AND k.is_current",
        &QueryParams::new(),
    )?);

    let m = RowMapper::new(&row);
    Ok(GoogleAdsOverview {
        spend: m.float("spend")?,
        impressions: m.int("impressions")?,
        clicks: m.int("clicks")?,
        conversions: m.float("conversions")?,
        revenue: m.float("conversion_value")?,
        roas: ROAS.value(&row)?,
        ctr: CTR.value(&row)?,
        cpc: CPC.value(&row)?,
        avg_quality_score: RowMapper::new(&quality).optional_float("avg_quality_score")?,
    })
}

/// Spend per campaign type with its share of total spend, highest first.
pub fn spend_by_campaign_type(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<CampaignTypeSpend, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;

    let sql = format!(
        "SELECT f.campaign_type AS CAMPAIGN_TYPE, SUM(f.spend) AS SPEND \
         FROM fct_campaign_performance f \
         WHERE f.platform = 'google_ads'{} \
         GROUP BY f.campaign_type \
         ORDER BY SUM(f.spend) DESC NULLS LAST, f.campaign_type ASC",
        predicate.and_clause()
    );

    let labelled = fetch(executor, "google_ads_spend_by_campaign_type", &sql, predicate.params())?
        .iter()
        .map(|row| -> Result<(String, f64), MappingError> {
            let m = RowMapper::new(row);
            Ok((m.text_or("campaign_type", "Unknown")?, m.float("spend")?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = labelled.iter().map(|(_, spend)| spend).sum();
    Ok(CampaignTypeSpend {
        campaign_types: shares(labelled),
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::testing::ScriptedExecutor;
    use adlens_warehouse::{MetricRow, SqlValue};

    #[test]
    fn quality_score_is_optional() {
        let executor = ScriptedExecutor::new()
            .respond(vec![MetricRow::new()
                .with("SPEND", 0.0)
                .with("IMPRESSIONS", 0_i64)
                .with("CLICKS", 0_i64)
                .with("CONVERSIONS", 0.0)
                .with("CONVERSION_VALUE", 0.0)])
            .respond(vec![MetricRow::new().with("AVG_QUALITY_SCORE", SqlValue::Null)]);

        let overview = overview(&executor, &DateRange::unbounded()).expect("overview");

        assert_eq!(overview.avg_quality_score, None);
        assert_eq!(overview.roas, 0.0);
        assert_eq!(overview.cpc, 0.0);
    }

    #[test]
    fn campaign_type_shares_cover_all_spend() {
        let executor = ScriptedExecutor::new().respond(vec![
            MetricRow::new().with("CAMPAIGN_TYPE", "SEARCH").with("SPEND", 300.0),
            MetricRow::new().with("CAMPAIGN_TYPE", "PERFORMANCE_MAX").with("SPEND", 100.0),
            MetricRow::new()
                .with("CAMPAIGN_TYPE", SqlValue::Null)
                .with("SPEND", 100.0),
        ]);

        let breakdown =
            spend_by_campaign_type(&executor, &DateRange::unbounded()).expect("breakdown");

        assert_eq!(breakdown.total, 500.0);
        let names: Vec<&str> = breakdown
            .campaign_types
            .iter()
            .map(|share| share.name.as_str())
            .collect();
        assert_eq!(names, vec!["SEARCH", "PERFORMANCE_MAX", "Unknown"]);
        assert_eq!(breakdown.campaign_types[0].percentage, 60.0);
    }

    #[test]
    fn empty_campaign_type_breakdown_has_zero_total() {
        let executor = ScriptedExecutor::new();
        let breakdown =
            spend_by_campaign_type(&executor, &DateRange::unbounded()).expect("breakdown");

        assert!(breakdown.campaign_types.is_empty());
        assert_eq!(breakdown.total, 0.0);
    }
}
