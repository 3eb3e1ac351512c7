//! Cross-platform performance: every ad platform in one view, plus the
//! on-site funnel and first-touch attribution.

use adlens_warehouse::{MetricRow, QueryExecutor};
use serde::Serialize;

use crate::derive::{
    share_of_total, DerivationRule, CONVERSION_RATE, COST_PER_CONVERSION, CPC, CTR, ROAS,
};
use crate::error::{AnalyticsError, MappingError};
use crate::mapper::RowMapper;
use crate::predicate::PredicateBuilder;
use crate::range::DateRange;

use super::{fetch, first_or_empty, shares, Share};

const PERFORMANCE_DAY: PredicateBuilder = PredicateBuilder::on("f.date_day");
const ITEM_DAY: PredicateBuilder = PredicateBuilder::on("e.date_day");
const TOUCH_DAY: PredicateBuilder = PredicateBuilder::on("t.date_day");

const VIEW_TO_CART: DerivationRule =
    DerivationRule::rate("view_to_cart_rate", "add_to_cart", "views");
const CART_TO_PURCHASE: DerivationRule =
    DerivationRule::rate("cart_to_purchase_rate", "purchase", "add_to_cart");
const OVERALL_CONVERSION: DerivationRule =
    DerivationRule::rate("overall_conversion_rate", "purchase", "views");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceOverview {
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub conversion_rate: f64,
    pub cost_per_conversion: f64,
    pub revenue: f64,
    pub roas: f64,
    pub ctr: f64,
    pub cpc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformRoas {
    pub platform: String,
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSpend {
    pub platforms: Vec<Share>,
    pub total_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EcommerceFunnel {
    pub views: i64,
    pub add_to_cart: i64,
    pub purchase: i64,
    pub view_to_cart_rate: f64,
    pub cart_to_purchase_rate: f64,
    pub overall_conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelConversions {
    pub channel: String,
    pub conversions: i64,
    pub revenue: f64,
    pub percentage: f64,
}

/// Platform key with the Meta aliases folded together, so each display
/// name is grouped once.
const PLATFORM_KEY: &str =
    "CASE WHEN f.platform IN ('meta_ads', 'meta') THEN 'meta_ads' ELSE f.platform END";

/// Human-readable name for a warehouse platform key.
pub fn platform_display_name(platform: &str) -> String {
    match platform {
        "google_ads" => String::from("Google Ads"),
        "meta_ads" | "meta" => String::from("Meta Ads"),
        other => other.to_string(),
    }
}

/// Totals across every platform. No rows means zeros, not an error.
pub fn overview(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<PerformanceOverview, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;

    let sql = format!(
        "SELECT SUM(f.spend) AS SPEND, SUM(f.impressions) AS IMPRESSIONS, \
                SUM(f.clicks) AS CLICKS, SUM(f.conversions) AS CONVERSIONS, \
                SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f{}",
        predicate.where_clause()
    );
    let row = first_or_empty(fetch(
        executor,
        "performance_overview",
        &sql,
        predicate.params(),
    )?);

    let m = RowMapper::new(&row);
    Ok(PerformanceOverview {
        spend: m.float("spend")?,
        impressions: m.int("impressions")?,
        clicks: m.int("clicks")?,
        conversions: m.float("conversions")?,
        conversion_rate: CONVERSION_RATE.value(&row)?,
        cost_per_conversion: COST_PER_CONVERSION.value(&row)?,
        revenue: m.float("conversion_value")?,
        roas: ROAS.value(&row)?,
        ctr: CTR.value(&row)?,
        cpc: CPC.value(&row)?,
    })
}

/// ROAS per platform, best first. Ties go to the platform name.
pub fn roas_by_platform(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<Vec<PlatformRoas>, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;

    let sql = format!(
        "SELECT {PLATFORM_KEY} AS PLATFORM, SUM(f.spend) AS SPEND, \
                SUM(f.conversion_value) AS CONVERSION_VALUE \
         FROM fct_campaign_performance f{} \
         GROUP BY 1",
        predicate.where_clause()
    );

    let mut platforms = fetch(executor, "roas_by_platform", &sql, predicate.params())?
        .iter()
        .map(map_platform_roas)
        .collect::<Result<Vec<_>, MappingError>>()?;

    // ROAS is derived here, so the ordering is too.
    platforms.sort_by(|left, right| {
        right
            .roas
            .total_cmp(&left.roas)
            .then_with(|| left.platform.cmp(&right.platform))
    });
    Ok(platforms)
}

pub fn spend_by_platform(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<PlatformSpend, AnalyticsError> {
    let predicate = PERFORMANCE_DAY.build(range)?;

    let sql = format!(
        "SELECT {PLATFORM_KEY} AS PLATFORM, SUM(f.spend) AS SPEND \
         FROM fct_campaign_performance f{} \
         GROUP BY 1 \
         ORDER BY SUM(f.spend) DESC NULLS LAST, 1 ASC",
        predicate.where_clause()
    );

    let labelled = fetch(executor, "spend_by_platform", &sql, predicate.params())?
        .iter()
        .map(|row| -> Result<(String, f64), MappingError> {
            let m = RowMapper::new(row);
            let platform = m.text_or("platform", "Unknown")?;
            Ok((platform_display_name(&platform), m.float("spend")?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_spend = labelled.iter().map(|(_, spend)| spend).sum();
    Ok(PlatformSpend {
        platforms: shares(labelled),
        total_spend,
    })
}

/// View, cart and purchase counts with the step rates between them.
pub fn ecommerce_funnel(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<EcommerceFunnel, AnalyticsError> {
    let predicate = ITEM_DAY.build(range)?;

    let sql = format!(
        "SELECT SUM(e.items_viewed) AS VIEWS, SUM(e.items_added_to_cart) AS ADD_TO_CART, \
                SUM(e.items_purchased) AS PURCHASE \
         FROM fct_ecommerce_item e{}",
        predicate.where_clause()
    );
    let row = first_or_empty(fetch(
        executor,
        "ecommerce_funnel",
        &sql,
        predicate.params(),
    )?);

    let m = RowMapper::new(&row);
    Ok(EcommerceFunnel {
        views: m.int("views")?,
        add_to_cart: m.int("add_to_cart")?,
        purchase: m.int("purchase")?,
        view_to_cart_rate: VIEW_TO_CART.value(&row)?,
        cart_to_purchase_rate: CART_TO_PURCHASE.value(&row)?,
        overall_conversion_rate: OVERALL_CONVERSION.value(&row)?,
    })
}

/// First-touch conversions per channel, most conversions first.
pub fn conversions_by_channel(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<Vec<ChannelConversions>, AnalyticsError> {
    let predicate = TOUCH_DAY.build(range)?;

    let sql = format!(
        "SELECT t.channel_grouping AS CHANNEL, SUM(t.conversions) AS CONVERSIONS, \
                SUM(t.revenue) AS REVENUE \
         FROM fct_ga4_first_touch t{} \
         GROUP BY t.channel_grouping \
         ORDER BY SUM(t.conversions) DESC NULLS LAST, t.channel_grouping ASC",
        predicate.where_clause()
    );

    let mut channels = fetch(executor, "conversions_by_channel", &sql, predicate.params())?
        .iter()
        .map(map_channel)
        .collect::<Result<Vec<_>, MappingError>>()?;

    let conversions: Vec<f64> = channels
        .iter()
        .map(|channel| channel.conversions as f64)
        .collect();
    for (channel, percentage) in channels.iter_mut().zip(share_of_total(&conversions)) {
        channel.percentage = percentage;
    }
    Ok(channels)
}

fn map_platform_roas(row: &MetricRow) -> Result<PlatformRoas, MappingError> {
    let platform = RowMapper::new(row).text_or("platform", "Unknown")?;
    Ok(PlatformRoas {
        platform: platform_display_name(&platform),
        roas: ROAS.value(row)?,
    })
}

fn map_channel(row: &MetricRow) -> Result<ChannelConversions, MappingError> {
    let m = RowMapper::new(row);
    Ok(ChannelConversions {
        channel: m.text_or("channel", "Unknown")?,
        conversions: m.int("conversions")?,
        revenue: m.float("revenue")?,
        percentage: 0.0,
    })
}
