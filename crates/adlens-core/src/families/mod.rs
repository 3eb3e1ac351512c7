//! Metric families.
//!
//! Each family is a free function over `&dyn QueryExecutor`. Families build
//! their predicates before issuing any SQL, so a reversed range never reaches
//! the warehouse.

pub mod customers;
pub mod ga4;
pub mod google_ads;
pub mod meta_ads;
pub mod performance;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use adlens_warehouse::{MetricRow, QueryExecutor, QueryParams};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::derive::share_of_total;
use crate::error::AnalyticsError;
use crate::range::DateRange;

/// Default number of cohorts returned by cohort retention.
pub const DEFAULT_COHORT_LIMIT: usize = 12;

/// A labelled value and its share of the group total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub name: String,
    pub value: f64,
    pub percentage: f64,
}

/// A labelled count and its share of the group total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountShare {
    pub name: String,
    pub count: i64,
    pub percentage: f64,
}

pub(crate) fn shares(labelled: Vec<(String, f64)>) -> Vec<Share> {
    let values: Vec<f64> = labelled.iter().map(|(_, value)| *value).collect();
    labelled
        .into_iter()
        .zip(share_of_total(&values))
        .map(|((name, value), percentage)| Share {
            name,
            value,
            percentage,
        })
        .collect()
}

pub(crate) fn count_shares(labelled: Vec<(String, i64)>) -> Vec<CountShare> {
    let values: Vec<f64> = labelled.iter().map(|(_, count)| *count as f64).collect();
    labelled
        .into_iter()
        .zip(share_of_total(&values))
        .map(|((name, count), percentage)| CountShare {
            name,
            count,
            percentage,
        })
        .collect()
}

/// Run one family query and log its row count.
pub(crate) fn fetch(
    executor: &dyn QueryExecutor,
    family: &'static str,
    sql: &str,
    params: &QueryParams,
) -> Result<Vec<MetricRow>, AnalyticsError> {
    let rows = executor.execute(sql, params)?;
    debug!(family, rows = rows.len(), "metric query returned");
    Ok(rows)
}

/// The single row of an overview that requires data.
pub(crate) fn require_row(
    rows: Vec<MetricRow>,
    family: &'static str,
    range: &DateRange,
) -> Result<MetricRow, AnalyticsError> {
    rows.into_iter().next().ok_or(AnalyticsError::NoData {
        family,
        range: *range,
    })
}

/// The single row of an aggregate whose empty result means all zeros.
pub(crate) fn first_or_empty(rows: Vec<MetricRow>) -> MetricRow {
    rows.into_iter().next().unwrap_or_default()
}

/// Every family exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    MetaAdsOverview,
    MetaAdsDailyPerformance,
    MetaAdsCampaigns,
    GoogleAdsOverview,
    GoogleAdsSpendByCampaignType,
    Ga4Overview,
    Ga4TrafficSources,
    Ga4TechnologyBreakdown,
    PerformanceOverview,
    RoasByPlatform,
    SpendByPlatform,
    EcommerceFunnel,
    ConversionsByChannel,
    RevenueOverview,
    CacMetrics,
    CustomerTypes,
    RetentionMetrics,
    ChurnDistribution,
    CustomerSegments,
    ClvBreakdown,
    CohortRetention,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 21] = [
        Self::MetaAdsOverview,
        Self::MetaAdsDailyPerformance,
        Self::MetaAdsCampaigns,
        Self::GoogleAdsOverview,
        Self::GoogleAdsSpendByCampaignType,
        Self::Ga4Overview,
        Self::Ga4TrafficSources,
        Self::Ga4TechnologyBreakdown,
        Self::PerformanceOverview,
        Self::RoasByPlatform,
        Self::SpendByPlatform,
        Self::EcommerceFunnel,
        Self::ConversionsByChannel,
        Self::RevenueOverview,
        Self::CacMetrics,
        Self::CustomerTypes,
        Self::RetentionMetrics,
        Self::ChurnDistribution,
        Self::CustomerSegments,
        Self::ClvBreakdown,
        Self::CohortRetention,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MetaAdsOverview => "meta-ads-overview",
            Self::MetaAdsDailyPerformance => "meta-ads-daily",
            Self::MetaAdsCampaigns => "meta-ads-campaigns",
            Self::GoogleAdsOverview => "google-ads-overview",
            Self::GoogleAdsSpendByCampaignType => "google-ads-spend-by-type",
            Self::Ga4Overview => "ga4-overview",
            Self::Ga4TrafficSources => "ga4-traffic-sources",
            Self::Ga4TechnologyBreakdown => "ga4-technology",
            Self::PerformanceOverview => "performance-overview",
            Self::RoasByPlatform => "roas-by-platform",
            Self::SpendByPlatform => "spend-by-platform",
            Self::EcommerceFunnel => "ecommerce-funnel",
            Self::ConversionsByChannel => "conversions-by-channel",
            Self::RevenueOverview => "revenue-overview",
            Self::CacMetrics => "cac-metrics",
            Self::CustomerTypes => "customer-types",
            Self::RetentionMetrics => "retention-metrics",
            Self::ChurnDistribution => "churn-distribution",
            Self::CustomerSegments => "customer-segments",
            Self::ClvBreakdown => "clv-breakdown",
            Self::CohortRetention => "cohort-retention",
        }
    }

    /// Run the family and serialize its result.
    ///
    /// The range is validated before any query, including for families
    /// that do not filter by date.
    pub fn run(
        self,
        executor: &dyn QueryExecutor,
        request: &MetricRequest,
    ) -> Result<Value, AnalyticsError> {
        let range = &request.range;
        range.validate()?;
        let value = match self {
            Self::MetaAdsOverview => serde_json::to_value(meta_ads::overview(executor, range)?),
            Self::MetaAdsDailyPerformance => serde_json::to_value(meta_ads::daily_performance(
                executor,
                range,
                request.campaign_id.as_deref(),
            )?),
            Self::MetaAdsCampaigns => serde_json::to_value(meta_ads::campaigns(
                executor,
                range,
                request.status.as_deref(),
            )?),
            Self::GoogleAdsOverview => serde_json::to_value(google_ads::overview(executor, range)?),
            Self::GoogleAdsSpendByCampaignType => {
                serde_json::to_value(google_ads::spend_by_campaign_type(executor, range)?)
            }
            Self::Ga4Overview => serde_json::to_value(ga4::overview(executor, range)?),
            Self::Ga4TrafficSources => serde_json::to_value(ga4::traffic_sources(executor, range)?),
            Self::Ga4TechnologyBreakdown => {
                serde_json::to_value(ga4::technology_breakdown(executor, range)?)
            }
            Self::PerformanceOverview => {
                serde_json::to_value(performance::overview(executor, range)?)
            }
            Self::RoasByPlatform => {
                serde_json::to_value(performance::roas_by_platform(executor, range)?)
            }
            Self::SpendByPlatform => {
                serde_json::to_value(performance::spend_by_platform(executor, range)?)
            }
            Self::EcommerceFunnel => {
                serde_json::to_value(performance::ecommerce_funnel(executor, range)?)
            }
            Self::ConversionsByChannel => {
                serde_json::to_value(performance::conversions_by_channel(executor, range)?)
            }
            Self::RevenueOverview => {
                serde_json::to_value(customers::revenue_overview(executor, range)?)
            }
            Self::CacMetrics => serde_json::to_value(customers::cac_metrics(executor, range)?),
            Self::CustomerTypes => serde_json::to_value(customers::customer_types(executor, range)?),
            Self::RetentionMetrics => {
                serde_json::to_value(customers::retention_metrics(executor, range)?)
            }
            Self::ChurnDistribution => {
                serde_json::to_value(customers::churn_distribution(executor, range)?)
            }
            Self::CustomerSegments => {
                serde_json::to_value(customers::customer_segments(executor, range)?)
            }
            Self::ClvBreakdown => serde_json::to_value(customers::clv_breakdown(executor)?),
            Self::CohortRetention => serde_json::to_value(customers::cohort_retention(
                executor,
                range,
                request.limit.unwrap_or(DEFAULT_COHORT_LIMIT),
            )?),
        };
        Ok(value?)
    }
}

impl Display for MetricFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown metric family '{0}'")]
pub struct UnknownFamily(pub String);

impl FromStr for MetricFamily {
    type Err = UnknownFamily;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let wanted = input.trim().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnknownFamily(input.to_string()))
    }
}

/// Inputs shared by every family; each family reads only what it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricRequest {
    pub range: DateRange,
    /// Cohort count for cohort retention.
    pub limit: Option<usize>,
    /// Meta daily performance: a single campaign.
    pub campaign_id: Option<String>,
    /// Meta campaigns: a single delivery status.
    pub status: Option<String>,
}

impl MetricRequest {
    #[must_use]
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }
}

/// Test doubles shared by the family modules.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use adlens_warehouse::{MetricRow, QueryExecutor, QueryParams, WarehouseError};

    /// Replays canned result sets in order and records every call.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        responses: RefCell<VecDeque<Vec<MetricRow>>>,
        pub calls: RefCell<Vec<(String, QueryParams)>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, rows: Vec<MetricRow>) -> Self {
            self.responses.borrow_mut().push_back(rows);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        pub fn sql(&self, index: usize) -> String {
            self.calls.borrow()[index].0.clone()
        }
    }

    impl QueryExecutor for ScriptedExecutor {
        fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<MetricRow>, WarehouseError> {
            self.calls
                .borrow_mut()
                .push((sql.to_string(), params.clone()));
            Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
        }
    }
}
