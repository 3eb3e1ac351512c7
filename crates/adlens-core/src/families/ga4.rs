use adlens_warehouse::{MetricRow, QueryExecutor};
use serde::Serialize;

use crate::derive::{share_of_total, AVG_CONVERSION_VALUE, ENGAGEMENT_RATE, SESSIONS_PER_USER};
use crate::error::{AnalyticsError, MappingError};
use crate::mapper::RowMapper;
use crate::predicate::{Predicate, PredicateBuilder};
use crate::range::DateRange;

use super::{fetch, require_row, shares, Share};

const TRAFFIC_DAY: PredicateBuilder = PredicateBuilder::on("t.date_day");
const DEVICE_DAY: PredicateBuilder = PredicateBuilder::on("d.date_day");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ga4Overview {
    pub sessions: i64,
    pub users: i64,
    pub engaged_sessions: i64,
    pub engagement_rate: f64,
    pub sessions_per_user: f64,
    pub conversions: f64,
    pub revenue: f64,
    /// Revenue per conversion; absent without conversions.
    pub conversion_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSource {
    pub source: String,
    pub sessions: i64,
    pub users: i64,
    pub revenue: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSources {
    pub sources: Vec<TrafficSource>,
    pub total: usize,
}

/// Users split three ways, each list with shares of its own total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyBreakdown {
    pub sources: Vec<Share>,
    pub devices: Vec<Share>,
    pub browsers: Vec<Share>,
}

pub fn overview(executor: &dyn QueryExecutor, range: &DateRange) -> Result<Ga4Overview, AnalyticsError> {
    let predicate = TRAFFIC_DAY.build(range)?;

    let sql = format!(
        "SELECT SUM(t.sessions) AS SESSIONS, SUM(t.total_users) AS USERS, \
                SUM(t.engaged_sessions) AS ENGAGED_SESSIONS, \
                SUM(t.conversions) AS CONVERSIONS, SUM(t.revenue) AS REVENUE \
         FROM fct_ga4_traffic t{} \
         HAVING COUNT(*) > 0",
        predicate.where_clause()
    );
    let row = require_row(
        fetch(executor, "ga4_overview", &sql, predicate.params())?,
        "ga4_overview",
        range,
    )?;

    let m = RowMapper::new(&row);
    Ok(Ga4Overview {
        sessions: m.int("sessions")?,
        users: m.int("users")?,
        engaged_sessions: m.int("engaged_sessions")?,
        engagement_rate: ENGAGEMENT_RATE.value(&row)?,
        sessions_per_user: SESSIONS_PER_USER.value(&row)?,
        conversions: m.float("conversions")?,
        revenue: m.float("revenue")?,
        conversion_value: AVG_CONVERSION_VALUE.apply(&row)?,
    })
}

/// Sessions by source, busiest first. An empty range is an empty list.
pub fn traffic_sources(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<TrafficSources, AnalyticsError> {
    let predicate = TRAFFIC_DAY.build(range)?;

    let sql = format!(
        "SELECT t.source AS SOURCE, SUM(t.sessions) AS SESSIONS, \
                SUM(t.total_users) AS USERS, SUM(t.revenue) AS REVENUE \
         FROM fct_ga4_traffic t{} \
         GROUP BY t.source \
         ORDER BY SUM(t.sessions) DESC NULLS LAST, t.source ASC",
        predicate.where_clause()
    );
    let rows = fetch(executor, "ga4_traffic_sources", &sql, predicate.params())?;

    let mut sources = rows
        .iter()
        .map(|row| -> Result<TrafficSource, MappingError> {
            let m = RowMapper::new(row);
            Ok(TrafficSource {
                source: m.text_or("source", "(not set)")?,
                sessions: m.int("sessions")?,
                users: m.int("users")?,
                revenue: m.float("revenue")?,
                percentage: 0.0,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sessions: Vec<f64> = sources.iter().map(|source| source.sessions as f64).collect();
    for (source, percentage) in sources.iter_mut().zip(share_of_total(&sessions)) {
        source.percentage = percentage;
    }

    Ok(TrafficSources {
        total: sources.len(),
        sources,
    })
}

pub fn technology_breakdown(
    executor: &dyn QueryExecutor,
    range: &DateRange,
) -> Result<TechnologyBreakdown, AnalyticsError> {
    let predicate = DEVICE_DAY.build(range)?;

    Ok(TechnologyBreakdown {
        sources: users_by(executor, &predicate, Dimension::SourcePlatform)?,
        devices: users_by(executor, &predicate, Dimension::DeviceCategory)?,
        browsers: users_by(executor, &predicate, Dimension::BrowserGroup)?,
    })
}

#[derive(Debug, Clone, Copy)]
enum Dimension {
    SourcePlatform,
    DeviceCategory,
    BrowserGroup,
}

impl Dimension {
    fn column(self) -> &'static str {
        match self {
            Self::SourcePlatform => "d.source_platform",
            Self::DeviceCategory => "d.device_category",
            Self::BrowserGroup => "d.browser_group",
        }
    }

    fn family(self) -> &'static str {
        match self {
            Self::SourcePlatform => "ga4_users_by_source",
            Self::DeviceCategory => "ga4_users_by_device",
            Self::BrowserGroup => "ga4_users_by_browser",
        }
    }
}

fn users_by(
    executor: &dyn QueryExecutor,
    predicate: &Predicate,
    dimension: Dimension,
) -> Result<Vec<Share>, AnalyticsError> {
    let column = dimension.column();
    let sql = format!(
        "SELECT {column} AS LABEL, SUM(d.users) AS USERS \
         FROM fct_ga4_device_browser d{} \
         GROUP BY {column} \
         ORDER BY SUM(d.users) DESC NULLS LAST, {column} ASC",
        predicate.where_clause()
    );

    let labelled = fetch(executor, dimension.family(), &sql, predicate.params())?
        .iter()
        .map(label_and_users)
        .collect::<Result<Vec<_>, MappingError>>()?;
    Ok(shares(labelled))
}

fn label_and_users(row: &MetricRow) -> Result<(String, f64), MappingError> {
    let m = RowMapper::new(row);
    Ok((m.text_or("label", "Other")?, m.int("users")? as f64))
}
