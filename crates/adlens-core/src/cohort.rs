//! Acquisition cohorts and per-month retention.
//!
//! Each customer belongs to the month of their first order, over their whole
//! history. Retention for `(cohort, months_since)` is the number of distinct
//! cohort members ordering in that month over the cohort's month-0 size.
//! Cohort filters select whole cohorts and never trim a curve.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};
use time::{Date, Month};
use tracing::warn;

use crate::derive::retention_rate;
use crate::range::DateRange;

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u8,
}

impl YearMonth {
    /// `None` unless `month` is 1..=12.
    #[must_use]
    pub fn new(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    #[must_use]
    pub fn of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn month(self) -> u8 {
        self.month
    }

    /// Whole months from `earlier` to `self`; negative if `self` is earlier.
    #[must_use]
    pub fn months_since(self, earlier: YearMonth) -> i64 {
        (i64::from(self.year) - i64::from(earlier.year)) * 12 + i64::from(self.month)
            - i64::from(earlier.month)
    }

    /// The first day of the month, if representable.
    #[must_use]
    pub fn first_day(self) -> Option<Date> {
        let month = Month::try_from(self.month).ok()?;
        Date::from_calendar_date(self.year, month, 1).ok()
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One order, or one month of activity, for one customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerOrder {
    pub customer_id: String,
    pub order_date: Date,
}

impl CustomerOrder {
    pub fn new(customer_id: impl Into<String>, order_date: Date) -> Self {
        Self {
            customer_id: customer_id.into(),
            order_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cohort {
    pub cohort_month: YearMonth,
    pub initial_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CohortPeriodRetention {
    pub cohort_month: YearMonth,
    pub months_since: u32,
    pub active_customers: u64,
    /// Percentage in `[0, 100]`, rounded to 2 dp.
    pub retention_rate: f64,
}

/// Which cohorts to report. Bounds are inclusive months.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CohortFilter {
    pub from: Option<YearMonth>,
    pub to: Option<YearMonth>,
    /// Keep at most this many cohorts, most recent first.
    pub limit: Option<usize>,
}

impl CohortFilter {
    /// Cohort months covered by `range`. Does not validate the range.
    #[must_use]
    pub fn from_range(range: &DateRange) -> Self {
        Self {
            from: range.from.map(YearMonth::of),
            to: range.to.map(YearMonth::of),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn admits(&self, cohort_month: YearMonth) -> bool {
        self.from.map_or(true, |from| cohort_month >= from)
            && self.to.map_or(true, |to| cohort_month <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortRetentionReport {
    /// Selected cohorts, most recent first.
    pub cohorts: Vec<Cohort>,
    /// Cohort descending, then `months_since` ascending.
    pub periods: Vec<CohortPeriodRetention>,
}

impl CohortRetentionReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }
}

/// Build cohorts from complete order history and compute their retention.
///
/// `orders` must cover every customer's full history; restricting it to a
/// window would shift cohort assignment.
#[must_use]
pub fn compute_retention(orders: &[CustomerOrder], filter: &CohortFilter) -> CohortRetentionReport {
    let mut first_month: HashMap<&str, YearMonth> = HashMap::new();
    let mut active_months: HashSet<(&str, YearMonth)> = HashSet::new();

    for order in orders {
        let month = YearMonth::of(order.order_date);
        first_month
            .entry(order.customer_id.as_str())
            .and_modify(|first| *first = (*first).min(month))
            .or_insert(month);
        active_months.insert((order.customer_id.as_str(), month));
    }

    // Distinct (customer, month) pairs make this a count of distinct customers.
    let mut activity: BTreeMap<YearMonth, BTreeMap<u32, u64>> = BTreeMap::new();
    for (customer, month) in &active_months {
        let Some(cohort_month) = first_month.get(customer).copied() else {
            continue;
        };
        let Ok(months_since) = u32::try_from(month.months_since(cohort_month)) else {
            continue;
        };
        *activity
            .entry(cohort_month)
            .or_default()
            .entry(months_since)
            .or_default() += 1;
    }

    let mut report = CohortRetentionReport::default();
    let selected = activity
        .iter()
        .rev()
        .filter(|(cohort_month, _)| filter.admits(**cohort_month));

    for (cohort_month, periods) in selected {
        if filter.limit.is_some_and(|limit| report.cohorts.len() >= limit) {
            break;
        }

        let initial_size = periods.get(&0).copied().unwrap_or(0);
        if initial_size == 0 {
            warn!(cohort = %cohort_month, "dropping cohort without month-0 activity");
            continue;
        }

        report.cohorts.push(Cohort {
            cohort_month: *cohort_month,
            initial_size,
        });
        for (months_since, active_customers) in periods {
            let Some(retention_rate) = retention_rate(*active_customers, initial_size) else {
                continue;
            };
            report.periods.push(CohortPeriodRetention {
                cohort_month: *cohort_month,
                months_since: *months_since,
                active_customers: *active_customers,
                retention_rate,
            });
        }
    }

    report
}
