//! Optional date-range filters with shared parameter keys.

use adlens_warehouse::QueryParams;

use crate::error::AnalyticsError;
use crate::range::DateRange;

/// Parameter key for the lower bound, identical for every table alias.
pub const DATE_FROM: &str = "date_from";
/// Parameter key for the upper bound, identical for every table alias.
pub const DATE_TO: &str = "date_to";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Day,
    Month,
}

/// Builds `column >= $date_from` / `column <= $date_to` clauses.
///
/// Column names are `'static` so only identifiers written in source can reach
/// the SQL text; bound values always travel as parameters.
#[derive(Debug, Clone, Copy)]
pub struct PredicateBuilder {
    column: &'static str,
    granularity: Granularity,
}

impl PredicateBuilder {
    #[must_use]
    pub const fn on(column: &'static str) -> Self {
        Self {
            column,
            granularity: Granularity::Day,
        }
    }

    /// Compare against month starts, for columns holding a month such as a
    /// cohort month.
    #[must_use]
    pub const fn by_month(mut self) -> Self {
        self.granularity = Granularity::Month;
        self
    }

    /// Validate `range` and emit zero, one, or two clauses.
    pub fn build(&self, range: &DateRange) -> Result<Predicate, AnalyticsError> {
        range.validate()?;

        let range = match self.granularity {
            Granularity::Day => *range,
            Granularity::Month => range.month_floor(),
        };

        let mut clauses = Vec::with_capacity(2);
        let mut params = QueryParams::new();
        if let Some(from) = range.from {
            clauses.push(format!("{} >= CAST(${DATE_FROM} AS DATE)", self.column));
            params.insert(DATE_FROM, from.to_string());
        }
        if let Some(to) = range.to {
            clauses.push(format!("{} <= CAST(${DATE_TO} AS DATE)", self.column));
            params.insert(DATE_TO, to.to_string());
        }

        Ok(Predicate { clauses, params })
    }
}

/// Filter clauses plus their bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<String>,
    params: QueryParams,
}

impl Predicate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    #[must_use]
    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    #[must_use]
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// `" WHERE a AND b"`, or an empty string.
    #[must_use]
    pub fn where_clause(&self) -> String {
        self.prefixed(" WHERE ")
    }

    /// `" AND a AND b"`, or an empty string, for queries that already filter.
    #[must_use]
    pub fn and_clause(&self) -> String {
        self.prefixed(" AND ")
    }

    fn prefixed(&self, prefix: &str) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("{prefix}{}", self.clauses.join(" AND "))
        }
    }
}
