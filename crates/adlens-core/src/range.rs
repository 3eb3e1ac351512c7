use std::fmt::{Display, Formatter};

use serde::Serialize;
use time::macros::format_description;
use time::Date;

use crate::error::AnalyticsError;

/// Optional inclusive calendar-date bounds.
///
/// Construction never fails; [`DateRange::validate`] is the single check that
/// `from <= to`, and every metric family runs it before touching the warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    #[must_use]
    pub const fn new(from: Option<Date>, to: Option<Date>) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// Both bounds, validated.
    pub fn between(from: Date, to: Date) -> Result<Self, AnalyticsError> {
        let range = Self::new(Some(from), Some(to));
        range.validate()?;
        Ok(range)
    }

    /// Parse `YYYY-MM-DD` bounds without validating their order.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, time::error::Parse> {
        Ok(Self {
            from: from.map(parse_date).transpose()?,
            to: to.map(parse_date).transpose()?,
        })
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(AnalyticsError::InvalidRange { from, to }),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Both bounds moved to the first day of their month.
    #[must_use]
    pub fn month_floor(&self) -> Self {
        Self {
            from: self.from.map(first_of_month),
            to: self.to.map(first_of_month),
        }
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.from, self.to) {
            (None, None) => f.write_str("all time"),
            (Some(from), None) => write!(f, "{from}.."),
            (None, Some(to)) => write!(f, "..{to}"),
            (Some(from), Some(to)) => write!(f, "{from}..{to}"),
        }
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
}

pub(crate) fn first_of_month(date: Date) -> Date {
    date.replace_day(1).unwrap_or(date)
}
