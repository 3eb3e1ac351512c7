//! Typed reads from warehouse rows.
//!
//! A [`FieldSpec`] names a column, the type it must coerce to, and what a NULL
//! or missing value means. [`map_field`] is the only place coercion rules live;
//! [`RowMapper`] wraps it with typed accessors for the common shapes.
//!
//! | Kind | Accepts | NULL / missing |
//! |------|---------|----------------|
//! | `Integer` | integers, floats (truncated), numeric text | declared default |
//! | `Float` | integers, floats, numeric text | declared default |
//! | `Text` | text, numbers, booleans | declared default |
//! | `Date` | `YYYY-MM-DD` text (a trailing time is ignored) | declared default |
//!
//! Anything else is a [`MappingError`].

use std::fmt::{Display, Formatter};

use adlens_warehouse::{MetricRow, SqlValue};
use serde::Serialize;
use time::Date;

use crate::error::MappingError;
use crate::range::parse_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Date,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Date => "date",
        })
    }
}

/// What a NULL or missing column maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// `0` for numeric kinds.
    Zero,
    /// No value; the field is optional.
    Absent,
    Text(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

impl FieldSpec {
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Integer,
            default: FieldDefault::Zero,
        }
    }

    #[must_use]
    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Float,
            default: FieldDefault::Zero,
        }
    }

    #[must_use]
    pub const fn optional_float(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Float,
            default: FieldDefault::Absent,
        }
    }

    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            default: FieldDefault::Absent,
        }
    }

    #[must_use]
    pub const fn text_or(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            default: FieldDefault::Text(default),
        }
    }

    #[must_use]
    pub const fn date(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Date,
            default: FieldDefault::Absent,
        }
    }
}

/// A coerced field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Date(Date),
    Absent,
}

/// Coerce one column of `row` according to `spec`.
pub fn map_field(row: &MetricRow, spec: &FieldSpec) -> Result<FieldValue, MappingError> {
    let value = match row.get(spec.name) {
        None | Some(SqlValue::Null) => return Ok(default_for(spec)),
        Some(value) => value,
    };

    let mismatch = || MappingError {
        column: spec.name.to_string(),
        expected: spec.kind,
        found: describe(value),
    };

    match spec.kind {
        FieldKind::Integer => match value {
            SqlValue::Int(value) => Ok(FieldValue::Integer(*value)),
            SqlValue::Float(value) => truncate(*value).map(FieldValue::Integer).ok_or_else(mismatch),
            SqlValue::Text(text) => parse_number(text)
                .and_then(truncate)
                .map(FieldValue::Integer)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldKind::Float => match value {
            SqlValue::Int(value) => Ok(FieldValue::Float(*value as f64)),
            SqlValue::Float(value) => Ok(FieldValue::Float(*value)),
            SqlValue::Text(text) => parse_number(text)
                .map(FieldValue::Float)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldKind::Text => Ok(FieldValue::Text(match value {
            SqlValue::Text(text) => text.clone(),
            SqlValue::Int(value) => value.to_string(),
            SqlValue::Float(value) => value.to_string(),
            SqlValue::Bool(value) => value.to_string(),
            SqlValue::Null => String::new(),
        })),
        FieldKind::Date => match value {
            SqlValue::Text(text) => text
                .get(..10)
                .and_then(|prefix| parse_date(prefix).ok())
                .map(FieldValue::Date)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
    }
}

fn default_for(spec: &FieldSpec) -> FieldValue {
    match (spec.default, spec.kind) {
        (FieldDefault::Zero, FieldKind::Integer) => FieldValue::Integer(0),
        (FieldDefault::Zero, FieldKind::Float) => FieldValue::Float(0.0),
        (FieldDefault::Text(text), _) => FieldValue::Text(text.to_string()),
        _ => FieldValue::Absent,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn truncate(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

fn describe(value: &SqlValue) -> String {
    format!("{} {value}", value.kind())
}

/// Typed accessors over one row.
#[derive(Debug, Clone, Copy)]
pub struct RowMapper<'a> {
    row: &'a MetricRow,
}

impl<'a> RowMapper<'a> {
    #[must_use]
    pub fn new(row: &'a MetricRow) -> Self {
        Self { row }
    }

    #[must_use]
    pub fn row(&self) -> &'a MetricRow {
        self.row
    }

    /// Integer column; NULL maps to 0, fractions are truncated.
    pub fn int(&self, name: &'static str) -> Result<i64, MappingError> {
        match map_field(self.row, &FieldSpec::int(name))? {
            FieldValue::Integer(value) => Ok(value),
            _ => Ok(0),
        }
    }

    /// Float column; NULL maps to 0.0.
    pub fn float(&self, name: &'static str) -> Result<f64, MappingError> {
        match map_field(self.row, &FieldSpec::float(name))? {
            FieldValue::Float(value) => Ok(value),
            _ => Ok(0.0),
        }
    }

    /// Float column; NULL maps to `None`.
    pub fn optional_float(&self, name: &'static str) -> Result<Option<f64>, MappingError> {
        match map_field(self.row, &FieldSpec::optional_float(name))? {
            FieldValue::Float(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Text column; NULL maps to `default`.
    pub fn text_or(&self, name: &'static str, default: &'static str) -> Result<String, MappingError> {
        match map_field(self.row, &FieldSpec::text_or(name, default))? {
            FieldValue::Text(value) => Ok(value),
            _ => Ok(default.to_string()),
        }
    }

    /// Text column that must be present; NULL is a mapping error.
    pub fn text(&self, name: &'static str) -> Result<String, MappingError> {
        match map_field(self.row, &FieldSpec::text(name))? {
            FieldValue::Text(value) => Ok(value),
            _ => Err(MappingError {
                column: name.to_string(),
                expected: FieldKind::Text,
                found: String::from("null"),
            }),
        }
    }

    /// Text column; NULL maps to `None`.
    pub fn optional_text(&self, name: &'static str) -> Result<Option<String>, MappingError> {
        match map_field(self.row, &FieldSpec::text(name))? {
            FieldValue::Text(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Date column. A NULL date has no sensible default and is a mapping error.
    pub fn date(&self, name: &'static str) -> Result<Date, MappingError> {
        match map_field(self.row, &FieldSpec::date(name))? {
            FieldValue::Date(value) => Ok(value),
            _ => Err(MappingError {
                column: name.to_string(),
                expected: FieldKind::Date,
                found: String::from("null"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn row() -> MetricRow {
        MetricRow::new()
            .with("IMPRESSIONS", 1000_i64)
            .with("CONVERSIONS", 12.9)
            .with("SPEND", SqlValue::Null)
            .with("AVG_ROAS", SqlValue::Null)
            .with("AVG_QUALITY_SCORE", 7.25)
            .with("SOURCE", SqlValue::Null)
            .with("DATE", "2024-01-05")
            .with("LAST_SEEN", "2024-01-05 13:45:00")
            .with("CLICKS", "not-a-number")
            .with("IS_CURRENT", true)
            .with("CAMPAIGN_ID", 1234_i64)
    }

    #[test]
    fn null_required_numbers_map_to_zero() {
        let row = row();
        let mapper = RowMapper::new(&row);

        assert_eq!(mapper.float("spend").expect("spend"), 0.0);
        assert_eq!(mapper.int("spend").expect("spend"), 0);
        assert_eq!(mapper.int("not_selected").expect("missing"), 0);
    }

    #[test]
    fn null_optional_numbers_map_to_none() {
        let row = row();
        let mapper = RowMapper::new(&row);

        assert_eq!(mapper.optional_float("avg_roas").expect("avg_roas"), None);
        assert_eq!(
            mapper.optional_float("avg_quality_score").expect("quality"),
            Some(7.25)
        );
    }

    #[test]
    fn integers_truncate_fractional_aggregates() {
        let row = row();
        let mapper = RowMapper::new(&row);

        assert_eq!(mapper.int("conversions").expect("conversions"), 12);
        assert_eq!(mapper.float("conversions").expect("conversions"), 12.9);
        assert_eq!(mapper.float("impressions").expect("impressions"), 1000.0);
    }

    #[test]
    fn text_fields_use_declared_default() {
        let row = row();
        let mapper = RowMapper::new(&row);

        assert_eq!(mapper.text_or("source", "(not set)").expect("source"), "(not set)");
        assert_eq!(mapper.text_or("campaign_id", "").expect("id"), "1234");
        assert_eq!(mapper.optional_text("source").expect("source"), None);
    }

    #[test]
    fn dates_accept_plain_and_timestamp_text() {
        let row = row();
        let mapper = RowMapper::new(&row);

        assert_eq!(mapper.date("date").expect("date"), date!(2024 - 01 - 05));
        assert_eq!(mapper.date("last_seen").expect("last_seen"), date!(2024 - 01 - 05));
        assert!(mapper.date("missing").is_err());
    }

    #[test]
    fn non_numeric_values_are_mapping_errors() {
        let row = row();
        let mapper = RowMapper::new(&row);

        let error = mapper.int("clicks").expect_err("non-numeric text");
        assert_eq!(error.column, "clicks");
        assert_eq!(error.expected, FieldKind::Integer);
        assert_eq!(error.found, "text 'not-a-number'");

        let error = mapper.float("is_current").expect_err("boolean");
        assert_eq!(error.expected, FieldKind::Float);
        assert_eq!(error.found, "boolean true");
    }

    #[test]
    fn declarative_specs_map_through_one_function() {
        let row = row();
        let specs = [
            FieldSpec::int("impressions"),
            FieldSpec::optional_float("avg_roas"),
            FieldSpec::text_or("source", "(not set)"),
        ];

        let values: Vec<FieldValue> = specs
            .iter()
            .map(|spec| map_field(&row, spec))
            .collect::<Result<_, _>>()
            .expect("map");

        assert_eq!(
            values,
            vec![
                FieldValue::Integer(1000),
                FieldValue::Absent,
                FieldValue::Text("(not set)".to_string()),
            ]
        );
    }
}
