//! Rows, parameters, and the executor seam shared by every metric family.

use std::fmt;

use ::duckdb::types::{ToSqlOutput, Value as DuckValue};
use ::duckdb::ToSql;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::WarehouseError;

/// A nullable scalar as returned by the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type label used in mapping diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Null
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ::duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => DuckValue::Null,
            Self::Bool(value) => DuckValue::Boolean(*value),
            Self::Int(value) => DuckValue::BigInt(*value),
            Self::Float(value) => DuckValue::Double(*value),
            Self::Text(value) => DuckValue::Text(value.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// One result row: ordered columns, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRow {
    columns: Vec<(String, SqlValue)>,
}

impl MetricRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Builder used by fixtures and test doubles.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Look up a column ignoring ASCII case. The first match wins.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for MetricRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Named query parameters in insertion order.
///
/// Inserting a key that already exists replaces its value in place, which lets
/// predicates built against different table aliases share `date_from`/`date_to`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, SqlValue)>,
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn merge(&mut self, other: &QueryParams) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Runs one read-only SQL statement with named `$param` placeholders.
///
/// Implementations own connections, transactions and retries. Errors are
/// returned unchanged to the caller.
pub trait QueryExecutor {
    fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<MetricRow>, WarehouseError>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<MetricRow>, WarehouseError> {
        (**self).execute(sql, params)
    }
}

/// Rewrite `$name` placeholders into positional `?` markers.
///
/// Placeholders inside single-quoted literals or double-quoted identifiers are
/// left alone. Returns the rewritten SQL and the values in marker order.
///
/// # Errors
/// Returns [`WarehouseError::QueryRejected`] when a placeholder has no value.
pub fn bind_named(sql: &str, params: &QueryParams) -> Result<(String, Vec<SqlValue>), WarehouseError> {
    let mut output = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if let Some(open) = quote {
            output.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                output.push(ch);
            }
            '$' if chars
                .peek()
                .is_some_and(|(_, next)| next.is_ascii_alphabetic() || *next == '_') =>
            {
                let mut name = String::new();
                while let Some((_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        name.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = params.get(name.as_str()).ok_or_else(|| {
                    WarehouseError::QueryRejected(format!("missing value for parameter ${name}"))
                })?;
                values.push(value.clone());
                output.push('?');
            }
            _ => output.push(ch),
        }
    }

    Ok((output, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup_ignores_case() {
        let row = MetricRow::new().with("TOTAL_SPEND", 12.5).with("Clicks", 3_i64);

        assert_eq!(row.get("total_spend"), Some(&SqlValue::Float(12.5)));
        assert_eq!(row.get("CLICKS"), Some(&SqlValue::Int(3)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(SqlValue::from(f64::NAN), SqlValue::Null);
        assert_eq!(SqlValue::from(f64::INFINITY), SqlValue::Null);
    }

    #[test]
    fn params_replace_existing_keys_in_place() {
        let mut params = QueryParams::new().with("date_from", "2024-01-01");
        params.insert("date_to", "2024-01-31");
        params.insert("date_from", "2024-01-02");

        let keys: Vec<&str> = params.iter().map(|(name, _)| name).collect();
        assert_eq!(keys, vec!["date_from", "date_to"]);
        assert_eq!(params.get("date_from"), Some(&SqlValue::from("2024-01-02")));
    }

    #[test]
    fn bind_named_rewrites_repeated_placeholders() {
        let params = QueryParams::new()
            .with("date_from", "2024-01-01")
            .with("date_to", "2024-01-31");
        let (sql, values) = bind_named(
            "SELECT 1 WHERE a >= $date_from AND a <= $date_to AND b >= $date_from",
            &params,
        )
        .expect("bind");

        assert_eq!(sql, "SELECT 1 WHERE a >= ? AND a <= ? AND b >= ?");
        assert_eq!(values.len(), 3);
        assert_eq!(values[2], SqlValue::from("2024-01-01"));
    }

    #[test]
    fn bind_named_skips_quoted_text() {
        let params = QueryParams::new().with("x", 1_i64);
        let (sql, values) =
            bind_named("SELECT '$x' AS \"$x\", $x, 5 * $1", &params).expect("bind");

        assert_eq!(sql, "SELECT '$x' AS \"$x\", ?, 5 * $1");
        assert_eq!(values, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn bind_named_rejects_unknown_placeholder() {
        let error = bind_named("SELECT $nope", &QueryParams::new()).expect_err("unbound");
        assert!(matches!(error, WarehouseError::QueryRejected(message) if message.contains("$nope")));
    }

    #[test]
    fn rows_serialize_as_ordered_objects() {
        let row = MetricRow::new()
            .with("b", 1_i64)
            .with("a", SqlValue::Null)
            .with("c", "x");
        let json = serde_json::to_string(&row).expect("json");
        assert_eq!(json, r#"{"b":1,"a":null,"c":"x"}"#);
    }
}
