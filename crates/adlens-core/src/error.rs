use adlens_warehouse::WarehouseError;
use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::mapper::FieldKind;
use crate::range::DateRange;

/// A warehouse value that does not fit the field it is mapped into.
///
/// Signals schema drift. Never defaulted away.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("column '{column}' expected {expected}, found {found}")]
pub struct MappingError {
    pub column: String,
    pub expected: FieldKind,
    pub found: String,
}

/// How a caller should surface an [`AnalyticsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    NotFound,
    Internal,
    Upstream,
}

impl ErrorCategory {
    /// HTTP-equivalent status.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Internal => 500,
            Self::Upstream => 502,
        }
    }
}

/// Top-level error type for metric families.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("date_from {from} is after date_to {to}")]
    InvalidRange { from: Date, to: Date },

    #[error("no {family} data for {range}")]
    NoData {
        family: &'static str,
        range: DateRange,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::NoData { .. } => "no_data",
            Self::Mapping(_) => "mapping_error",
            Self::Warehouse(_) => "warehouse_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRange { .. } => ErrorCategory::InvalidInput,
            Self::NoData { .. } => ErrorCategory::NotFound,
            Self::Mapping(_) | Self::Serialization(_) => ErrorCategory::Internal,
            Self::Warehouse(_) => ErrorCategory::Upstream,
        }
    }
}
