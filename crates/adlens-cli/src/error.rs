use adlens_core::families::UnknownFamily;
use adlens_core::{AnalyticsError, ErrorCategory};
use adlens_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    UnknownFamily(#[from] UnknownFamily),

    #[error("invalid --{flag} date '{value}': expected YYYY-MM-DD")]
    InvalidDate { flag: &'static str, value: String },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Timestamp(#[from] time::error::Format),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Analytics(error) => category_exit_code(error.category()),
            Self::UnknownFamily(_) | Self::InvalidDate { .. } => 2,
            Self::Warehouse(WarehouseError::QueryRejected(_)) => 2,
            Self::Serialization(_) | Self::Timestamp(_) => 4,
            Self::Warehouse(_) | Self::Io(_) => 10,
        }
    }
}

const fn category_exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::InvalidInput => 2,
        ErrorCategory::NotFound => 3,
        ErrorCategory::Internal => 4,
        ErrorCategory::Upstream => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_core::DateRange;
    use time::macros::date;

    #[test]
    fn analytics_errors_exit_by_category() {
        let reversed = CliError::from(AnalyticsError::InvalidRange {
            from: date!(2024 - 02 - 01),
            to: date!(2024 - 01 - 01),
        });
        assert_eq!(reversed.exit_code(), 2);

        let empty = CliError::from(AnalyticsError::NoData {
            family: "ga4_overview",
            range: DateRange::unbounded(),
        });
        assert_eq!(empty.exit_code(), 3);

        let timeout = CliError::from(WarehouseError::QueryTimeout { timeout_ms: 5 });
        assert_eq!(timeout.exit_code(), 10);
    }
}
