//! Query shaping and derived metrics for marketing analytics.
//!
//! Every metric family follows the same path:
//!
//! 1. [`PredicateBuilder`] validates the [`DateRange`] and emits filter clauses
//!    bound to `$date_from` / `$date_to`.
//! 2. The SQL runs on a caller-supplied [`QueryExecutor`].
//! 3. [`RowMapper`] reads typed fields with declared null defaults.
//! 4. [`DerivationRule`]s compute ratios with zero-denominator fallbacks.
//!
//! The cohort retention engine in [`cohort`] is the exception: it pulls raw
//! customer activity and aggregates in memory.

pub mod cohort;
pub mod derive;
pub mod error;
pub mod families;
pub mod mapper;
pub mod predicate;
pub mod range;

pub use adlens_warehouse::{MetricRow, QueryExecutor, QueryParams, SqlValue};
pub use cohort::{
    compute_retention, Cohort, CohortFilter, CohortPeriodRetention, CohortRetentionReport,
    CustomerOrder, YearMonth,
};
pub use derive::{share_of_total, DerivationRule, Fallback, Formula};
pub use error::{AnalyticsError, ErrorCategory, MappingError};
pub use families::{MetricFamily, MetricRequest};
pub use mapper::{map_field, FieldDefault, FieldKind, FieldSpec, FieldValue, RowMapper};
pub use predicate::{Predicate, PredicateBuilder};
pub use range::DateRange;
