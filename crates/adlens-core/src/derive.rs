//! Derived ratio metrics.
//!
//! Every ratio reported by a metric family is one of these shapes:
//!
//! | Formula | Value | Zero / NULL denominator |
//! |---------|-------|-------------------------|
//! | [`Formula::Rate`] | `n / d * 100` | declared fallback |
//! | [`Formula::UnitCost`] | `n / d * scale` | declared fallback |
//! | [`Formula::ReturnRatio`] | `n / d` | declared fallback |
//! | [`share_of_total`] | `v / sum * 100` | 0 per row |
//! | [`retention_rate`] | `active / initial * 100`, 2 dp | cohort dropped |

use adlens_warehouse::MetricRow;

use crate::error::MappingError;
use crate::mapper::RowMapper;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formula {
    Rate,
    UnitCost { scale: f64 },
    ReturnRatio,
}

impl Formula {
    #[must_use]
    pub const fn scale(self) -> f64 {
        match self {
            Self::Rate => 100.0,
            Self::UnitCost { scale } => scale,
            Self::ReturnRatio => 1.0,
        }
    }
}

/// Result when the denominator is zero or NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Zero,
    /// The metric has no meaning, e.g. an average over an empty set.
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationRule {
    pub name: &'static str,
    pub numerator: &'static str,
    pub denominator: &'static str,
    pub formula: Formula,
    pub fallback: Fallback,
}

impl DerivationRule {
    #[must_use]
    pub const fn rate(name: &'static str, numerator: &'static str, denominator: &'static str) -> Self {
        Self {
            name,
            numerator,
            denominator,
            formula: Formula::Rate,
            fallback: Fallback::Zero,
        }
    }

    #[must_use]
    pub const fn unit_cost(
        name: &'static str,
        numerator: &'static str,
        denominator: &'static str,
        scale: f64,
    ) -> Self {
        Self {
            name,
            numerator,
            denominator,
            formula: Formula::UnitCost { scale },
            fallback: Fallback::Zero,
        }
    }

    #[must_use]
    pub const fn return_ratio(
        name: &'static str,
        numerator: &'static str,
        denominator: &'static str,
    ) -> Self {
        Self {
            name,
            numerator,
            denominator,
            formula: Formula::ReturnRatio,
            fallback: Fallback::Zero,
        }
    }

    #[must_use]
    pub const fn or_undefined(mut self) -> Self {
        self.fallback = Fallback::Undefined;
        self
    }

    /// Apply to two already-read values. A NULL numerator counts as zero.
    #[must_use]
    pub fn apply_values(&self, numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
        let fallback = match self.fallback {
            Fallback::Zero => Some(0.0),
            Fallback::Undefined => None,
        };

        let denominator = match denominator {
            Some(value) if value != 0.0 && value.is_finite() => value,
            _ => return fallback,
        };

        // Scale first so exact decimal inputs stay exact, e.g. 50 * 100 / 1000.
        let value = numerator.unwrap_or(0.0) * self.formula.scale() / denominator;
        if value.is_finite() {
            Some(value)
        } else {
            fallback
        }
    }

    /// Read numerator and denominator from `row` and apply.
    pub fn apply(&self, row: &MetricRow) -> Result<Option<f64>, MappingError> {
        let mapper = RowMapper::new(row);
        let numerator = mapper.optional_float(self.numerator)?;
        let denominator = mapper.optional_float(self.denominator)?;
        Ok(self.apply_values(numerator, denominator))
    }

    /// [`apply`](Self::apply) with an undefined result reported as 0.
    pub fn value(&self, row: &MetricRow) -> Result<f64, MappingError> {
        Ok(self.apply(row)?.unwrap_or(0.0))
    }
}

pub const CTR: DerivationRule = DerivationRule::rate("ctr", "clicks", "impressions");
pub const CONVERSION_RATE: DerivationRule =
    DerivationRule::rate("conversion_rate", "conversions", "clicks");
pub const ENGAGEMENT_RATE: DerivationRule =
    DerivationRule::rate("engagement_rate", "engaged_sessions", "sessions");

pub const CPC: DerivationRule = DerivationRule::unit_cost("cpc", "spend", "clicks", 1.0);
pub const CPM: DerivationRule = DerivationRule::unit_cost("cpm", "spend", "impressions", 1000.0);
pub const COST_PER_CONVERSION: DerivationRule =
    DerivationRule::unit_cost("cost_per_conversion", "spend", "conversions", 1.0);
pub const SESSIONS_PER_USER: DerivationRule =
    DerivationRule::unit_cost("sessions_per_user", "sessions", "users", 1.0);
pub const AVG_CONVERSION_VALUE: DerivationRule =
    DerivationRule::unit_cost("conversion_value", "revenue", "conversions", 1.0).or_undefined();
pub const CAC_BLENDED: DerivationRule =
    DerivationRule::unit_cost("cac_blended", "total_ad_spend", "new_customers", 1.0);
pub const AVG_ORDER_VALUE: DerivationRule =
    DerivationRule::unit_cost("avg_order_value", "total_revenue", "total_orders", 1.0);

pub const ROAS: DerivationRule = DerivationRule::return_ratio("roas", "conversion_value", "spend");

/// Each value as a percentage of the sum of all values.
///
/// Every entry is 0 when the sum is not positive.
#[must_use]
pub fn share_of_total(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|value| value * 100.0 / total).collect()
}

/// `active / initial * 100` rounded to 2 dp; `None` for an empty cohort.
#[must_use]
pub fn retention_rate(active_customers: u64, initial_size: u64) -> Option<f64> {
    if initial_size == 0 {
        return None;
    }
    Some(round_to(
        active_customers as f64 * 100.0 / initial_size as f64,
        2,
    ))
}

#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_warehouse::SqlValue;
    use proptest::prelude::*;

    fn scenario_row() -> MetricRow {
        MetricRow::new()
            .with("IMPRESSIONS", 1000_i64)
            .with("CLICKS", 50_i64)
            .with("SPEND", 200.0)
            .with("CONVERSION_VALUE", 600.0)
    }

    #[test]
    fn unit_economics_for_a_typical_month() {
        let row = scenario_row();

        assert_eq!(CTR.value(&row).expect("ctr"), 5.0);
        assert_eq!(CPC.value(&row).expect("cpc"), 4.0);
        assert_eq!(ROAS.value(&row).expect("roas"), 3.0);
        assert_eq!(CPM.value(&row).expect("cpm"), 200.0);
    }

    #[test]
    fn zero_or_null_denominators_use_declared_fallback() {
        let row = MetricRow::new()
            .with("CLICKS", 10_i64)
            .with("IMPRESSIONS", 0_i64)
            .with("SPEND", SqlValue::Null)
            .with("REVENUE", 50.0)
            .with("CONVERSIONS", SqlValue::Null);

        assert_eq!(CTR.apply(&row).expect("ctr"), Some(0.0));
        assert_eq!(ROAS.apply(&row).expect("roas"), Some(0.0));
        assert_eq!(AVG_CONVERSION_VALUE.apply(&row).expect("aov"), None);
    }

    #[test]
    fn null_numerator_counts_as_zero() {
        let row = MetricRow::new()
            .with("CLICKS", SqlValue::Null)
            .with("IMPRESSIONS", 100_i64);
        assert_eq!(CTR.apply(&row).expect("ctr"), Some(0.0));
    }

    #[test]
    fn schema_drift_in_an_input_column_propagates() {
        let row = MetricRow::new()
            .with("CLICKS", "lots")
            .with("IMPRESSIONS", 100_i64);
        let error = CTR.apply(&row).expect_err("drift");
        assert_eq!(error.column, "clicks");
    }

    #[test]
    fn share_of_empty_or_zero_total_is_zero() {
        assert!(share_of_total(&[]).is_empty());
        assert_eq!(share_of_total(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(share_of_total(&[25.0, 75.0]), vec![25.0, 75.0]);
    }

    #[test]
    fn retention_rate_rounds_and_drops_empty_cohorts() {
        assert_eq!(retention_rate(40, 100), Some(40.0));
        assert_eq!(retention_rate(1, 3), Some(33.33));
        assert_eq!(retention_rate(0, 0), None);
    }

    proptest! {
        #[test]
        fn ratio_fallbacks_are_never_nan(
            numerator in proptest::option::of(-1.0e9..1.0e9_f64),
            zero_denominator in proptest::option::of(Just(0.0_f64)),
        ) {
            for rule in [CTR, CPC, CPM, ROAS, CONVERSION_RATE, COST_PER_CONVERSION, ENGAGEMENT_RATE] {
                let value = rule.apply_values(numerator, zero_denominator);
                prop_assert_eq!(value, Some(0.0));
            }
        }

        #[test]
        fn shares_sum_to_one_hundred(values in proptest::collection::vec(0.0..1.0e7_f64, 1..200)) {
            let total: f64 = values.iter().sum();
            prop_assume!(total > 0.0);

            let shares = share_of_total(&values);
            let sum: f64 = shares.iter().sum();
            prop_assert!((sum - 100.0).abs() <= 0.1, "sum was {}", sum);
        }
    }
}
