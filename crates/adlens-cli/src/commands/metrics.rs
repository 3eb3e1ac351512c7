use adlens_core::families::MetricFamily;
use adlens_core::range::parse_date;
use adlens_core::{DateRange, MetricRequest, QueryExecutor};
use time::Date;
use tracing::info;

use crate::cli::MetricsArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &MetricsArgs, executor: &dyn QueryExecutor) -> Result<CommandResult, CliError> {
    let family: MetricFamily = args.family.parse()?;
    let request = build_request(args)?;

    info!(%family, range = %request.range, "running metric family");
    let command_result = match family.run(executor, &request) {
        Ok(data) => CommandResult::ok(data),
        Err(error) => CommandResult::failed(error.code(), CliError::Analytics(error)),
    };

    let mut command_result = command_result.with_family(family.name());
    if request.limit.is_some() && family != MetricFamily::CohortRetention {
        command_result = command_result.with_warning(format!("--limit is ignored by {family}"));
    }
    Ok(command_result)
}

fn build_request(args: &MetricsArgs) -> Result<MetricRequest, CliError> {
    let range = DateRange::new(
        parse_flag("from", args.from.as_deref())?,
        parse_flag("to", args.to.as_deref())?,
    );

    Ok(MetricRequest {
        range,
        limit: args.limit,
        campaign_id: args.campaign_id.clone(),
        status: args.status.clone(),
    })
}

fn parse_flag(flag: &'static str, value: Option<&str>) -> Result<Option<Date>, CliError> {
    value
        .map(|value| {
            parse_date(value.trim()).map_err(|_| CliError::InvalidDate {
                flag,
                value: value.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_core::{MetricRow, QueryParams};
    use adlens_warehouse::WarehouseError;
    use std::cell::Cell;

    struct CountingExecutor {
        calls: Cell<usize>,
    }

    impl QueryExecutor for CountingExecutor {
        fn execute(&self, _sql: &str, _params: &QueryParams) -> Result<Vec<MetricRow>, WarehouseError> {
            self.calls.set(self.calls.get() + 1);
            Ok(Vec::new())
        }
    }

    fn args(family: &str, from: Option<&str>, to: Option<&str>) -> MetricsArgs {
        MetricsArgs {
            family: family.to_string(),
            from: from.map(str::to_string),
            to: to.map(str::to_string),
            limit: None,
            campaign_id: None,
            status: None,
        }
    }

    #[test]
    fn reversed_range_becomes_an_envelope_error_without_queries() {
        let executor = CountingExecutor { calls: Cell::new(0) };
        let result = run(
            &args("spend-by-platform", Some("2024-02-01"), Some("2024-01-01")),
            &executor,
        )
        .expect("command result");

        assert_eq!(executor.calls.get(), 0);
        assert_eq!(result.errors[0].code, "invalid_range");
        assert_eq!(result.failure.map(|error| error.exit_code()), Some(2));
        assert_eq!(result.family.as_deref(), Some("spend-by-platform"));
    }

    #[test]
    fn empty_overview_exits_as_not_found() {
        let executor = CountingExecutor { calls: Cell::new(0) };
        let result = run(&args("ga4-overview", None, None), &executor).expect("command result");

        assert_eq!(result.errors[0].code, "no_data");
        assert_eq!(result.failure.map(|error| error.exit_code()), Some(3));
    }

    #[test]
    fn malformed_dates_and_families_are_rejected_up_front() {
        let executor = CountingExecutor { calls: Cell::new(0) };

        let bad_date = run(&args("ga4-overview", Some("01/02/2024"), None), &executor)
            .err()
            .expect("bad date");
        assert!(matches!(bad_date, CliError::InvalidDate { flag: "from", .. }));

        let bad_family = run(&args("nope", None, None), &executor)
            .err()
            .expect("bad family");
        assert_eq!(bad_family.exit_code(), 2);
    }
}
