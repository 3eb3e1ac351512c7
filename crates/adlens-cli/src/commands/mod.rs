mod metrics;
mod schema;
mod sql;

use std::time::Instant;

use adlens_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::envelope::{Envelope, EnvelopeError, EnvelopeMeta};
use crate::error::CliError;

/// What a command produced, before the envelope is stamped.
pub struct CommandResult {
    pub data: Value,
    pub family: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    /// Reported after the envelope is printed; decides the exit code.
    pub failure: Option<CliError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            family: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(code: &str, failure: CliError) -> Self {
        Self {
            data: Value::Null,
            family: None,
            warnings: Vec::new(),
            errors: vec![EnvelopeError::new(code, failure.to_string())],
            failure: Some(failure),
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A rendered-ready envelope plus the error that should set the exit code.
pub struct Outcome {
    pub envelope: Envelope,
    pub failure: Option<CliError>,
}

pub fn run(cli: &Cli) -> Result<Outcome, CliError> {
    let started = Instant::now();
    let warehouse = open_warehouse(cli)?;

    let command_result = match &cli.command {
        Command::Metrics(args) => metrics::run(args, &warehouse)?,
        Command::Sql(args) => sql::run(args, &warehouse)?,
        Command::Schema => schema::run(&warehouse)?,
    };

    let CommandResult {
        data,
        family,
        warnings,
        errors,
        failure,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = EnvelopeMeta::new(family, latency_ms)?;
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Outcome {
        envelope: Envelope { meta, data, errors },
        failure,
    })
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.db_path {
        Some(path) => WarehouseConfig {
            db_path: path.clone(),
            ..WarehouseConfig::default()
        },
        None => WarehouseConfig::default(),
    };
    Ok(Warehouse::open(config)?)
}
