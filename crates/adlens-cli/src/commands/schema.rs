use adlens_warehouse::Warehouse;
use serde_json::json;

use crate::error::CliError;

use super::CommandResult;

pub fn run(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let tables = warehouse.describe_schema()?;
    Ok(CommandResult::ok(json!({
        "tables": tables,
        "count": tables.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_warehouse::WarehouseConfig;

    #[test]
    fn lists_fact_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(dir.path().join("schema.duckdb"))).expect("open");

        let result = run(&warehouse).expect("schema");

        let names: Vec<&str> = result.data["tables"]
            .as_array()
            .expect("tables")
            .iter()
            .filter_map(|table| table["name"].as_str())
            .collect();
        assert!(names.contains(&"fct_campaign_performance"));
        assert!(names.contains(&"dim_person"));
    }
}
