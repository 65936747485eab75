mod cli;
mod json;

pub use cli::{print_cli_table, print_policy_result};
pub use json::print_json;

use crate::model::AuditReport;
use anyhow::Result;

/// Output format for audit results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

pub fn print_result(report: &AuditReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(report),
        OutputFormat::Json => print_json(report),
    }
}

/// Format result to string for file output
pub fn format_result_to_string(report: &AuditReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Table => cli::render_table(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("JSON"), Ok(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("text"), Ok(OutputFormat::Table));
        assert!(OutputFormat::from_str("sarif").is_err());
    }
}
