pub mod csv_out;
pub mod minimal;
pub mod round;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Result fields holding one row per period, in lookup order.
pub const SERIES_KEYS: [&str; 5] = ["entries", "points", "phases", "cash_flows", "steps"];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}
