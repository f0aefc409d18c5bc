//! Terminal output helpers for the actions CLI.

use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

impl OutputFormat {
    pub fn is_table(&self) -> bool {
        matches!(self, OutputFormat::Table)
    }
}

/// Print a success message to stdout.
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Render tabular rows, or fall back to serialized output for JSON/YAML.
pub fn print_rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) {
    if format.is_table() {
        if rows.is_empty() {
            println!("{}", "No actions found.".dimmed());
            return;
        }
        println!("{}", Table::new(rows).with(Style::sharp()));
    } else {
        print_serialized(&rows, format);
    }
}

/// Print any serializable value as JSON or YAML (table format falls back to
/// pretty JSON).
pub fn print_serialized<T: Serialize>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).expect("serialize to YAML"));
        }
        _ => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).expect("serialize to JSON")
            );
        }
    }
}

/// Print an aligned key-value line.
pub fn print_field(key: &str, value: &str) {
    println!("{:>12}  {}", key.cyan(), value);
}
