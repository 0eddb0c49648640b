//! Table and JSON output for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

/// Print a list of rows in the selected format.
pub fn print_list<T: Serialize + Tabled>(rows: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table if rows.is_empty() => println!("No results found."),
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(rows)?,
    }
    Ok(())
}

/// Print one row in the selected format.
pub fn print_item<T: Serialize + Tabled>(item: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => print_list(std::slice::from_ref(item), format),
        OutputFormat::Json => print_json(item),
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success line.
pub fn print_success(msg: &str) {
    println!("✓ {msg}");
}

/// Print a warning line.
pub fn print_warning(msg: &str) {
    println!("⚠ {msg}");
}

/// Print an error line.
pub fn print_error(msg: &str) {
    eprintln!("✗ {msg}");
}
