// Output formatting for CLI

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn print_value<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is rendered by the caller
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a `label: value` line with labels aligned
pub fn print_field(label: &str, value: &str) {
    let label = format!("{label}:");
    println!("{label:<16} {value}");
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!("{}", render_row(columns));
}

/// Print a table row, truncating cells that overflow their column
pub fn print_table_row(values: &[(&str, usize)]) {
    println!("{}", render_row(values));
}

fn render_row(cells: &[(&str, usize)]) -> String {
    let mut row = String::new();
    for (i, &(cell, width)) in cells.iter().enumerate() {
        if i > 0 {
            row.push_str("  ");
        }
        row.push_str(&format!("{:<width$}", fit(cell, width)));
    }
    row.trim_end().to_string()
}

/// Shorten `cell` to `width` characters, marking the cut with "..."
fn fit(cell: &str, width: usize) -> String {
    if width <= 3 || cell.chars().count() <= width {
        return cell.to_string();
    }
    let mut out: String = cell.chars().take(width - 3).collect();
    out.push_str("...");
    out
}
