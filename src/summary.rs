//! Text summaries of a loaded table: a short preview and a status block.

use crate::data::{ColumnKind, Table};
use std::fmt::Write as _;

/// Rows shown in a preview.
pub const PREVIEW_ROWS: usize = 5;
/// Numeric columns whose mean is listed in the info block.
pub const SUMMARY_COLUMNS: usize = 3;

/// Source, shape, column list and the first rows as an aligned text table.
pub fn preview(table: &Table, source: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", source);
    let _ = writeln!(out, "Shape: ({}, {})", table.row_count(), table.column_count());
    let _ = writeln!(out, "Columns: {}", table.column_names().join(", "));
    out.push('\n');
    out.push_str("First 5 rows:\n");
    out.push_str(&head(table, PREVIEW_ROWS));
    out
}

/// Status line, shape, columns and the mean of the first numeric columns.
pub fn info(status: &str, table: Option<&Table>) -> String {
    let mut out = format!("Status: {}\n", status);
    let Some(table) = table else {
        return out;
    };

    out.push('\n');
    let _ = writeln!(out, "Data Shape: ({}, {})", table.row_count(), table.column_count());
    let _ = writeln!(out, "Columns: {}", table.column_names().join(", "));

    let numeric: Vec<_> = table
        .columns_of_kind(ColumnKind::Numeric)
        .take(SUMMARY_COLUMNS)
        .collect();
    if !numeric.is_empty() {
        out.push_str("\nSummary Statistics:\n");
        for column in numeric {
            match column.mean() {
                Some(mean) => {
                    let _ = writeln!(out, "{}: μ={:.2}", column.name(), mean);
                }
                None => {
                    let _ = writeln!(out, "{}: μ=NaN", column.name());
                }
            }
        }
    }
    out
}

/// The first `n` rows, right-aligned under their headers with a row index.
pub fn head(table: &Table, n: usize) -> String {
    let rows = table.row_count().min(n);
    let index_width = rows.saturating_sub(1).to_string().len();

    let columns: Vec<(String, Vec<String>)> = table
        .columns()
        .iter()
        .map(|c| {
            let cells: Vec<String> = c.cells()[..rows].iter().map(|cell| cell.to_string()).collect();
            (c.name().to_string(), cells)
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|(name, cells)| {
            cells
                .iter()
                .map(|s| s.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let _ = write!(out, "{:width$}", "", width = index_width);
    for ((name, _), width) in columns.iter().zip(&widths) {
        let _ = write!(out, "  {:>width$}", name, width = *width);
    }
    out.push('\n');

    for row in 0..rows {
        let _ = write!(out, "{:<width$}", row, width = index_width);
        for ((_, cells), width) in columns.iter().zip(&widths) {
            let _ = write!(out, "  {:>width$}", cells[row], width = *width);
        }
        out.push('\n');
    }
    out
}
