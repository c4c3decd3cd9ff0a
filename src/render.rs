//! Aligned plain-text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::dataset::Table;

const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Renders `rows` under `headers`; numeric columns are right-aligned when
/// `aligns` says so. Missing alignments default to left.
pub fn render(headers: &[String], rows: &[Vec<String>], aligns: &[Align]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }
    let align = |idx: usize| aligns.get(idx).copied().unwrap_or(Align::Left);

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths, &align));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    let rule_widths: Vec<usize> = widths.iter().map(|w| (*w).max(3)).collect();
    let _ = writeln!(output, "{}", format_line(&rule, &rule_widths, &|_| Align::Left));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths, &align));
    }
    output
}

/// Renders the first `limit` rows of a table, nulls as empty cells.
pub fn render_table(table: &Table, limit: Option<usize>) -> String {
    let aligns: Vec<Align> = table
        .columns
        .iter()
        .map(|c| {
            if c.column_type.is_numeric() {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect();
    render(&table.headers(), &table.display_rows(limit), &aligns)
}

pub fn print_table(table: &Table, limit: Option<usize>) {
    print!("{}", render_table(table, limit));
}

fn format_line(cells: &[String], widths: &[usize], align: &dyn Fn(usize) -> Align) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (cell, width))| {
            let cell = flatten(cell);
            match align(idx) {
                Align::Left => format!("{cell:<width$}"),
                Align::Right => format!("{cell:>width$}"),
            }
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.trim_end().to_string()
}

/// Control characters would break the grid.
fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
