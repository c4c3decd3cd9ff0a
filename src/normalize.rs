//! Null canonicalization and default filling.
//!
//! Blank text hides missing values from type inference and from null counts,
//! so it is replaced with the null marker before any cast runs. The pass only
//! looks at textual cells and is idempotent.

use crate::{
    data::Value,
    dataset::{Table, TableRegistry},
    diagnostics::Diagnostic,
    schema::FillDefault,
};

/// Replaces whitespace-only (including empty) text cells with null.
///
/// Returns one [`Diagnostic::Normalized`] per column that changed.
pub fn normalize_table(table: &mut Table) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for column in &mut table.columns {
        let mut replaced = 0usize;
        for cell in &mut column.values {
            if cell.as_ref().is_some_and(Value::is_blank_text) {
                *cell = None;
                replaced += 1;
            }
        }
        if replaced > 0 {
            diagnostics.push(Diagnostic::Normalized {
                table: table.name.clone(),
                column: column.name.clone(),
                replaced,
            });
        }
    }
    diagnostics
}

pub fn normalize_registry(registry: &mut TableRegistry) -> Vec<Diagnostic> {
    registry.iter_mut().flat_map(normalize_table).collect()
}

/// Fills nulls in the named columns with their literal default.
///
/// Only textual columns are filled. A fill aimed at a numeric, boolean or
/// datetime column is skipped with a [`Diagnostic::FillSkipped`] warning.
pub fn fill_defaults(table: &mut Table, fills: &[FillDefault]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::with_capacity(fills.len());
    for fill in fills {
        let Some(column) = table.column_mut(&fill.column) else {
            diagnostics.push(Diagnostic::MissingColumn {
                table: table.name.clone(),
                column: fill.column.clone(),
            });
            continue;
        };
        let column_type = column.column_type;
        if !column_type.is_textual() {
            diagnostics.push(Diagnostic::FillSkipped {
                table: table.name.clone(),
                column: fill.column.clone(),
                column_type,
            });
            continue;
        }
        let mut filled = 0usize;
        for cell in column.values.iter_mut().filter(|cell| cell.is_none()) {
            *cell = Some(Value::String(fill.value.clone()));
            filled += 1;
        }
        diagnostics.push(Diagnostic::Filled {
            table: table.name.clone(),
            column: fill.column.clone(),
            filled,
        });
    }
    diagnostics
}
