//! Duplicate-row diagnostics.
//!
//! Two classes are measured: full-row duplicates (every column equal, primary
//! key included) and business-key duplicates (every column equal except the
//! leading primary key). Both mark every member of a duplicated group, so two
//! identical rows count as two. The table is never modified.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    data::ValueKey,
    dataset::{Table, TableRegistry},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    pub table: String,
    pub rows: usize,
    /// Rows with at least one identical twin.
    pub full_row: Vec<usize>,
    /// Rows beyond the first of each full-row group.
    pub full_row_extra: usize,
    /// Rows sharing every non-key column with at least one other row.
    pub business_key: Vec<usize>,
    pub business_key_extra: usize,
}

impl DuplicateReport {
    pub fn full_row_count(&self) -> usize {
        self.full_row.len()
    }

    pub fn business_key_count(&self) -> usize {
        self.business_key.len()
    }
}

pub fn analyze(table: &Table) -> DuplicateReport {
    let (full_row, full_row_extra) = duplicated_rows(table, 0);
    // A table with a single column has nothing left once the key is dropped.
    let (business_key, business_key_extra) = if table.column_count() > 1 {
        duplicated_rows(table, 1)
    } else {
        (Vec::new(), 0)
    };
    DuplicateReport {
        table: table.name.clone(),
        rows: table.row_count(),
        full_row,
        full_row_extra,
        business_key,
        business_key_extra,
    }
}

pub fn analyze_registry(registry: &TableRegistry) -> Vec<DuplicateReport> {
    registry.iter().map(analyze).collect()
}

/// Returns the sorted indices of rows in duplicated groups plus the number of
/// rows past the first in each group, comparing columns from `start` onward.
fn duplicated_rows(table: &Table, start: usize) -> (Vec<usize>, usize) {
    let mut groups: HashMap<Vec<ValueKey>, Vec<usize>> = HashMap::new();
    for row in 0..table.row_count() {
        groups.entry(table.row_key(row, start)).or_default().push(row);
    }
    let mut marked = Vec::new();
    let mut extra = 0usize;
    for members in groups.into_values().filter(|members| members.len() > 1) {
        extra += members.len() - 1;
        marked.extend(members);
    }
    marked.sort_unstable();
    (marked, extra)
}
