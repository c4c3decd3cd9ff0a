//! In-memory tables and the registry that owns them for a run.
//!
//! Tables are stored column-major. A cell is `Option<Value>`; `None` is the
//! null marker. The first column of every table is its primary key.

use anyhow::{Result, ensure};

use crate::{
    data::{Value, ValueKey},
    error::{EtlError, EtlResult},
    schema::ColumnType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            column_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if let Some(first) = columns.first() {
            let rows = first.len();
            for column in &columns {
                ensure!(
                    column.len() == rows,
                    "Column '{}' in table '{}' has {} value(s) but '{}' has {}",
                    column.name,
                    name,
                    column.len(),
                    first.name,
                    rows
                );
            }
        }
        Ok(Self { name, columns })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Looks up a column an operation cannot proceed without.
    pub fn require_column(&self, name: &str) -> EtlResult<&Column> {
        self.column(name).ok_or_else(|| EtlError::MissingColumn {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.columns
            .get(column)
            .and_then(|c| c.values.get(row))
            .and_then(Option::as_ref)
    }

    pub fn row(&self, row: usize) -> Vec<Option<&Value>> {
        self.columns
            .iter()
            .map(|c| c.values.get(row).and_then(Option::as_ref))
            .collect()
    }

    /// Hashable key for `row` built from the columns from `start` onward.
    pub fn row_key(&self, row: usize, start: usize) -> Vec<ValueKey> {
        self.columns
            .iter()
            .skip(start)
            .map(|c| ValueKey::from_cell(c.values.get(row).and_then(Option::as_ref)))
            .collect()
    }

    /// Renders rows as display strings, nulls as empty cells.
    pub fn display_rows(&self, limit: Option<usize>) -> Vec<Vec<String>> {
        let rows = limit.map_or(self.row_count(), |l| l.min(self.row_count()));
        (0..rows)
            .map(|row| {
                self.row(row)
                    .into_iter()
                    .map(|cell| cell.map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Named tables owned by one pipeline run, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: Vec<Table>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `table`, replacing any table already registered under its name.
    pub fn insert(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn require(&self, name: &str) -> EtlResult<&Table> {
        self.get(name)
            .ok_or_else(|| EtlError::MissingTable(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
