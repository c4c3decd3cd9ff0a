//! Source discovery and CSV loading.
//!
//! Each source is read fully into a [`Table`]. Empty fields are null; every
//! other field is kept verbatim, whitespace included, so the normalizer sees
//! camouflaged blanks. Column types are inferred from the non-null cells:
//!
//! - all integers and no nulls: `integer`
//! - all integers or floats: `float` (an integer column with gaps lands here)
//! - all `true`/`false` and no nulls: `boolean`
//! - anything else, or no values at all: `text`

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;

use crate::{
    data::Value,
    dataset::{Column, Table, TableRegistry},
    error::{EtlError, EtlResult},
    io_utils,
    schema::ColumnType,
};

pub const SOURCE_PREFIX: &str = "ecommerce_";
pub const SOURCE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

pub fn source_path(data_dir: &Path, table: &str) -> PathBuf {
    data_dir.join(format!("{SOURCE_PREFIX}{table}.{SOURCE_EXTENSION}"))
}

/// Lists `ecommerce_*.csv` files in `data_dir`, sorted by name.
pub fn discover(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(data_dir).with_context(|| format!("Reading data directory {data_dir:?}"))?;
    let mut found = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Listing data directory {data_dir:?}"))?
            .path();
        let matches = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SOURCE_PREFIX))
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if matches {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Loads every named table, failing before any read if a source is absent.
pub fn load_registry(
    data_dir: &Path,
    tables: &[&str],
    options: &LoadOptions,
) -> EtlResult<TableRegistry> {
    for table in tables {
        let path = source_path(data_dir, table);
        if !path.is_file() {
            return Err(EtlError::MissingSource {
                table: table.to_string(),
                path,
            });
        }
    }
    let mut registry = TableRegistry::new();
    for table in tables {
        let path = source_path(data_dir, table);
        let loaded =
            read_table(&path, table, options).map_err(|err| EtlError::load(table, path, err))?;
        registry.insert(loaded);
    }
    Ok(registry)
}

pub fn read_table(path: &Path, name: &str, options: &LoadOptions) -> Result<Table> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)?;

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        for (cells, field) in raw.iter_mut().zip(decoded) {
            cells.push((!field.is_empty()).then_some(field));
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(header, cells)| infer_column(header, cells))
        .collect();
    Table::new(name, columns)
}

fn infer_column(name: String, cells: Vec<Option<String>>) -> Column {
    let has_nulls = cells.iter().any(Option::is_none);
    let present = || cells.iter().flatten();
    if present().next().is_none() {
        return Column::new(name, ColumnType::Text, vec![None; cells.len()]);
    }

    if present().all(|cell| cell.parse::<i64>().is_ok()) {
        let parse = |cell: &String| cell.parse::<i64>().ok();
        return if has_nulls {
            let values = cells
                .iter()
                .map(|cell| cell.as_ref().and_then(parse).map(|i| Value::Float(i as f64)))
                .collect();
            Column::new(name, ColumnType::Float, values)
        } else {
            let values = cells
                .iter()
                .map(|cell| cell.as_ref().and_then(parse).map(Value::Integer))
                .collect();
            Column::new(name, ColumnType::Integer, values)
        };
    }

    if present().all(|cell| cell.parse::<f64>().is_ok()) {
        let values = cells
            .iter()
            .map(|cell| cell.as_ref().and_then(|c| c.parse::<f64>().ok()).map(Value::Float))
            .collect();
        return Column::new(name, ColumnType::Float, values);
    }

    if !has_nulls && present().all(|cell| boolean_literal(cell).is_some()) {
        let values = cells
            .iter()
            .map(|cell| cell.as_deref().and_then(boolean_literal).map(Value::Boolean))
            .collect();
        return Column::new(name, ColumnType::Boolean, values);
    }

    let values = cells.into_iter().map(|cell| cell.map(Value::String)).collect();
    Column::new(name, ColumnType::Text, values)
}

fn boolean_literal(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect()
    }

    #[test]
    fn integer_columns_with_gaps_become_float() {
        let column = infer_column("promotion_id".into(), cells(&["3", "", "7"]));
        assert_eq!(column.column_type, ColumnType::Float);
        assert_eq!(
            column.values,
            vec![Some(Value::Float(3.0)), None, Some(Value::Float(7.0))]
        );
    }

    #[test]
    fn dense_integer_columns_stay_integer() {
        let column = infer_column("order_id".into(), cells(&["1", "2"]));
        assert_eq!(column.column_type, ColumnType::Integer);
    }

    #[test]
    fn whitespace_cells_keep_columns_textual() {
        let column = infer_column("quantity".into(), cells(&["1", " ", "3"]));
        assert_eq!(column.column_type, ColumnType::Text);
        assert_eq!(column.values[1], Some(Value::String(" ".into())));
    }

    #[test]
    fn booleans_with_gaps_stay_textual() {
        let dense = infer_column("is_active".into(), cells(&["True", "false"]));
        assert_eq!(dense.column_type, ColumnType::Boolean);
        let sparse = infer_column("is_active".into(), cells(&["True", ""]));
        assert_eq!(sparse.column_type, ColumnType::Text);
    }

    #[test]
    fn all_null_columns_are_text() {
        let column = infer_column("notes".into(), cells(&["", ""]));
        assert_eq!(column.column_type, ColumnType::Text);
        assert_eq!(column.null_count(), 2);
    }

    #[test]
    fn discover_lists_matching_sources_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ecommerce_orders.csv", "ecommerce_brands.csv", "notes.txt", "orders.csv"] {
            fs::write(dir.path().join(name), "id\n1\n").unwrap();
        }
        let found = discover(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ecommerce_brands.csv", "ecommerce_orders.csv"]);
    }

    #[test]
    fn missing_source_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(source_path(dir.path(), "orders"), "order_id\n1\n").unwrap();
        let err = load_registry(dir.path(), &["orders", "brands"], &LoadOptions::default())
            .unwrap_err();
        match err {
            EtlError::MissingSource { table, .. } => assert_eq!(table, "brands"),
            other => panic!("expected missing source, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(source_path(dir.path(), "brands"), "brand_id,name\n1,Acme\n2\n").unwrap();
        let err = load_registry(dir.path(), &["brands"], &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, EtlError::Load { .. }));
    }

    #[test]
    fn read_table_preserves_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = source_path(dir.path(), "brands");
        fs::write(&path, "brand_id,brand_name,website\n1,Acme,\n2,  ,acme.io\n").unwrap();
        let table = read_table(&path, "brands", &LoadOptions::default()).unwrap();
        assert_eq!(table.headers(), vec!["brand_id", "brand_name", "website"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 2), None);
        assert_eq!(table.cell(1, 1), Some(&Value::String("  ".into())));
    }
}
