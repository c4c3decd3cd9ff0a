//! The ordered batch run: load, normalize, fill, coerce, inspect duplicates,
//! aggregate, persist.
//!
//! Each stage is a plain function over the [`TableRegistry`] so it can be
//! exercised on synthetic tables. Only this module and the CLI log.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    aggregate::{Aggregates, ClientSpending, DEFAULT_TOP_CLIENTS},
    coerce,
    dataset::TableRegistry,
    diagnostics::Diagnostic,
    duplicates::{self, DuplicateReport},
    error::EtlResult,
    load::{self, LoadOptions},
    normalize,
    persist::{DualPersister, ParquetCompression, Persister},
    schema::{SchemaConfig, TABLE_NAMES},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Normalize,
    Fill,
    Coerce,
    Duplicates,
    Aggregate,
    Persist,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::Load,
        Stage::Normalize,
        Stage::Fill,
        Stage::Coerce,
        Stage::Duplicates,
        Stage::Aggregate,
        Stage::Persist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Fill => "fill",
            Stage::Coerce => "coerce",
            Stage::Duplicates => "duplicates",
            Stage::Aggregate => "aggregate",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub schema: SchemaConfig,
    pub load: LoadOptions,
    pub output_delimiter: u8,
    pub compression: ParquetCompression,
    pub top_clients: usize,
}

impl PipelineOptions {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            schema: SchemaConfig::default(),
            load: LoadOptions::default(),
            output_delimiter: crate::io_utils::DEFAULT_CSV_DELIMITER,
            compression: ParquetCompression::default(),
            top_clients: DEFAULT_TOP_CLIENTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableShape {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
}

/// Everything a run learned, serializable as the JSON run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tables: Vec<TableShape>,
    pub diagnostics: Vec<Diagnostic>,
    pub duplicates: Vec<DuplicateReport>,
    pub top_clients: Vec<ClientSpending>,
    pub aggregates: Aggregates,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }
}

pub fn shapes(registry: &TableRegistry) -> Vec<TableShape> {
    registry
        .iter()
        .map(|t| TableShape {
            table: t.name.clone(),
            rows: t.row_count(),
            columns: t.column_count(),
        })
        .collect()
}

/// Warns when the data directory holds no recognisable sources. Never fails;
/// the load stage decides what is actually missing.
pub fn precheck(data_dir: &Path) {
    match load::discover(data_dir) {
        Ok(found) if found.is_empty() => {
            warn!("No {}*.csv files found in {data_dir:?}", load::SOURCE_PREFIX)
        }
        Ok(found) => {
            info!("Discovered {} source file(s) in {data_dir:?}", found.len());
            for path in &found {
                debug!("Source: {path:?}");
            }
        }
        Err(err) => warn!("Discovery failed: {err:#}"),
    }
}

pub fn load_stage(data_dir: &Path, options: &LoadOptions) -> EtlResult<TableRegistry> {
    info!("Stage {}: reading {} table(s)", Stage::Load, TABLE_NAMES.len());
    let registry = load::load_registry(data_dir, &TABLE_NAMES, options)?;
    for shape in shapes(&registry) {
        info!("{}: {} rows, {} columns", shape.table, shape.rows, shape.columns);
    }
    Ok(registry)
}

pub fn normalize_stage(registry: &mut TableRegistry) -> Vec<Diagnostic> {
    info!("Stage {}", Stage::Normalize);
    normalize::normalize_registry(registry)
}

pub fn fill_stage(registry: &mut TableRegistry, schema: &SchemaConfig) -> Vec<Diagnostic> {
    info!("Stage {}", Stage::Fill);
    let mut diagnostics = Vec::new();
    for table in registry.iter_mut() {
        if let Some(table_schema) = schema.table(&table.name) {
            diagnostics.extend(normalize::fill_defaults(table, &table_schema.fill));
        }
    }
    diagnostics
}

/// Schema casts first, then the lenient date pass, table by table.
pub fn coerce_stage(registry: &mut TableRegistry, schema: &SchemaConfig) -> Vec<Diagnostic> {
    info!("Stage {}", Stage::Coerce);
    let mut diagnostics = Vec::new();
    for table in registry.iter_mut() {
        let Some(table_schema) = schema.table(&table.name) else {
            debug!("No casts configured for '{}'", table.name);
            continue;
        };
        let name = table.name.clone();
        diagnostics.extend(coerce::cast_columns(table, &table_schema.casts, &name));
        diagnostics.extend(coerce::cast_dates(table, &table_schema.date_columns, &name));
    }
    diagnostics
}

/// Normalize, fill and coerce: everything that runs before the registry is
/// read-only.
pub fn prepare(registry: &mut TableRegistry, schema: &SchemaConfig) -> Vec<Diagnostic> {
    let mut diagnostics = normalize_stage(registry);
    diagnostics.extend(fill_stage(registry, schema));
    diagnostics.extend(coerce_stage(registry, schema));
    log_diagnostics(&diagnostics);
    diagnostics
}

pub fn duplicates_stage(registry: &TableRegistry) -> Vec<DuplicateReport> {
    info!("Stage {}", Stage::Duplicates);
    let reports = duplicates::analyze_registry(registry);
    for report in &reports {
        info!(
            "{}: {} full-row duplicate(s), {} business-key duplicate(s)",
            report.table,
            report.full_row_count(),
            report.business_key_count()
        );
    }
    reports
}

pub fn aggregate_stage(registry: &TableRegistry) -> EtlResult<Aggregates> {
    info!("Stage {}", Stage::Aggregate);
    let aggregates = Aggregates::compute(registry)?;
    info!(
        "{} client(s), {} month(s) aggregated",
        aggregates.sales_per_client.len(),
        aggregates.sales_per_month.len()
    );
    Ok(aggregates)
}

/// Writes base tables as `<table>_clean` followed by the aggregate tables.
pub fn persist_stage(
    registry: &TableRegistry,
    aggregates: &Aggregates,
    persister: &dyn Persister,
) -> EtlResult<Vec<PathBuf>> {
    info!("Stage {}", Stage::Persist);
    let mut outputs = Vec::new();
    for table in registry.iter() {
        outputs.extend(persister.persist(&format!("{}_clean", table.name), table)?);
    }
    for table in aggregates.tables() {
        outputs.extend(persister.persist(&table.name, &table)?);
    }
    info!("Wrote {} file(s)", outputs.len());
    Ok(outputs)
}

/// Runs every stage after loading against an already loaded registry.
pub fn process(
    mut registry: TableRegistry,
    options: &PipelineOptions,
    persister: &dyn Persister,
) -> EtlResult<RunReport> {
    let diagnostics = prepare(&mut registry, &options.schema);
    let duplicates = duplicates_stage(&registry);
    let aggregates = aggregate_stage(&registry)?;
    let outputs = persist_stage(&registry, &aggregates, persister)?;
    Ok(RunReport {
        tables: shapes(&registry),
        diagnostics,
        duplicates,
        top_clients: aggregates.top_clients(options.top_clients).to_vec(),
        aggregates,
        outputs,
    })
}

pub fn run(options: &PipelineOptions) -> EtlResult<RunReport> {
    precheck(&options.data_dir);
    let registry = load_stage(&options.data_dir, &options.load)?;
    let persister = DualPersister::new(
        &options.output_dir,
        options.output_delimiter,
        options.compression,
    );
    process(registry, options, &persister)
}

pub fn log_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        if diagnostic.is_warning() {
            warn!("{diagnostic}");
        } else {
            debug!("{diagnostic}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        dataset::{Column, Table},
        schema::{ColumnType, TableSchema, TypeTag},
    };

    fn text(value: &str) -> Option<Value> {
        Some(Value::String(value.to_string()))
    }

    fn orders() -> Table {
        Table::new(
            "orders",
            vec![
                Column::new(
                    "order_id",
                    ColumnType::Integer,
                    vec![Some(Value::Integer(1)), Some(Value::Integer(2))],
                ),
                Column::new("notes", ColumnType::Text, vec![text("  "), text("ring")]),
                Column::new("status", ColumnType::Text, vec![text("shipped"), text(" ")]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn stages_run_in_declared_order() {
        let mut sorted = Stage::ORDER;
        sorted.sort();
        assert_eq!(sorted, Stage::ORDER);
        assert_eq!(Stage::ORDER.first(), Some(&Stage::Load));
        assert_eq!(Stage::ORDER.last(), Some(&Stage::Persist));
    }

    #[test]
    fn prepare_fills_blanks_after_normalizing() {
        let mut registry = TableRegistry::new();
        registry.insert(orders());
        let schema = SchemaConfig {
            tables: vec![
                TableSchema::new("orders")
                    .with_casts(&[("notes", TypeTag::String), ("status", TypeTag::Category)])
                    .with_fill("notes", "Sin notas"),
            ],
            ..SchemaConfig::default()
        };
        let diagnostics = prepare(&mut registry, &schema);
        let orders = registry.require("orders").unwrap();
        assert_eq!(orders.column("notes").unwrap().values[0], text("Sin notas"));
        let status = orders.column("status").unwrap();
        assert_eq!(status.column_type, ColumnType::Category);
        assert_eq!(status.values[1], None);
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Filled { filled: 1, .. }
        )));
    }
}
