pub mod aggregate;
pub mod cli;
pub mod coerce;
pub mod data;
pub mod dataset;
pub mod diagnostics;
pub mod duplicates;
pub mod error;
pub mod io_utils;
pub mod load;
pub mod normalize;
pub mod persist;
pub mod pipeline;
pub mod render;
pub mod schema;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    aggregate::Aggregates,
    cli::{Cli, Commands, SourceArgs},
    dataset::{Column, Table},
    duplicates::DuplicateReport,
    load::LoadOptions,
    persist::DualPersister,
    pipeline::PipelineOptions,
    schema::{ColumnType, SchemaConfig},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("shopclean", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Discover(args) => handle_discover(&args),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Duplicates(args) => handle_duplicates(&args),
    }
}

fn load_schema(path: Option<&Path>) -> Result<SchemaConfig> {
    let schema = match path {
        Some(path) => SchemaConfig::load(path)?,
        None => SchemaConfig::default(),
    };
    schema.validate()?;
    Ok(schema)
}

fn load_options(source: &SourceArgs) -> Result<LoadOptions> {
    Ok(LoadOptions {
        delimiter: source.delimiter,
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
    })
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let mut options = PipelineOptions::new(&args.source.data, &args.output);
    options.schema = load_schema(args.source.schema.as_deref())?;
    options.load = load_options(&args.source)?;
    options.compression = args.compression;
    options.top_clients = args.top_clients;
    info!(
        "Reading sources from {:?} with delimiter '{}'",
        options.data_dir,
        options
            .load
            .delimiter
            .map(io_utils::printable_delimiter)
            .unwrap_or_else(|| "auto".to_string())
    );

    pipeline::precheck(&options.data_dir);
    let registry = pipeline::load_stage(&options.data_dir, &options.load)?;
    if let Some(rows) = args.preview {
        for table in registry.iter() {
            println!("{} ({} rows)", table.name, table.row_count());
            render::print_table(table, Some(rows));
            println!();
        }
    }
    let persister = DualPersister::new(
        &options.output_dir,
        options.output_delimiter,
        options.compression,
    );
    let report = pipeline::process(registry, &options, &persister)?;

    print_aggregates(&report.aggregates, options.top_clients);
    let warnings = report.warnings().count();
    if warnings > 0 {
        info!("{warnings} column warning(s); see log above or the run report");
    }
    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Serializing run report")?;
        fs::write(path, json).with_context(|| format!("Writing run report to {path:?}"))?;
        info!("Run report written to {path:?}");
    }
    info!(
        "Wrote {} file(s) to {:?}",
        report.outputs.len(),
        options.output_dir
    );
    Ok(())
}

fn print_aggregates(aggregates: &Aggregates, top_clients: usize) {
    let mut top = aggregates.sales_per_client_table();
    for column in &mut top.columns {
        column.values.truncate(top_clients);
    }
    println!("Top {top_clients} clients by total spend");
    render::print_table(&top, None);
    println!();
    println!("Most sold product");
    render::print_table(&aggregates.most_sold_product_table(), None);
    println!();
    println!("Sales per month");
    render::print_table(&aggregates.sales_per_month_table(), None);
}

fn handle_discover(args: &cli::DiscoverArgs) -> Result<()> {
    let found = load::discover(&args.data)?;
    for path in &found {
        println!("{}", path.display());
    }
    info!("{} source file(s) in {:?}", found.len(), args.data);
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let schema = SchemaConfig::default();
    match &args.output {
        Some(path) => {
            schema.save(path)?;
            info!("Schema configuration written to {path:?}");
        }
        None => print!("{}", schema.to_yaml_string()?),
    }
    Ok(())
}

fn handle_duplicates(args: &cli::DuplicatesArgs) -> Result<()> {
    let schema = load_schema(args.source.schema.as_deref())?;
    let options = load_options(&args.source)?;
    let mut registry = pipeline::load_stage(&args.source.data, &options)?;
    pipeline::prepare(&mut registry, &schema);
    let reports = pipeline::duplicates_stage(&registry);
    render::print_table(&duplicate_summary(&reports)?, None);
    Ok(())
}

fn duplicate_summary(reports: &[DuplicateReport]) -> Result<Table> {
    let count = |f: fn(&DuplicateReport) -> usize| {
        reports
            .iter()
            .map(|r| Some(data::Value::Integer(f(r) as i64)))
            .collect::<Vec<_>>()
    };
    Table::new(
        "duplicates",
        vec![
            Column::new(
                "table",
                ColumnType::String,
                reports
                    .iter()
                    .map(|r| Some(data::Value::String(r.table.clone())))
                    .collect(),
            ),
            Column::new("rows", ColumnType::Integer, count(|r| r.rows)),
            Column::new("full_row", ColumnType::Integer, count(|r| r.full_row_count())),
            Column::new("business_key", ColumnType::Integer, count(|r| r.business_key_count())),
        ],
    )
}
