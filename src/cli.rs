use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{aggregate::DEFAULT_TOP_CLIENTS, io_utils::parse_delimiter, persist::ParquetCompression};

#[derive(Debug, Parser)]
#[command(author, version, about = "Clean, aggregate and export the e-commerce CSV dataset", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write cleaned tables and aggregates
    Run(RunArgs),
    /// List the ecommerce_*.csv sources found in a data directory
    Discover(DiscoverArgs),
    /// Write the built-in schema configuration as YAML for editing
    Schema(SchemaArgs),
    /// Report duplicate rows per table after cleaning
    Duplicates(DuplicatesArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Directory holding the ecommerce_<table>.csv files
    #[arg(short, long = "data", default_value = "data")]
    pub data: PathBuf,
    /// Schema configuration replacing the built-in casts
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Directory receiving the cleaned tables and aggregates
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,
    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Number of top-spending clients to print
    #[arg(long = "top-clients", default_value_t = DEFAULT_TOP_CLIENTS)]
    pub top_clients: usize,
    /// Parquet compression codec
    #[arg(long, value_enum, default_value_t = ParquetCompression::Snappy)]
    pub compression: ParquetCompression,
    /// Print the first N rows of every table after loading
    #[arg(long)]
    pub preview: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Directory to scan
    #[arg(short, long = "data", default_value = "data")]
    pub data: PathBuf,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Destination YAML file; printed to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}
