//! Run-level failures.
//!
//! Per-column problems never surface here; they are returned as
//! [`Diagnostic`](crate::diagnostics::Diagnostic) values. Everything in
//! [`EtlError`] aborts the run (or, for aggregates, the aggregate being
//! computed).

use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Required source for table '{table}' not found at {path:?}")]
    MissingSource { table: String, path: PathBuf },

    #[error("Failed to load table '{table}' from {path:?}")]
    Load {
        table: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Invalid schema configuration: {0}")]
    InvalidSchema(String),

    #[error("Table '{0}' is not registered")]
    MissingTable(String),

    #[error("Table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Column '{column}' in table '{table}' must be {expected} but is {found}")]
    ColumnType {
        table: String,
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Cannot compute {aggregate}: table '{table}' has no rows")]
    EmptyAggregationInput {
        aggregate: &'static str,
        table: String,
    },

    #[error("Failed to persist '{table}' as {format}")]
    Persistence {
        table: String,
        format: &'static str,
        #[source]
        source: BoxError,
    },
}

impl EtlError {
    pub fn persistence(table: &str, format: &'static str, err: anyhow::Error) -> Self {
        EtlError::Persistence {
            table: table.to_string(),
            format,
            source: err.into(),
        }
    }

    pub fn load(table: &str, path: PathBuf, err: anyhow::Error) -> Self {
        EtlError::Load {
            table: table.to_string(),
            path,
            source: err.into(),
        }
    }
}

pub type EtlResult<T> = std::result::Result<T, EtlError>;
