//! Non-fatal records of what normalization and coercion did to each column.

use std::fmt;

use serde::Serialize;

use crate::schema::{ColumnType, TypeTag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Whitespace-only cells replaced by null.
    Normalized {
        table: String,
        column: String,
        replaced: usize,
    },
    /// Nulls in an optional text column filled with a literal.
    Filled {
        table: String,
        column: String,
        filled: usize,
    },
    /// A schema entry named a column the table does not have.
    MissingColumn { table: String, column: String },
    /// A fill targeted a column whose values are not text.
    FillSkipped {
        table: String,
        column: String,
        column_type: ColumnType,
    },
    Cast {
        table: String,
        column: String,
        column_type: ColumnType,
        nulls: usize,
    },
    /// The column could not be represented in the target type and was left as is.
    CastFailure {
        table: String,
        column: String,
        target: TypeTag,
        detail: String,
    },
    /// `coerced` counts values that were present but unparseable.
    DateCast {
        table: String,
        column: String,
        nulls: usize,
        coerced: usize,
    },
    DateColumnMissing { table: String, column: String },
}

impl Diagnostic {
    /// True for records that signal a schema/data mismatch worth a warning.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Diagnostic::MissingColumn { .. }
                | Diagnostic::FillSkipped { .. }
                | Diagnostic::CastFailure { .. }
                | Diagnostic::DateColumnMissing { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Normalized {
                table,
                column,
                replaced,
            } => write!(
                f,
                "{table}.{column}: {replaced} blank cell(s) replaced with null"
            ),
            Diagnostic::Filled {
                table,
                column,
                filled,
            } => write!(f, "{table}.{column}: {filled} null(s) filled"),
            Diagnostic::MissingColumn { table, column } => {
                write!(f, "{table}.{column}: column does not exist")
            }
            Diagnostic::FillSkipped {
                table,
                column,
                column_type,
            } => write!(
                f,
                "{table}.{column}: fill skipped, column holds {column_type} values"
            ),
            Diagnostic::Cast {
                table,
                column,
                column_type,
                nulls,
            } => write!(f, "{table}.{column}: converted to {column_type}, {nulls} null(s)"),
            Diagnostic::CastFailure {
                table,
                column,
                target,
                detail,
            } => write!(
                f,
                "{table}.{column}: could not convert to {target}: {detail}"
            ),
            Diagnostic::DateCast {
                table,
                column,
                nulls,
                coerced,
            } => write!(
                f,
                "{table}.{column}: converted to datetime, {nulls} null(s) ({coerced} unparseable)"
            ),
            Diagnostic::DateColumnMissing { table, column } => {
                write!(f, "{table}.{column}: could not convert to datetime, column does not exist")
            }
        }
    }
}
