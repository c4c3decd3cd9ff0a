//! Schema-driven column casts and the permissive date pass.
//!
//! Casts are all-or-nothing per column: values are converted into a fresh
//! buffer that replaces the column only when every value converted. A failure
//! leaves the column exactly as it was and is reported as a
//! [`Diagnostic::CastFailure`]. Nulls stay null under every cast.
//!
//! The date pass is lenient instead: unparseable values become null and are
//! counted.

use thiserror::Error;

use crate::{
    data::{
        Value, coerce_temporal, float_to_exact_i64, parse_boolean_token, parse_temporal,
        truncate_subsecs,
    },
    dataset::{Column, Table},
    diagnostics::Diagnostic,
    schema::{ColumnCast, ColumnType, TypeTag},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value '{value}' at row {row} cannot be represented as {target}: {reason}")]
pub struct CastError {
    pub row: usize,
    pub value: String,
    pub target: TypeTag,
    pub reason: String,
}

/// Converts every value of `column` to `tag`, or reports the first value that
/// does not fit.
pub fn cast_column(column: &Column, tag: TypeTag) -> Result<Column, CastError> {
    let values = column
        .values
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            None => Ok(None),
            Some(value) => convert_value(value, tag).map(Some).map_err(|reason| CastError {
                row,
                value: value.as_display(),
                target: tag,
                reason,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Column::new(column.name.clone(), tag.column_type(), values))
}

fn convert_value(value: &Value, tag: TypeTag) -> Result<Value, String> {
    match tag {
        TypeTag::String | TypeTag::Category => Ok(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.as_display()),
        }),
        TypeTag::NullableInt => match value {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Float(f) => float_to_exact_i64(*f)
                .map(Value::Integer)
                .ok_or_else(|| "non-integral float".to_string()),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|err| err.to_string()),
            Value::DateTime(_) => Err("datetime values have no integer form".to_string()),
        },
        TypeTag::Float => match value {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|err| err.to_string()),
            Value::DateTime(_) => Err("datetime values have no float form".to_string()),
        },
        TypeTag::NullableBool => match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::Integer(0) => Ok(Value::Boolean(false)),
            Value::Integer(1) => Ok(Value::Boolean(true)),
            Value::Float(f) if *f == 0.0 => Ok(Value::Boolean(false)),
            Value::Float(f) if *f == 1.0 => Ok(Value::Boolean(true)),
            Value::String(s) => parse_boolean_token(s)
                .map(Value::Boolean)
                .ok_or_else(|| "not a recognised boolean token".to_string()),
            _ => Err("only 0 and 1 map onto booleans".to_string()),
        },
        TypeTag::Date => match value {
            Value::DateTime(dt) => Ok(Value::DateTime(truncate_subsecs(*dt))),
            Value::String(s) => parse_temporal(s)
                .map(Value::DateTime)
                .map_err(|err| err.to_string()),
            _ => Err("only text parses as a date".to_string()),
        },
    }
}

/// Applies each cast in declaration order. Never fails; every outcome is a
/// returned diagnostic.
pub fn cast_columns(table: &mut Table, casts: &[ColumnCast], table_name: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::with_capacity(casts.len());
    for cast in casts {
        let Some(column) = table.column_mut(&cast.column) else {
            diagnostics.push(Diagnostic::MissingColumn {
                table: table_name.to_string(),
                column: cast.column.clone(),
            });
            continue;
        };
        match cast_column(column, cast.tag) {
            Ok(coerced) => {
                let nulls = coerced.null_count();
                let column_type = coerced.column_type;
                *column = coerced;
                diagnostics.push(Diagnostic::Cast {
                    table: table_name.to_string(),
                    column: cast.column.clone(),
                    column_type,
                    nulls,
                });
            }
            Err(err) => diagnostics.push(Diagnostic::CastFailure {
                table: table_name.to_string(),
                column: cast.column.clone(),
                target: cast.tag,
                detail: err.to_string(),
            }),
        }
    }
    diagnostics
}

/// Parses the listed columns as dates, turning unparseable values into null.
pub fn cast_dates(table: &mut Table, columns: &[String], table_name: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::with_capacity(columns.len());
    for name in columns {
        let Some(column) = table.column_mut(name) else {
            diagnostics.push(Diagnostic::DateColumnMissing {
                table: table_name.to_string(),
                column: name.clone(),
            });
            continue;
        };
        let mut coerced = 0usize;
        for cell in &mut column.values {
            if let Some(value) = cell.take() {
                match coerce_temporal(&value) {
                    Some(dt) => *cell = Some(Value::DateTime(dt)),
                    None => coerced += 1,
                }
            }
        }
        column.column_type = ColumnType::DateTime;
        diagnostics.push(Diagnostic::DateCast {
            table: table_name.to_string(),
            column: name.clone(),
            nulls: column.null_count(),
            coerced,
        });
    }
    diagnostics
}
