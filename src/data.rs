use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Fractional-second digits kept on datetimes; the columnar output stores
/// microseconds.
const DATETIME_SUBSEC_DIGITS: u16 = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            // `Display` for f64 is the shortest representation that parses back
            // to the same bits, so flat files reload losslessly.
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_DISPLAY_FORMAT).to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, Value::String(s) if s.trim().is_empty())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Hashable stand-in for an optional cell, used for grouping, joins and
/// duplicate detection.
///
/// Nulls compare equal to each other. Integral floats collapse onto the
/// integer key so that an id column read as float (because it contains
/// nulls) still matches the same id stored as an integer elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(u64),
    String(String),
    DateTime(NaiveDateTime),
}

impl ValueKey {
    pub fn from_cell(cell: Option<&Value>) -> Self {
        match cell {
            None => ValueKey::Null,
            Some(Value::String(s)) => ValueKey::String(s.clone()),
            Some(Value::Integer(i)) => ValueKey::Integer(*i),
            Some(Value::Float(f)) => match float_to_exact_i64(*f) {
                Some(i) => ValueKey::Integer(i),
                None => ValueKey::Float(f.to_bits()),
            },
            Some(Value::Boolean(b)) => ValueKey::Boolean(*b),
            Some(Value::DateTime(dt)) => ValueKey::DateTime(*dt),
        }
    }
}

pub fn float_to_exact_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64
    {
        Some(value as i64)
    } else {
        None
    }
}

pub fn parse_boolean_token(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    // Month-first wins for ambiguous slash-separated dates.
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Parses a calendar date or timestamp in any of the accepted layouts.
///
/// Offsets are normalized to UTC; date-only values land on midnight.
pub fn parse_temporal(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    let parsed = if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        parsed.naive_utc()
    } else if let Ok(parsed) = parse_naive_datetime(trimmed) {
        parsed
    } else {
        parse_naive_date(trimmed)
            .map(|date| date.and_time(chrono::NaiveTime::MIN))
            .map_err(|_| anyhow!("Failed to parse '{value}' as date or datetime"))?
    };
    Ok(truncate_subsecs(parsed))
}

pub fn truncate_subsecs(value: NaiveDateTime) -> NaiveDateTime {
    value.trunc_subsecs(DATETIME_SUBSEC_DIGITS)
}

/// Lenient variant of [`parse_temporal`]: anything unparseable is `None`.
pub fn coerce_temporal(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(truncate_subsecs(*dt)),
        Value::String(s) => parse_temporal(s).ok(),
        _ => None,
    }
}
