use crate::types::ColumnType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid integer pattern"))
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$")
            .expect("valid decimal pattern")
    })
}

/// A single parsed CSV field.
///
/// Produced by classifying the raw text of a field; nulls (empty fields)
/// are represented as `None` at the call sites rather than as a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Integer(i64),
    /// Kept as the original digits so loading never rounds.
    Decimal(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    /// Classify a raw field. Empty fields are null.
    pub fn parse(raw: &str) -> Option<CellValue> {
        if raw.is_empty() {
            return None;
        }
        let trimmed = raw.trim();
        if let Some(v) = parse_integer(trimmed) {
            return Some(CellValue::Integer(v));
        }
        if is_decimal(trimmed) {
            return Some(CellValue::Decimal(trimmed.to_string()));
        }
        if let Some(ts) = parse_timestamp(trimmed) {
            return Some(CellValue::Timestamp(ts));
        }
        if let Some(d) = parse_date(trimmed) {
            return Some(CellValue::Date(d));
        }
        Some(CellValue::Text(raw.to_string()))
    }

    /// Convert a raw field into a value of the given column type, the way
    /// a storage engine coerces text during a bulk load.
    pub fn coerce(raw: &str, column_type: ColumnType) -> std::result::Result<Option<CellValue>, String> {
        if raw.is_empty() {
            return Ok(None);
        }
        let trimmed = raw.trim();
        let value = match column_type {
            ColumnType::Integer => parse_integer(trimmed).map(CellValue::Integer),
            ColumnType::Decimal => {
                if is_decimal(trimmed) {
                    Some(CellValue::Decimal(trimmed.to_string()))
                } else {
                    None
                }
            }
            ColumnType::Timestamp => parse_timestamp(trimmed).map(CellValue::Timestamp),
            ColumnType::Date => parse_date(trimmed).map(CellValue::Date),
            ColumnType::Text => Some(CellValue::Text(raw.to_string())),
        };
        value
            .map(Some)
            .ok_or_else(|| format!("invalid input syntax for type {}: \"{}\"", column_type, raw))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CellValue::Integer(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Decimal(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, CellValue::Timestamp(_))
    }

    pub fn is_date(&self) -> bool {
        matches!(self, CellValue::Date(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Decimal(v) => write!(f, "{}", v),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    if !integer_pattern().is_match(s) {
        return None;
    }
    // Overflowing digit strings fall through to decimal.
    s.parse::<i64>().ok()
}

fn is_decimal(s: &str) -> bool {
    decimal_pattern().is_match(s)
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// One data row as stored: a null is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Option<CellValue>>,
}

impl Row {
    pub fn new(values: Vec<Option<CellValue>>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.values.get(index).and_then(|v| v.as_ref())
    }
}
