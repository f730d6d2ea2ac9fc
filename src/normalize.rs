//! Conversion of loosely-typed inputs into plain transport-safe primitives.
//!
//! Table cells arrive as text, JSON payload fields arrive as arbitrary `serde_json::Value`s,
//! and ratios can be infinite. Everything that ends up in a response passes through here
//! first so the report never carries a value JSON cannot represent.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A single normalized table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parses a raw CSV cell. Empty cells and the usual NaN spellings become `Null`.
    pub fn parse(raw: &str) -> Self {
        let cell = raw.trim();
        if cell.is_empty() || matches!(cell, "NaN" | "nan" | "NULL" | "null" | "None") {
            return Scalar::Null;
        }
        if let Ok(int) = cell.parse::<i64>() {
            return Scalar::Int(int);
        }
        if let Ok(float) = cell.parse::<f64>() {
            if float.is_finite() {
                return Scalar::Float(float);
            }
        }
        match cell {
            "True" | "true" => Scalar::Bool(true),
            "False" | "false" => Scalar::Bool(false),
            _ => Scalar::Text(cell.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the cell; booleans count as 1/0, text and nulls have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Scalar::Null | Scalar::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, ""),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Why a payload value could not be used as a model feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValueError {
    NotNumeric(String),
    NonFinite,
}

impl fmt::Display for FeatureValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValueError::NotNumeric(raw) => write!(f, "'{}' is not a number", raw),
            FeatureValueError::NonFinite => write!(f, "value must be finite"),
        }
    }
}

/// Coerces a JSON payload field to a feature value.
///
/// Numbers pass through, booleans map to 1/0, numeric strings are parsed, and null is 0.
/// Arrays, objects and non-numeric strings are rejected.
pub fn feature_value(value: &Value) -> Result<f64, FeatureValueError> {
    let number = match value {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FeatureValueError::NotNumeric(n.to_string()))?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FeatureValueError::NotNumeric(s.clone()))?,
        other => return Err(FeatureValueError::NotNumeric(other.to_string())),
    };

    if !number.is_finite() {
        return Err(FeatureValueError::NonFinite);
    }
    Ok(number)
}

/// Parses a date cell the way statement exports write them.
///
/// Accepts plain dates, naive date-times (with or without fractional seconds), date-times
/// with a numeric offset, RFC 3339 and US-style `MM/DD/YYYY`.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.date_naive())
                .ok()
        })
        .or_else(|| {
            DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z")
                .map(|dt| dt.date_naive())
                .ok()
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .map(|dt| dt.date())
                .ok()
        })
        .or_else(|| NaiveDate::parse_from_str(value, "%m/%d/%Y").ok())
}

/// Serializes a ratio, writing non-finite values as the string `"Infinity"` (or
/// `"-Infinity"`/`"NaN"`), which plain JSON numbers cannot express.
pub fn serialize_ratio<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else if value.is_nan() {
        serializer.serialize_str("NaN")
    } else if value.is_sign_positive() {
        serializer.serialize_str("Infinity")
    } else {
        serializer.serialize_str("-Infinity")
    }
}
