//! Cell values accepted by the patcher and their request decoding

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A value to write into one cell.
///
/// Booleans are never numeric: decoding turns them into `Text("True")` or
/// `Text("False")` so they are stored as strings.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Decode a command-line value: integer, then float, otherwise text.
    ///
    /// `"42"` is an integer, `"3.5"` a float, `"inf"` and `"NaN"` stay text
    /// since they cannot be stored as numbers anyway.
    pub fn parse_lenient(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return CellValue::Number(f);
            }
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Number(_))
    }

    /// Decimal text stored in `<v>` for numeric values
    pub(crate) fn numeric_text(&self) -> Option<String> {
        match self {
            CellValue::Integer(i) => Some(i.to_string()),
            CellValue::Number(f) => Some(f.to_string()),
            CellValue::Text(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value as i64)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Text(bool_text(value).to_string())
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Number(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct CellValueVisitor;

impl<'de> Visitor<'de> for CellValueVisitor {
    type Value = CellValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CellValue, E> {
        Ok(CellValue::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CellValue, E> {
        Ok(CellValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CellValue, E> {
        match i64::try_from(v) {
            Ok(i) => Ok(CellValue::Integer(i)),
            Err(_) => Ok(CellValue::Number(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CellValue, E> {
        Ok(CellValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CellValue, E> {
        Ok(CellValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CellValue, E> {
        Ok(CellValue::Text(v))
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellValueVisitor)
    }
}

/// One requested write: a coordinate such as `B12` and its new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub coordinate: String,
    pub value: CellValue,
}

impl CellUpdate {
    pub fn new(coordinate: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            coordinate: coordinate.into(),
            value: value.into(),
        }
    }
}
