//! Application-side values.
//!
//! A [`Value`] is what callers hand to the engine and what they get back from
//! it. It is richer than JSON (dates, binaries and sets are distinct kinds) but
//! converts from `serde_json::Value` so plain JSON payloads can be used directly.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use serde_json::Number;
use std::collections::BTreeMap;

/// A keyed collection of values, ordered by attribute name.
pub type Object = BTreeMap<String, Value>;

/// An application value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Lossless decimal number
    Number(Number),
    String(String),
    Binary(Vec<u8>),
    /// UTC instant with millisecond precision
    Date(DateTime<Utc>),
    /// Homogeneous scalars without duplicates, insertion order kept
    Set(Vec<Value>),
    List(Vec<Value>),
    Map(Object),
}

impl Value {
    /// Build a set, dropping duplicate members.
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let mut members: Vec<Value> = Vec::new();
        for item in items {
            let value = item.into();
            if !members.contains(&value) {
                members.push(value);
            }
        }
        Value::Set(members)
    }

    /// Build a date from milliseconds since the epoch.
    pub fn date_millis(millis: i64) -> Option<Self> {
        date_from_millis(millis).map(Value::Date)
    }

    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::Date(_) => "Date",
            Value::Set(_) => "Set",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Object> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Interpret a number as integral milliseconds.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Value::Number(n) => number_to_i64(n),
            Value::Date(d) => Some(d.timestamp_millis()),
            _ => None,
        }
    }

    /// String form used when a value is concatenated into a combine attribute.
    pub fn to_joined_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.timestamp_millis().to_string(),
            Value::Null => String::new(),
            other => other.to_json().to_string(),
        }
    }

    /// Plain JSON form: dates become epoch milliseconds, binaries base64, sets arrays.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::Engine as _;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            ),
            Value::Date(d) => serde_json::Value::Number(d.timestamp_millis().into()),
            Value::Set(items) | Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

pub(crate) fn number_to_i64(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))
}

pub(crate) fn date_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no wire representation and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Map(value)
    }
}

/// Convert a JSON object into an [`Object`]; anything else yields `None`.
pub fn object_from_json(value: serde_json::Value) -> Option<Object> {
    match Value::from(value) {
        Value::Map(map) => Some(map),
        _ => None,
    }
}
