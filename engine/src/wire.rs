//! Wire format: the store's typed attribute values.
//!
//! [`AttributeValue`] serializes exactly like the store's JSON protocol, e.g.
//! `{"S": "alice"}` or `{"NS": ["1", "2"]}`. Binary payloads travel as base64.

use crate::value::{date_from_millis, Object, Value};
use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A wire item: attribute name to typed value.
pub type Item = BTreeMap<String, AttributeValue>;

/// A typed attribute value as sent to and received from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(#[serde(with = "base64_bytes")] Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(#[serde(with = "base64_list")] Vec<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(Item),
}

/// The type tag of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    S,
    N,
    B,
    Bool,
    Null,
    Ss,
    Ns,
    Bs,
    L,
    M,
}

impl WireType {
    /// Returns the wire-format tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::S => "S",
            WireType::N => "N",
            WireType::B => "B",
            WireType::Bool => "BOOL",
            WireType::Null => "NULL",
            WireType::Ss => "SS",
            WireType::Ns => "NS",
            WireType::Bs => "BS",
            WireType::L => "L",
            WireType::M => "M",
        }
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AttributeValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            AttributeValue::S(_) => WireType::S,
            AttributeValue::N(_) => WireType::N,
            AttributeValue::B(_) => WireType::B,
            AttributeValue::Bool(_) => WireType::Bool,
            AttributeValue::Null(_) => WireType::Null,
            AttributeValue::Ss(_) => WireType::Ss,
            AttributeValue::Ns(_) => WireType::Ns,
            AttributeValue::Bs(_) => WireType::Bs,
            AttributeValue::L(_) => WireType::L,
            AttributeValue::M(_) => WireType::M,
        }
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }
}

/// Parses an `N` payload. The decimal text is kept as written, so wide
/// integers survive unchanged.
pub(crate) fn parse_number(attribute: &str, raw: &str) -> Result<serde_json::Number> {
    serde_json::from_str::<serde_json::Number>(raw.trim())
        .map_err(|_| Error::type_mismatch(attribute, "Number", format!("N \"{}\"", raw)))
}

/// Compares two wire values, treating `N` payloads by numeric value.
///
/// The store echoes numbers in its own spelling, so `"1.0"` and `"1"` name
/// the same key.
pub fn same_attribute_value(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::N(x), AttributeValue::N(y)) => {
            match (canonical_decimal(x), canonical_decimal(y)) {
                (Some(x), Some(y)) => x == y,
                _ => x == y,
            }
        }
        _ => a == b,
    }
}

/// Sign, significant digits and decimal exponent of a number literal.
#[derive(Debug, PartialEq, Eq)]
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

fn canonical_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (mantissa, exponent) = match rest.find(['e', 'E']) {
        Some(at) => (&rest[..at], rest[at + 1..].parse::<i64>().ok()?),
        None => (rest, 0),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let all = format!("{}{}", int, frac);
    let leading = all.len() - all.trim_start_matches('0').len();
    let significant = all.trim_start_matches('0').trim_end_matches('0');
    if significant.is_empty() {
        return Some(Decimal {
            negative: false,
            digits: String::new(),
            exponent: 0,
        });
    }
    // Exponent of the first significant digit, so trailing zeros drop out.
    let exponent = exponent
        .checked_add(int.len() as i64)?
        .checked_sub(leading as i64)?;
    Some(Decimal {
        negative,
        digits: significant.to_string(),
        exponent,
    })
}

/// Convert a value to wire form by inspecting its own kind.
///
/// Used for values with no schema entry (keys of unknown shape, saved unknown
/// attributes). Dates are written as epoch milliseconds.
pub fn to_attribute_value(value: &Value) -> Result<AttributeValue> {
    Ok(match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Binary(b) => AttributeValue::B(b.clone()),
        Value::Date(d) => AttributeValue::N(d.timestamp_millis().to_string()),
        Value::Set(items) => inferred_set(items)?,
        Value::List(items) => AttributeValue::L(
            items
                .iter()
                .map(to_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(map) => AttributeValue::M(marshall(map)?),
    })
}

fn inferred_set(items: &[Value]) -> Result<AttributeValue> {
    let first = items
        .first()
        .ok_or_else(|| Error::type_mismatch("", "non-empty Set", "empty Set"))?;
    let mismatch = |v: &Value| Error::type_mismatch("", format!("Set of {}", first.kind()), v.kind());
    match first {
        Value::String(_) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| mismatch(v)))
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Ss),
        Value::Number(_) | Value::Date(_) => items
            .iter()
            .map(|v| match v {
                Value::Number(n) => Ok(n.to_string()),
                Value::Date(d) => Ok(d.timestamp_millis().to_string()),
                other => Err(mismatch(other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Ns),
        Value::Binary(_) => items
            .iter()
            .map(|v| match v {
                Value::Binary(b) => Ok(b.clone()),
                other => Err(mismatch(other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Bs),
        other => Err(Error::type_mismatch("", "Set of String, Number or Binary", other.kind())),
    }
}

/// Convert a wire value back to an application value by its own tag.
pub fn from_attribute_value(value: &AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number("", n)?),
        AttributeValue::B(b) => Value::Binary(b.clone()),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(items) => Value::set(items.iter().cloned()),
        AttributeValue::Ns(items) => Value::Set(
            items
                .iter()
                .map(|n| parse_number("", n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::Bs(items) => Value::Set(items.iter().cloned().map(Value::Binary).collect()),
        AttributeValue::L(items) => Value::List(
            items
                .iter()
                .map(from_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Map(unmarshall(map)?),
    })
}

/// Convert an object to a wire item without a schema.
pub fn marshall(object: &Object) -> Result<Item> {
    object
        .iter()
        .map(|(k, v)| {
            to_attribute_value(v)
                .map(|av| (k.clone(), av))
                .map_err(|e| with_attribute(e, k))
        })
        .collect()
}

/// Convert a wire item to an object without a schema.
pub fn unmarshall(item: &Item) -> Result<Object> {
    item.iter()
        .map(|(k, v)| {
            from_attribute_value(v)
                .map(|value| (k.clone(), value))
                .map_err(|e| with_attribute(e, k))
        })
        .collect()
}

/// Fill in the attribute name of a type mismatch raised below it.
pub(crate) fn with_attribute(error: Error, attribute: &str) -> Error {
    match error {
        Error::TypeMismatch {
            attribute: inner,
            expected,
            got,
        } if inner.is_empty() => Error::TypeMismatch {
            attribute: attribute.to_string(),
            expected,
            got,
        },
        other => other,
    }
}

pub(crate) fn date_from_wire_millis(attribute: &str, millis: i64) -> Result<Value> {
    date_from_millis(millis)
        .map(Value::Date)
        .ok_or_else(|| Error::type_mismatch(attribute, "Date", format!("N \"{}\"", millis)))
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod base64_list {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|b| STANDARD.encode(b)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| {
                STANDARD
                    .decode(s.as_bytes())
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
