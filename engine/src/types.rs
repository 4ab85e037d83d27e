//! Attribute type descriptors.
//!
//! An [`AttributeType`] knows three things about its domain: how well a value
//! fits it ([`AttributeType::match_score`]), how to write a value to the wire
//! ([`AttributeType::to_wire`]) and how to read it back
//! ([`AttributeType::from_wire`]). For every value that matches a descriptor
//! exactly, `from_wire(to_wire(v)) == v`.

use crate::schema::Attribute;
use crate::value::{number_to_i64, Value};
use crate::wire::{
    date_from_wire_millis, from_attribute_value, parse_number, to_attribute_value, with_attribute,
    AttributeValue, Item, WireType,
};
use crate::{error::Result, Error};
use chrono::{DateTime, Utc};

/// Score of a value that fits a type exactly.
pub const EXACT_MATCH: f64 = 1.0;
/// Score of a value that fits a type only after coercion.
pub const COERCED_MATCH: f64 = 0.5;
/// Score of a value that does not fit a type.
pub const NO_MATCH: f64 = 0.0;

/// Default separator for combine attributes.
pub const DEFAULT_COMBINE_SEPARATOR: &str = ",";

/// How a date is stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateStorage {
    /// Epoch milliseconds (default)
    #[default]
    Milliseconds,
    /// Epoch seconds, as required for TTL attributes
    Seconds,
}

/// A type an attribute may take.
#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Binary,
    Null,
    Date {
        storage: DateStorage,
    },
    /// Set of string, number, binary or date members
    Set(Box<AttributeType>),
    /// List, optionally with a declared element type
    List(Option<Box<AttributeType>>),
    /// Map, optionally with declared nested attributes
    Map(Option<Vec<Attribute>>),
    /// Derived string joined from other attributes at write time
    Combine {
        attributes: Vec<String>,
        separator: String,
    },
}

impl AttributeType {
    pub fn date() -> Self {
        AttributeType::Date {
            storage: DateStorage::Milliseconds,
        }
    }

    pub fn date_seconds() -> Self {
        AttributeType::Date {
            storage: DateStorage::Seconds,
        }
    }

    pub fn set(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn list() -> Self {
        AttributeType::List(None)
    }

    pub fn list_of(element: AttributeType) -> Self {
        AttributeType::List(Some(Box::new(element)))
    }

    pub fn map() -> Self {
        AttributeType::Map(None)
    }

    pub fn map_of(attributes: Vec<Attribute>) -> Self {
        AttributeType::Map(Some(attributes))
    }

    /// Combine the given attributes, in order, with `separator`.
    pub fn combine<I, S>(attributes: I, separator: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeType::Combine {
            attributes: attributes.into_iter().map(Into::into).collect(),
            separator: separator.into(),
        }
    }

    pub fn is_combine(&self) -> bool {
        matches!(self, AttributeType::Combine { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self, AttributeType::List(_))
    }

    /// Nested attributes declared on a map type.
    pub fn nested_attributes(&self) -> Option<&[Attribute]> {
        match self {
            AttributeType::Map(Some(attributes)) => Some(attributes),
            _ => None,
        }
    }

    /// Human-readable type name.
    pub fn name(&self) -> String {
        match self {
            AttributeType::String => "String".into(),
            AttributeType::Number => "Number".into(),
            AttributeType::Boolean => "Boolean".into(),
            AttributeType::Binary => "Binary".into(),
            AttributeType::Null => "Null".into(),
            AttributeType::Date { .. } => "Date".into(),
            AttributeType::Set(element) => format!("Set<{}>", element.name()),
            AttributeType::List(_) => "List".into(),
            AttributeType::Map(_) => "Map".into(),
            AttributeType::Combine { .. } => "Combine".into(),
        }
    }

    /// Wire tag this type writes.
    pub fn wire_type(&self) -> WireType {
        match self {
            AttributeType::String | AttributeType::Combine { .. } => WireType::S,
            AttributeType::Number | AttributeType::Date { .. } => WireType::N,
            AttributeType::Boolean => WireType::Bool,
            AttributeType::Binary => WireType::B,
            AttributeType::Null => WireType::Null,
            AttributeType::Set(element) => match element.wire_type() {
                WireType::S => WireType::Ss,
                WireType::B => WireType::Bs,
                _ => WireType::Ns,
            },
            AttributeType::List(_) => WireType::L,
            AttributeType::Map(_) => WireType::M,
        }
    }

    /// How well `value` fits this type, in `[0, 1]`.
    pub fn match_score(&self, value: &Value) -> f64 {
        match (self, value) {
            (AttributeType::String, Value::String(_))
            | (AttributeType::Number, Value::Number(_))
            | (AttributeType::Boolean, Value::Bool(_))
            | (AttributeType::Binary, Value::Binary(_))
            | (AttributeType::Null, Value::Null)
            | (AttributeType::Date { .. }, Value::Date(_))
            | (AttributeType::Map(_), Value::Map(_))
            | (AttributeType::List(None), Value::List(_))
            | (AttributeType::Combine { .. }, Value::String(_)) => EXACT_MATCH,
            (AttributeType::Date { .. }, Value::Number(n)) if number_to_i64(n).is_some() => {
                COERCED_MATCH
            }
            (AttributeType::Date { .. }, Value::String(s)) if parse_rfc3339(s).is_some() => {
                COERCED_MATCH
            }
            (AttributeType::Set(element), Value::Set(items)) => members_score(element, items),
            (AttributeType::Set(element), Value::List(items)) => {
                members_score(element, items).min(COERCED_MATCH)
            }
            (AttributeType::List(Some(element)), Value::List(items)) => {
                members_score(element, items)
            }
            _ => NO_MATCH,
        }
    }

    /// Whether `value` is accepted at all.
    pub fn is_of_type(&self, value: &Value) -> bool {
        self.match_score(value) > NO_MATCH
    }

    /// Convert an application value to its wire form.
    pub fn to_wire(&self, attribute: &str, value: &Value) -> Result<AttributeValue> {
        let mismatch = || Error::type_mismatch(attribute, self.name(), value.kind());
        match (self, value) {
            (AttributeType::String, Value::String(s))
            | (AttributeType::Combine { .. }, Value::String(s)) => Ok(AttributeValue::S(s.clone())),
            (AttributeType::Number, Value::Number(n)) => Ok(AttributeValue::N(n.to_string())),
            (AttributeType::Boolean, Value::Bool(b)) => Ok(AttributeValue::Bool(*b)),
            (AttributeType::Binary, Value::Binary(b)) => Ok(AttributeValue::B(b.clone())),
            (AttributeType::Null, Value::Null) => Ok(AttributeValue::Null(true)),
            (AttributeType::Date { storage }, _) => {
                let millis = date_millis(value).ok_or_else(mismatch)?;
                let stored = match storage {
                    DateStorage::Milliseconds => millis,
                    DateStorage::Seconds => millis.div_euclid(1000),
                };
                Ok(AttributeValue::N(stored.to_string()))
            }
            (AttributeType::Set(element), Value::Set(items))
            | (AttributeType::Set(element), Value::List(items)) => {
                set_to_wire(element, attribute, items)
            }
            (AttributeType::List(element), Value::List(items)) => items
                .iter()
                .map(|item| match element {
                    Some(element) => element.to_wire(attribute, item),
                    None => to_attribute_value(item).map_err(|e| with_attribute(e, attribute)),
                })
                .collect::<Result<Vec<_>>>()
                .map(AttributeValue::L),
            (AttributeType::Map(nested), Value::Map(map)) => {
                let mut item = Item::new();
                for (key, entry) in map {
                    let path = format!("{}.{}", attribute, key);
                    let declared = nested
                        .as_ref()
                        .and_then(|attrs| attrs.iter().find(|a| a.name == *key));
                    let av = match declared {
                        Some(declared) => declared.resolve_type(&path, entry)?.to_wire(&path, entry)?,
                        None => to_attribute_value(entry).map_err(|e| with_attribute(e, &path))?,
                    };
                    item.insert(key.clone(), av);
                }
                Ok(AttributeValue::M(item))
            }
            _ => Err(mismatch()),
        }
    }

    /// Convert a wire value back to an application value.
    pub fn from_wire(&self, attribute: &str, value: &AttributeValue) -> Result<Value> {
        let mismatch = || Error::type_mismatch(attribute, self.name(), value.wire_type().as_str());
        match (self, value) {
            (AttributeType::String, AttributeValue::S(s))
            | (AttributeType::Combine { .. }, AttributeValue::S(s)) => Ok(Value::String(s.clone())),
            (AttributeType::Number, AttributeValue::N(n)) => {
                parse_number(attribute, n).map(Value::Number)
            }
            (AttributeType::Boolean, AttributeValue::Bool(b)) => Ok(Value::Bool(*b)),
            (AttributeType::Binary, AttributeValue::B(b)) => Ok(Value::Binary(b.clone())),
            (AttributeType::Null, AttributeValue::Null(_)) => Ok(Value::Null),
            (AttributeType::Date { storage }, AttributeValue::N(n)) => {
                let number = parse_number(attribute, n)?;
                let stored = number_to_i64(&number).ok_or_else(mismatch)?;
                let millis = match storage {
                    DateStorage::Milliseconds => stored,
                    DateStorage::Seconds => stored.saturating_mul(1000),
                };
                date_from_wire_millis(attribute, millis)
            }
            (AttributeType::Set(element), AttributeValue::Ss(items)) => items
                .iter()
                .map(|s| element.from_wire(attribute, &AttributeValue::S(s.clone())))
                .collect::<Result<Vec<_>>>()
                .map(Value::Set),
            (AttributeType::Set(element), AttributeValue::Ns(items)) => items
                .iter()
                .map(|n| element.from_wire(attribute, &AttributeValue::N(n.clone())))
                .collect::<Result<Vec<_>>>()
                .map(Value::Set),
            (AttributeType::Set(element), AttributeValue::Bs(items)) => items
                .iter()
                .map(|b| element.from_wire(attribute, &AttributeValue::B(b.clone())))
                .collect::<Result<Vec<_>>>()
                .map(Value::Set),
            (AttributeType::List(element), AttributeValue::L(items)) => items
                .iter()
                .map(|item| match element {
                    Some(element) => element.from_wire(attribute, item),
                    None => from_attribute_value(item).map_err(|e| with_attribute(e, attribute)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            (AttributeType::Map(nested), AttributeValue::M(item)) => {
                let mut map = crate::value::Object::new();
                for (key, entry) in item {
                    let path = format!("{}.{}", attribute, key);
                    let declared = nested
                        .as_ref()
                        .and_then(|attrs| attrs.iter().find(|a| a.name == *key));
                    let value = match declared {
                        Some(declared) => decode_with(&declared.types, &path, entry)?,
                        None => from_attribute_value(entry).map_err(|e| with_attribute(e, &path))?,
                    };
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            _ => Err(mismatch()),
        }
    }
}

fn members_score(element: &AttributeType, items: &[Value]) -> f64 {
    items
        .iter()
        .map(|item| element.match_score(item))
        .fold(EXACT_MATCH, f64::min)
}

fn set_to_wire(element: &AttributeType, attribute: &str, items: &[Value]) -> Result<AttributeValue> {
    if items.is_empty() {
        return Err(Error::type_mismatch(
            attribute,
            format!("non-empty Set<{}>", element.name()),
            "empty Set",
        ));
    }
    let members = items
        .iter()
        .map(|item| element.to_wire(attribute, item))
        .collect::<Result<Vec<_>>>()?;
    let unexpected = || Error::type_mismatch(attribute, "String, Number or Binary set member", element.name());
    match element.wire_type() {
        WireType::S => members
            .into_iter()
            .map(|m| match m {
                AttributeValue::S(s) => Ok(s),
                _ => Err(unexpected()),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Ss),
        WireType::N => members
            .into_iter()
            .map(|m| match m {
                AttributeValue::N(n) => Ok(n),
                _ => Err(unexpected()),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Ns),
        WireType::B => members
            .into_iter()
            .map(|m| match m {
                AttributeValue::B(b) => Ok(b),
                _ => Err(unexpected()),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Bs),
        _ => Err(unexpected()),
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn date_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Date(d) => Some(d.timestamp_millis()),
        Value::Number(n) => number_to_i64(n),
        Value::String(s) => parse_rfc3339(s).map(|d| d.timestamp_millis()),
        _ => None,
    }
}

/// Pick the candidate that fits `value` best. Ties go to declaration order.
pub fn best_match<'a>(types: &'a [AttributeType], value: &Value) -> Option<(&'a AttributeType, f64)> {
    let mut best: Option<(&AttributeType, f64)> = None;
    for candidate in types {
        let score = candidate.match_score(value);
        if score > NO_MATCH && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best
}

/// Decode with the first candidate whose wire tag matches and that accepts the value.
pub fn decode_with(types: &[AttributeType], attribute: &str, value: &AttributeValue) -> Result<Value> {
    let tag = value.wire_type();
    let mut last_error = None;
    for candidate in types.iter().filter(|t| t.wire_type() == tag) {
        match candidate.from_wire(attribute, value) {
            Ok(decoded) => return Ok(decoded),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        Error::type_mismatch(attribute, type_names(types), tag.as_str())
    }))
}

/// Candidate type names joined for error messages.
pub fn type_names(types: &[AttributeType]) -> String {
    types
        .iter()
        .map(AttributeType::name)
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    #[test]
    fn exact_and_coerced_scores() {
        assert_eq!(AttributeType::String.match_score(&Value::from("a")), EXACT_MATCH);
        assert_eq!(AttributeType::String.match_score(&Value::from(1)), NO_MATCH);
        assert_eq!(
            AttributeType::date().match_score(&Value::from(1_000)),
            COERCED_MATCH
        );
        assert_eq!(
            AttributeType::date().match_score(&Value::from("2024-02-01T00:00:00Z")),
            COERCED_MATCH
        );
        assert_eq!(AttributeType::date().match_score(&Value::from("soon")), NO_MATCH);
    }

    #[test]
    fn set_scores() {
        let ty = AttributeType::set(AttributeType::String);
        assert_eq!(ty.match_score(&Value::set(["a", "b"])), EXACT_MATCH);
        assert_eq!(
            ty.match_score(&Value::from(json!(["a", "b"]))),
            COERCED_MATCH
        );
        assert_eq!(ty.match_score(&Value::set([1, 2])), NO_MATCH);
    }

    #[test]
    fn date_storage() {
        let millis = 1_706_745_600_123i64;
        let value = Value::date_millis(millis).unwrap();

        let av = AttributeType::date().to_wire("d", &value).unwrap();
        assert_eq!(av, AttributeValue::N(millis.to_string()));

        let av = AttributeType::date_seconds().to_wire("d", &value).unwrap();
        assert_eq!(av, AttributeValue::N("1706745600".into()));
        let back = AttributeType::date_seconds().from_wire("d", &av).unwrap();
        assert_eq!(back, Value::date_millis(1_706_745_600_000).unwrap());
    }

    #[test]
    fn number_coerces_to_date() {
        let av = AttributeType::date().to_wire("d", &Value::from(5_000)).unwrap();
        assert_eq!(av, AttributeValue::N("5000".into()));
    }

    #[test]
    fn set_to_wire_by_element() {
        let ty = AttributeType::set(AttributeType::Number);
        let av = ty.to_wire("n", &Value::set([1, 2])).unwrap();
        assert_eq!(av, AttributeValue::Ns(vec!["1".into(), "2".into()]));
        assert_eq!(ty.from_wire("n", &av).unwrap(), Value::set([1, 2]));

        let err = ty.to_wire("n", &Value::Set(vec![])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn nested_map_uses_declared_types() {
        let ty = AttributeType::map_of(vec![Attribute::new("born", AttributeType::date())]);
        let value = Value::from(json!({"born": 1000, "city": "Oslo"}));
        let av = ty.to_wire("profile", &value).unwrap();
        let AttributeValue::M(item) = &av else {
            panic!("expected map")
        };
        assert_eq!(item["born"], AttributeValue::N("1000".into()));
        assert_eq!(item["city"], AttributeValue::S("Oslo".into()));

        let back = ty.from_wire("profile", &av).unwrap();
        assert_eq!(back.as_map().unwrap()["born"], Value::date_millis(1000).unwrap());
    }

    #[test]
    fn mismatch_reports_attribute() {
        let err = AttributeType::Number
            .to_wire("age", &Value::from("thirty"))
            .unwrap_err();
        assert_eq!(err, Error::type_mismatch("age", "Number", "String"));
    }

    #[test]
    fn best_match_prefers_exact_then_order() {
        let types = vec![AttributeType::date(), AttributeType::Number];
        let (ty, score) = best_match(&types, &Value::from(3)).unwrap();
        assert_eq!(ty.name(), "Number");
        assert_eq!(score, EXACT_MATCH);

        let types = vec![AttributeType::String, AttributeType::Combine {
            attributes: vec![],
            separator: ",".into(),
        }];
        assert_eq!(best_match(&types, &Value::from("x")).unwrap().0.name(), "String");
        assert!(best_match(&types, &Value::from(true)).is_none());
    }

    #[test]
    fn decode_picks_matching_wire_tag() {
        let types = vec![AttributeType::String, AttributeType::Number];
        let value = decode_with(&types, "v", &AttributeValue::N("7".into())).unwrap();
        assert_eq!(value, Value::from(7));
        let err = decode_with(&types, "v", &AttributeValue::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_number() -> impl Strategy<Value = Value> {
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                (-1_000_000i64..1_000_000).prop_map(|n| Value::from(n as f64 / 4.0)),
            ]
        }

        proptest! {
            #[test]
            fn prop_string_round_trip(s in ".*") {
                let value = Value::from(s);
                let av = AttributeType::String.to_wire("s", &value).unwrap();
                prop_assert_eq!(AttributeType::String.from_wire("s", &av).unwrap(), value);
            }

            #[test]
            fn prop_number_round_trip(value in arb_number()) {
                let av = AttributeType::Number.to_wire("n", &value).unwrap();
                prop_assert_eq!(AttributeType::Number.from_wire("n", &av).unwrap(), value);
            }

            #[test]
            fn prop_wide_integer_keeps_every_digit(digits in "-?[1-9][0-9]{19,37}") {
                let av = AttributeValue::N(digits.clone());
                let value = AttributeType::Number.from_wire("n", &av).unwrap();
                prop_assert_eq!(AttributeType::Number.to_wire("n", &value).unwrap(), av);
            }

            #[test]
            fn prop_binary_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
                let value = Value::Binary(bytes);
                let av = AttributeType::Binary.to_wire("b", &value).unwrap();
                prop_assert_eq!(AttributeType::Binary.from_wire("b", &av).unwrap(), value);
            }

            #[test]
            fn prop_date_millis_round_trip(millis in -8_000_000_000_000i64..8_000_000_000_000) {
                let value = Value::date_millis(millis).unwrap();
                let av = AttributeType::date().to_wire("d", &value).unwrap();
                prop_assert_eq!(AttributeType::date().from_wire("d", &av).unwrap(), value);
            }

            #[test]
            fn prop_date_seconds_round_trip(seconds in -8_000_000_000i64..8_000_000_000) {
                let value = Value::date_millis(seconds * 1000).unwrap();
                let ty = AttributeType::date_seconds();
                let av = ty.to_wire("d", &value).unwrap();
                prop_assert_eq!(ty.from_wire("d", &av).unwrap(), value);
            }

            #[test]
            fn prop_string_set_round_trip(members in proptest::collection::btree_set("[a-z]{1,8}", 1..8)) {
                let value = Value::set(members);
                let ty = AttributeType::set(AttributeType::String);
                let av = ty.to_wire("ss", &value).unwrap();
                prop_assert_eq!(ty.from_wire("ss", &av).unwrap(), value);
            }

            #[test]
            fn prop_list_round_trip(items in proptest::collection::vec(any::<i32>(), 0..8)) {
                let value = Value::List(items.into_iter().map(Value::from).collect());
                let ty = AttributeType::list_of(AttributeType::Number);
                prop_assert_eq!(ty.match_score(&value), EXACT_MATCH);
                let av = ty.to_wire("l", &value).unwrap();
                prop_assert_eq!(ty.from_wire("l", &av).unwrap(), value);
            }
        }
    }
}
