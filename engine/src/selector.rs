//! Schema selection for models with several shapes.
//!
//! Every schema gets a score in `[0, 1]`: the minimum of the scores of every
//! present path and every absent declared attribute. The highest score wins and
//! ties go to the schema declared first.

use crate::schema::{Attribute, Schema};
use crate::types::{best_match, COERCED_MATCH, EXACT_MATCH, NO_MATCH};
use crate::value::{Object, Value};

/// Index of the schema that fits `object` best.
///
/// Returns 0 for an empty slice; models never hold one.
pub fn select_schema(schemas: &[Schema], object: &Object) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (index, schema) in schemas.iter().enumerate() {
        let score = score(schema, object);
        if score > best.1 {
            best = (index, score);
        }
    }
    best.0
}

/// Score of `object` against a single schema.
pub fn score(schema: &Schema, object: &Object) -> f64 {
    score_level(schema, schema.attributes(), "", object)
}

fn score_level(schema: &Schema, attributes: &[Attribute], prefix: &str, object: &Object) -> f64 {
    let mut min = EXACT_MATCH;
    for attribute in attributes {
        if attribute.combine().is_some() {
            continue;
        }
        let path = if prefix.is_empty() {
            attribute.name.clone()
        } else {
            format!("{}.{}", prefix, attribute.name)
        };
        let present = object
            .get(&attribute.name)
            .filter(|v| !v.is_null() || attribute.accepts_null());
        let attribute_score = match present {
            Some(value) => score_attribute(schema, attribute, &path, value),
            None if attribute.required && attribute.default.is_none() => NO_MATCH,
            None => EXACT_MATCH,
        };
        min = min.min(attribute_score);
    }
    for key in object.keys() {
        if attributes.iter().any(|a| a.name == *key) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let unknown_score = if schema.allows_unknown(&path) {
            EXACT_MATCH
        } else {
            COERCED_MATCH
        };
        min = min.min(unknown_score);
    }
    min
}

fn score_attribute(schema: &Schema, attribute: &Attribute, path: &str, value: &Value) -> f64 {
    let Some((attribute_type, container)) = best_match(&attribute.types, value) else {
        return NO_MATCH;
    };
    match (attribute_type.nested_attributes(), value) {
        (Some(children), Value::Map(map)) => container.min(score_level(schema, children, path, map)),
        _ => container,
    }
}
