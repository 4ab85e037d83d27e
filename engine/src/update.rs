//! Update expression compiler.
//!
//! Partial update objects are parsed once into [`UpdateOp`]s and compiled
//! against a schema into an [`UpdatePlan`]: a native update expression with
//! `#aN` name placeholders and `:vN` value placeholders drawn from one shared
//! counter.

use crate::codec::{conform_attribute, convert_value, ConformSettings};
use crate::schema::{ResolvedType, Schema};
use crate::value::{Object, Value};
use crate::wire::AttributeValue;
use crate::{error::Result, Error};
use std::collections::BTreeMap;

/// Value of a SET entry.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    /// Nothing to write; a declared attribute is removed
    Absent,
    /// Explicit removal, never replaced by a default
    RemoveRequested,
    Present(Value),
}

/// One update intent.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, UpdateValue),
    Add(String, Value),
    Remove(String),
    Delete(String, Value),
}

impl UpdateOp {
    pub fn set(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Set(attribute.into(), UpdateValue::Present(value.into()))
    }

    /// Explicitly remove an attribute through SET.
    pub fn unset(attribute: impl Into<String>) -> Self {
        UpdateOp::Set(attribute.into(), UpdateValue::RemoveRequested)
    }

    pub fn add(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Add(attribute.into(), value.into())
    }

    pub fn remove(attribute: impl Into<String>) -> Self {
        UpdateOp::Remove(attribute.into())
    }

    pub fn delete(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Delete(attribute.into(), value.into())
    }

    /// Get the attribute this operation targets.
    pub fn attribute(&self) -> &str {
        match self {
            UpdateOp::Set(name, _)
            | UpdateOp::Add(name, _)
            | UpdateOp::Remove(name)
            | UpdateOp::Delete(name, _) => name,
        }
    }

    /// Parse an update object.
    ///
    /// Plain entries are implicit SETs. The reserved keys `$SET`, `$ADD`,
    /// `$REMOVE` and `$DELETE` select the class; `$REMOVE` also accepts a list
    /// of names.
    pub fn parse(update: &Object) -> Result<Vec<UpdateOp>> {
        let mut ops = Vec::new();
        for (key, value) in update {
            match (key.as_str(), value) {
                ("$SET", Value::Map(entries)) => ops.extend(
                    entries
                        .iter()
                        .map(|(k, v)| UpdateOp::Set(k.clone(), UpdateValue::Present(v.clone()))),
                ),
                ("$ADD", Value::Map(entries)) => ops.extend(
                    entries
                        .iter()
                        .map(|(k, v)| UpdateOp::Add(k.clone(), v.clone())),
                ),
                ("$DELETE", Value::Map(entries)) => ops.extend(
                    entries
                        .iter()
                        .map(|(k, v)| UpdateOp::Delete(k.clone(), v.clone())),
                ),
                ("$REMOVE", Value::Map(entries)) => {
                    ops.extend(entries.keys().map(|k| UpdateOp::Remove(k.clone())))
                }
                ("$REMOVE", Value::List(names)) => {
                    for name in names {
                        let name = name.as_str().ok_or_else(|| {
                            Error::InvalidParameter(format!(
                                "$REMOVE expects attribute names, got {}",
                                name.kind()
                            ))
                        })?;
                        ops.push(UpdateOp::Remove(name.to_string()));
                    }
                }
                ("$REMOVE", Value::String(name)) => ops.push(UpdateOp::Remove(name.clone())),
                ("$SET" | "$ADD" | "$DELETE" | "$REMOVE", other) => {
                    return Err(Error::InvalidParameter(format!(
                        "{} expects an object, got {}",
                        key,
                        other.kind()
                    )))
                }
                _ => ops.push(UpdateOp::Set(
                    key.clone(),
                    UpdateValue::Present(value.clone()),
                )),
            }
        }
        Ok(ops)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Class {
    Set,
    Add,
    Remove,
    Delete,
}

impl Class {
    const ORDER: [Class; 4] = [Class::Set, Class::Add, Class::Remove, Class::Delete];

    fn keyword(self) -> &'static str {
        match self {
            Class::Set => "SET",
            Class::Add => "ADD",
            Class::Remove => "REMOVE",
            Class::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    class: Class,
    index: usize,
    attribute: String,
    value: Option<Value>,
    list_append: bool,
}

impl Entry {
    fn fragment(&self) -> String {
        let name = format!("#a{}", self.index);
        let value = format!(":v{}", self.index);
        match self.class {
            Class::Set if self.list_append => {
                format!("{} = list_append({}, {})", name, name, value)
            }
            Class::Set => format!("{} = {}", name, value),
            Class::Add | Class::Delete => format!("{} {}", name, value),
            Class::Remove => name,
        }
    }
}

/// A compiled update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdatePlan {
    /// Expression such as `SET #a0 = :v0 REMOVE #a1`
    pub update_expression: String,
    pub names: BTreeMap<String, String>,
    /// Empty when no fragment carries a value
    pub values: BTreeMap<String, AttributeValue>,
    /// First placeholder index not used by this plan
    pub next_index: usize,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.update_expression.is_empty()
    }
}

/// Compile update operations against `schema`.
///
/// Placeholders are numbered from `start_index`, so a condition rendered first
/// from index 0 can hand over its next free index.
pub fn compile(schema: &Schema, ops: &[UpdateOp], start_index: usize) -> Result<UpdatePlan> {
    let mut counter = start_index;
    let mut entries: Vec<Entry> = Vec::new();

    for op in ops {
        let attribute = op.attribute();
        let declared = schema.attribute(attribute);
        if declared.is_some_and(|a| a.combine().is_some()) {
            continue;
        }

        let (mut class, mut value, removal_requested) = match op {
            UpdateOp::Set(_, UpdateValue::Present(v)) => (
                Class::Set,
                conform_attribute(schema, attribute, v.clone(), &ConformSettings::update_set())?,
                false,
            ),
            UpdateOp::Set(_, UpdateValue::Absent) => (Class::Set, None, false),
            UpdateOp::Set(_, UpdateValue::RemoveRequested) => (Class::Remove, None, true),
            UpdateOp::Add(_, v) => {
                let v = match (is_list_attribute(schema, attribute, v), v) {
                    (true, Value::List(_)) | (false, _) => v.clone(),
                    (true, single) => Value::List(vec![single.clone()]),
                };
                (
                    Class::Add,
                    conform_attribute(schema, attribute, v, &ConformSettings::update_add())?,
                    false,
                )
            }
            UpdateOp::Remove(_) => (Class::Remove, None, false),
            UpdateOp::Delete(_, v) => (
                Class::Delete,
                conform_attribute(schema, attribute, v.clone(), &ConformSettings::update_delete())?,
                false,
            ),
        };

        if value.is_none() {
            if declared.is_none() {
                continue;
            }
            class = Class::Remove;
        }

        if let Some(declared) = declared {
            let default = if declared.force_default
                || (class == Class::Remove && !removal_requested)
            {
                declared.default_now()
            } else {
                None
            };
            if let Some(default) = default {
                class = Class::Set;
                value = Some(default);
            }
            if class == Class::Remove && declared.required {
                return Err(Error::ValidationError(format!(
                    "{} is a required property but has no value when trying to save document",
                    attribute
                )));
            }
        }

        let list_append = class == Class::Add
            && value
                .as_ref()
                .is_some_and(|v| is_list_attribute(schema, attribute, v));
        if list_append {
            class = Class::Set;
        }

        entries.push(Entry {
            class,
            index: counter,
            attribute: attribute.to_string(),
            value,
            list_append,
        });
        counter += 1;
    }

    for attribute in schema.attributes() {
        let Some((sources, separator)) = attribute.combine() else {
            continue;
        };
        let touched: Vec<Option<&Entry>> = sources
            .iter()
            .map(|source| {
                entries.iter().find(|e| {
                    e.attribute == *source && matches!(e.class, Class::Set | Class::Remove)
                })
            })
            .collect();
        if touched.iter().all(Option::is_none) {
            continue;
        }
        let missing: Vec<&str> = sources
            .iter()
            .zip(&touched)
            .filter(|(_, entry)| entry.is_none())
            .map(|(source, _)| source.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "You must update all or none of the combine attributes when running Model.update. Missing combine attributes: {}.",
                missing.join(", ")
            )));
        }
        let joined = touched
            .iter()
            .flatten()
            .filter_map(|entry| entry.value.as_ref())
            .filter(|value| !value.is_null())
            .map(Value::to_joined_string)
            .collect::<Vec<_>>()
            .join(separator);
        entries.push(Entry {
            class: Class::Set,
            index: counter,
            attribute: attribute.name.clone(),
            value: Some(Value::String(joined)),
            list_append: false,
        });
        counter += 1;
    }

    for attribute in schema.attributes() {
        if !attribute.force_default || entries.iter().any(|e| e.attribute == attribute.name) {
            continue;
        }
        if let Some(default) = attribute.default_now() {
            entries.push(Entry {
                class: Class::Set,
                index: counter,
                attribute: attribute.name.clone(),
                value: Some(default),
                list_append: false,
            });
            counter += 1;
        }
    }

    let mut plan = UpdatePlan {
        next_index: counter,
        ..UpdatePlan::default()
    };
    for entry in &entries {
        plan.names
            .insert(format!("#a{}", entry.index), entry.attribute.clone());
        if entry.class != Class::Remove {
            if let Some(value) = &entry.value {
                plan.values.insert(
                    format!(":v{}", entry.index),
                    convert_value(schema, &entry.attribute, value)?,
                );
            }
        }
    }

    plan.update_expression = Class::ORDER
        .iter()
        .filter_map(|class| {
            let fragments: Vec<String> = entries
                .iter()
                .filter(|e| e.class == *class)
                .map(Entry::fragment)
                .collect();
            (!fragments.is_empty())
                .then(|| format!("{} {}", class.keyword(), fragments.join(", ")))
        })
        .collect::<Vec<_>>()
        .join(" ");

    Ok(plan)
}

fn is_list_attribute(schema: &Schema, attribute: &str, value: &Value) -> bool {
    let as_list = match value {
        Value::List(_) => value.clone(),
        single => Value::List(vec![single.clone()]),
    };
    match schema.resolve_type(attribute, &as_list, true) {
        Ok(ResolvedType::Declared(t)) => t.is_list(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use crate::types::AttributeType;
    use crate::value::object_from_json;
    use serde_json::json;

    fn product_schema() -> Schema {
        Schema::new(vec![
            Attribute::new("id", AttributeType::String),
            Attribute::new("price", AttributeType::Number),
            Attribute::new("name", AttributeType::String).required(),
            Attribute::new("status", AttributeType::String).default_value("draft"),
            Attribute::new("tags", AttributeType::set(AttributeType::String)),
            Attribute::new("history", AttributeType::list()),
            Attribute::new("oldField", AttributeType::String),
        ])
        .unwrap()
    }

    fn parse(value: serde_json::Value) -> Vec<UpdateOp> {
        UpdateOp::parse(&object_from_json(value).unwrap()).unwrap()
    }

    #[test]
    fn implicit_set_single_fragment() {
        let plan = compile(&product_schema(), &parse(json!({"price": 10})), 0).unwrap();
        assert_eq!(plan.update_expression, "SET #a0 = :v0");
        assert_eq!(plan.names.len(), 1);
        assert_eq!(plan.names["#a0"], "price");
        assert_eq!(plan.values[":v0"], AttributeValue::N("10".into()));
        assert_eq!(plan.next_index, 1);
    }

    #[test]
    fn remove_declared_has_no_value() {
        let plan = compile(
            &product_schema(),
            &parse(json!({"$REMOVE": {"oldField": null}})),
            0,
        )
        .unwrap();
        assert_eq!(plan.update_expression, "REMOVE #a0");
        assert_eq!(plan.names["#a0"], "oldField");
        assert!(plan.values.is_empty());
    }

    #[test]
    fn remove_undeclared_is_dropped() {
        let plan = compile(
            &product_schema(),
            &parse(json!({"$REMOVE": {"ghost": null}})),
            0,
        )
        .unwrap();
        assert!(plan.is_empty());
        assert!(plan.names.is_empty());
        assert_eq!(plan.next_index, 0);
    }

    #[test]
    fn remove_list_form() {
        let plan = compile(
            &product_schema(),
            &parse(json!({"$REMOVE": ["oldField", "price"]})),
            0,
        )
        .unwrap();
        assert_eq!(plan.update_expression, "REMOVE #a0, #a1");
    }

    #[test]
    fn remove_with_default_becomes_set() {
        let plan = compile(&product_schema(), &[UpdateOp::remove("status")], 0).unwrap();
        assert_eq!(plan.update_expression, "SET #a0 = :v0");
        assert_eq!(plan.values[":v0"], AttributeValue::S("draft".into()));
    }

    #[test]
    fn explicit_unset_skips_default() {
        let plan = compile(&product_schema(), &[UpdateOp::unset("status")], 0).unwrap();
        assert_eq!(plan.update_expression, "REMOVE #a0");
    }

    #[test]
    fn null_set_is_removal() {
        let plan = compile(&product_schema(), &parse(json!({"price": null})), 0).unwrap();
        assert_eq!(plan.update_expression, "REMOVE #a0");
        assert!(plan.values.is_empty());
    }

    #[test]
    fn removing_required_fails() {
        let err = compile(&product_schema(), &[UpdateOp::remove("name")], 0).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn add_to_list_becomes_list_append() {
        let plan = compile(&product_schema(), &[UpdateOp::add("history", "v2")], 0).unwrap();
        assert_eq!(
            plan.update_expression,
            "SET #a0 = list_append(#a0, :v0)"
        );
        assert_eq!(
            plan.values[":v0"],
            AttributeValue::L(vec![AttributeValue::S("v2".into())])
        );
    }

    #[test]
    fn class_order_and_shared_counter() {
        let ops = vec![
            UpdateOp::delete("tags", Value::set(["old"])),
            UpdateOp::remove("oldField"),
            UpdateOp::add("price", 5),
            UpdateOp::set("name", "Lamp"),
        ];
        let plan = compile(&product_schema(), &ops, 0).unwrap();
        assert_eq!(
            plan.update_expression,
            "SET #a3 = :v3 ADD #a2 :v2 REMOVE #a1 DELETE #a0 :v0"
        );
        assert_eq!(plan.values.len(), 3);
        assert!(!plan.values.contains_key(":v1"));
        assert_eq!(plan.values[":v0"], AttributeValue::Ss(vec!["old".into()]));
    }

    #[test]
    fn starts_after_condition_indices() {
        let plan = compile(&product_schema(), &parse(json!({"price": 10})), 2).unwrap();
        assert_eq!(plan.update_expression, "SET #a2 = :v2");
        assert_eq!(plan.next_index, 3);
    }

    fn combine_schema() -> Schema {
        Schema::new(vec![
            Attribute::new("id", AttributeType::String),
            Attribute::new("a", AttributeType::String),
            Attribute::new("b", AttributeType::String),
            Attribute::new("ab", AttributeType::combine(["a", "b"], "#")),
        ])
        .unwrap()
    }

    #[test]
    fn combine_partial_update_fails() {
        let err = compile(&combine_schema(), &parse(json!({"a": "x"})), 0).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidParameter(
                "You must update all or none of the combine attributes when running Model.update. Missing combine attributes: b.".into()
            )
        );
    }

    #[test]
    fn combine_full_update_adds_one_set() {
        let plan = compile(&combine_schema(), &parse(json!({"a": "x", "b": "y"})), 0).unwrap();
        assert_eq!(
            plan.update_expression,
            "SET #a0 = :v0, #a1 = :v1, #a2 = :v2"
        );
        assert_eq!(plan.names["#a2"], "ab");
        assert_eq!(plan.values[":v2"], AttributeValue::S("x#y".into()));
    }

    #[test]
    fn combine_untouched_is_fine() {
        let plan = compile(&combine_schema(), &parse(json!({"id": "k"})), 0).unwrap();
        assert_eq!(plan.update_expression, "SET #a0 = :v0");
    }

    #[test]
    fn force_default_added_when_untouched() {
        let schema = Schema::new(vec![
            Attribute::new("id", AttributeType::String),
            Attribute::new("price", AttributeType::Number),
            Attribute::new("rev", AttributeType::String)
                .default_value("r1")
                .force_default(),
        ])
        .unwrap();
        let plan = compile(&schema, &parse(json!({"price": 1})), 0).unwrap();
        assert_eq!(plan.update_expression, "SET #a0 = :v0, #a1 = :v1");
        assert_eq!(plan.names["#a1"], "rev");

        let plan = compile(&schema, &parse(json!({"rev": "mine"})), 0).unwrap();
        assert_eq!(plan.values[":v0"], AttributeValue::S("r1".into()));
    }

    #[test]
    fn set_validates_enum() {
        let schema = Schema::new(vec![
            Attribute::new("id", AttributeType::String),
            Attribute::new("size", AttributeType::String).enumeration(["S", "M"]),
        ])
        .unwrap();
        let err = compile(&schema, &parse(json!({"size": "XL"})), 0).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn type_mismatch_on_set() {
        let err = compile(&product_schema(), &parse(json!({"price": "ten"})), 0).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { attribute, .. } if attribute == "price"));
    }

    #[test]
    fn parse_rejects_bad_reserved_values() {
        let err = UpdateOp::parse(&object_from_json(json!({"$ADD": 1})).unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_op() -> impl Strategy<Value = UpdateOp> {
            prop_oneof![
                (0i64..100).prop_map(|n| UpdateOp::set("price", n)),
                "[a-z]{1,6}".prop_map(|s| UpdateOp::set("name", s)),
                (0i64..10).prop_map(|n| UpdateOp::add("price", n)),
                Just(UpdateOp::remove("oldField")),
                Just(UpdateOp::remove("status")),
                Just(UpdateOp::remove("ghost")),
                "[a-z]{1,6}".prop_map(|s| UpdateOp::add("history", s)),
                "[a-z]{1,6}".prop_map(|s| UpdateOp::delete("tags", Value::set([s]))),
            ]
        }

        proptest! {
            #[test]
            fn prop_placeholders_consistent(
                ops in proptest::collection::vec(arb_op(), 0..8),
                start in 0usize..5,
            ) {
                let plan = compile(&product_schema(), &ops, start).unwrap();

                let mut indices: Vec<usize> = plan
                    .names
                    .keys()
                    .map(|k| k.trim_start_matches("#a").parse().unwrap())
                    .collect();
                indices.sort_unstable();
                for (offset, index) in indices.iter().enumerate() {
                    prop_assert_eq!(*index, start + offset);
                }
                prop_assert_eq!(plan.next_index, start + indices.len());

                for name in plan.names.keys() {
                    prop_assert!(plan.update_expression.contains(name.as_str()));
                }
                for value in plan.values.keys() {
                    let name = value.replacen(":v", "#a", 1);
                    prop_assert!(plan.names.contains_key(&name));
                    prop_assert!(plan.update_expression.contains(value.as_str()));
                }
            }
        }
    }
}
