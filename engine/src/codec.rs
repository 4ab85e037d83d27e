//! Document codec.
//!
//! Conforms application objects to a [`Schema`] and converts them to and from
//! wire [`Item`]s. Writing runs, in order: user values, defaults, the required
//! check, enum and `validate` rules, combine recomputation, `set` modifiers and
//! finally per-attribute type conversion. Reading decodes with the declared
//! types, drops combine attributes, applies `get` modifiers and handles TTL
//! expiry.

use crate::document::Document;
use crate::schema::{Attribute, ResolvedType, Schema};
use crate::types::decode_with;
use crate::value::{Object, Value};
use crate::wire::{from_attribute_value, to_attribute_value, with_attribute, Item};
use crate::{error::Result, Error};
use chrono::{DateTime, Utc};

/// Which required attributes are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequiredCheck {
    #[default]
    Off,
    /// Every required attribute at every level
    All,
    /// Only attributes nested inside a container that is itself present
    Nested,
}

impl RequiredCheck {
    fn applies(self, nested: bool) -> bool {
        match self {
            RequiredCheck::Off => false,
            RequiredCheck::All => true,
            RequiredCheck::Nested => nested,
        }
    }
}

/// Which modifier set runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Set,
    Get,
}

/// Switches for the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConformSettings {
    /// Fill absent attributes from their defaults
    pub defaults: bool,
    /// Apply defaults of `force_default` attributes even over present values
    pub force_default: bool,
    pub required: RequiredCheck,
    /// Enforce `enum` and `validate` rules
    pub validate: bool,
    /// Recompute combine attributes
    pub combine: bool,
    /// Keep undeclared attributes the schema allows
    pub save_unknown: bool,
    pub modifiers: Option<ModifierKind>,
}

impl ConformSettings {
    /// Full write path used when saving a whole document.
    pub fn save() -> Self {
        Self {
            defaults: true,
            force_default: true,
            required: RequiredCheck::All,
            validate: true,
            combine: true,
            save_unknown: true,
            modifiers: Some(ModifierKind::Set),
        }
    }

    /// Values assigned with SET in an update.
    pub fn update_set() -> Self {
        Self {
            force_default: true,
            required: RequiredCheck::Nested,
            validate: true,
            save_unknown: true,
            modifiers: Some(ModifierKind::Set),
            ..Self::default()
        }
    }

    /// Values added with ADD in an update.
    pub fn update_add() -> Self {
        Self {
            force_default: true,
            save_unknown: true,
            ..Self::default()
        }
    }

    /// Values removed from a set with DELETE in an update.
    pub fn update_delete() -> Self {
        Self {
            save_unknown: true,
            ..Self::default()
        }
    }
}

/// TTL expiry handling for reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    /// Date attribute holding the expiry instant
    pub attribute: String,
    /// Return expired items flagged instead of dropping them
    pub return_expired: bool,
}

/// Switches for the read path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadSettings {
    pub save_unknown: bool,
    pub get_modifiers: bool,
    pub expiry: Option<Expiry>,
}

impl ReadSettings {
    /// Read path used for items returned by the store.
    pub fn full() -> Self {
        Self {
            save_unknown: true,
            get_modifiers: true,
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: Option<Expiry>) -> Self {
        self.expiry = expiry;
        self
    }
}

/// Conform an object to `schema` without converting it.
pub fn conform(schema: &Schema, object: &Object, settings: &ConformSettings) -> Result<Object> {
    let mut out = conform_level(schema, schema.attributes(), "", object, settings)?;
    if settings.combine {
        apply_combine(schema, &mut out);
    }
    if let Some(kind) = settings.modifiers {
        apply_modifiers(schema.attributes(), &mut out, kind);
    }
    Ok(out)
}

/// Conform a single attribute value addressed by dotted `path`.
///
/// Returns `None` when the value is dropped: a null on an attribute that does
/// not accept null, or an undeclared attribute the schema does not keep.
pub fn conform_attribute(
    schema: &Schema,
    path: &str,
    value: Value,
    settings: &ConformSettings,
) -> Result<Option<Value>> {
    match schema.attribute(path) {
        Some(attribute) => {
            let nested = path.contains('.');
            let conformed = conform_value(schema, attribute, path, Some(value), settings, nested)?;
            Ok(match (conformed, settings.modifiers) {
                (Some(value), Some(kind)) => Some(modify(attribute, value, kind)),
                (conformed, _) => conformed,
            })
        }
        None if settings.save_unknown => Ok(keep_unknown(schema, path, &value)),
        None => Ok(None),
    }
}

/// Conform and convert an object to a wire item.
pub fn to_item(schema: &Schema, object: &Object, settings: &ConformSettings) -> Result<Item> {
    let conformed = conform(schema, object, settings)?;
    convert(schema, &conformed)
}

/// Convert already conformed values with their resolved types.
pub fn convert(schema: &Schema, object: &Object) -> Result<Item> {
    object
        .iter()
        .map(|(name, value)| convert_value(schema, name, value).map(|av| (name.clone(), av)))
        .collect()
}

/// Convert one value at `path` with its resolved type.
pub fn convert_value(
    schema: &Schema,
    path: &str,
    value: &Value,
) -> Result<crate::wire::AttributeValue> {
    match schema.resolve_type(path, value, true)? {
        ResolvedType::Declared(attribute_type) => attribute_type.to_wire(path, value),
        ResolvedType::Unknown => to_attribute_value(value).map_err(|e| with_attribute(e, path)),
    }
}

/// Convert a key to a wire item.
///
/// A map supplies the hash key and, when present and non-null, the range key.
/// Any other value is taken as the bare hash key.
pub fn key_to_item(schema: &Schema, key: &Value) -> Result<Item> {
    let mut item = Item::new();
    match key {
        Value::Map(map) => {
            let hash = map.get(schema.hash_key()).ok_or_else(|| {
                Error::InvalidParameter(format!("key is missing hash key {}", schema.hash_key()))
            })?;
            item.insert(
                schema.hash_key().to_string(),
                convert_value(schema, schema.hash_key(), hash)?,
            );
            if let Some(range_key) = schema.range_key() {
                if let Some(range) = map.get(range_key).filter(|v| !v.is_null()) {
                    item.insert(range_key.to_string(), convert_value(schema, range_key, range)?);
                }
            }
        }
        hash => {
            item.insert(
                schema.hash_key().to_string(),
                convert_value(schema, schema.hash_key(), hash)?,
            );
        }
    }
    Ok(item)
}

/// Split the key attributes off an object.
pub fn split_key(schema: &Schema, object: &Object) -> (Object, Object) {
    let mut rest = object.clone();
    let mut key = Object::new();
    for name in std::iter::once(schema.hash_key()).chain(schema.range_key()) {
        if let Some(value) = rest.remove(name) {
            key.insert(name.to_string(), value);
        }
    }
    (key, rest)
}

/// Decode the key attributes of a wire item.
///
/// Unlike [`from_item`] this keeps combine keys, since a pagination key must
/// carry every key attribute back to the store.
pub fn key_from_item(schema: &Schema, item: &Item) -> Result<Object> {
    let mut key = Object::new();
    for name in std::iter::once(schema.hash_key()).chain(schema.range_key()) {
        let Some(av) = item.get(name) else { continue };
        let value = match schema.attribute(name) {
            Some(attribute) => decode_with(&attribute.types, name, av)?,
            None => from_attribute_value(av).map_err(|e| with_attribute(e, name))?,
        };
        key.insert(name.to_string(), value);
    }
    Ok(key)
}

/// Decode a wire item into a document.
///
/// Returns `None` when the item is expired and expired items are not returned.
pub fn from_item(
    schema: &Schema,
    item: &Item,
    settings: &ReadSettings,
    now: DateTime<Utc>,
) -> Result<Option<Document>> {
    let mut values = Object::new();
    for (name, av) in item {
        match schema.attribute(name) {
            Some(attribute) if attribute.combine().is_some() => {}
            Some(attribute) => {
                let mut value = decode_with(&attribute.types, name, av)?;
                if let (Value::Map(map), Some(children)) = (&mut value, attribute.nested_attributes()) {
                    retain_known(schema, children, name, map, settings.save_unknown);
                }
                values.insert(name.clone(), value);
            }
            None if settings.save_unknown && schema.allows_unknown(name) => {
                let value = from_attribute_value(av).map_err(|e| with_attribute(e, name))?;
                if let Some(kept) = keep_unknown(schema, name, &value) {
                    values.insert(name.clone(), kept);
                }
            }
            None => {}
        }
    }

    let expired = settings.expiry.as_ref().and_then(|expiry| {
        values
            .get(&expiry.attribute)
            .and_then(Value::as_date)
            .filter(|at| *at < now)
            .map(|_| expiry.return_expired)
    });

    if settings.get_modifiers {
        apply_modifiers(schema.attributes(), &mut values, ModifierKind::Get);
    }

    Ok(match expired {
        Some(false) => None,
        Some(true) => Some(Document::expired(values)),
        None => Some(Document::new(values)),
    })
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn conform_level(
    schema: &Schema,
    attributes: &[Attribute],
    prefix: &str,
    input: &Object,
    settings: &ConformSettings,
) -> Result<Object> {
    let nested = !prefix.is_empty();
    let mut out = Object::new();
    for attribute in attributes {
        if attribute.combine().is_some() {
            continue;
        }
        let path = join_path(prefix, &attribute.name);
        let value = input.get(&attribute.name).cloned();
        if let Some(value) = conform_value(schema, attribute, &path, value, settings, nested)? {
            out.insert(attribute.name.clone(), value);
        }
    }
    if settings.save_unknown {
        for (key, value) in input {
            if attributes.iter().any(|a| a.name == *key) {
                continue;
            }
            if let Some(kept) = keep_unknown(schema, &join_path(prefix, key), value) {
                out.insert(key.clone(), kept);
            }
        }
    }
    Ok(out)
}

fn conform_value(
    schema: &Schema,
    attribute: &Attribute,
    path: &str,
    value: Option<Value>,
    settings: &ConformSettings,
    nested: bool,
) -> Result<Option<Value>> {
    let mut value = value.filter(|v| !v.is_null() || attribute.accepts_null());
    if settings.force_default && attribute.force_default {
        if let Some(default) = attribute.default_now() {
            value = Some(default);
        }
    } else if value.is_none() && settings.defaults {
        value = attribute.default_now();
    }

    let value = match (value, attribute.nested_attributes()) {
        (Some(Value::Map(map)), Some(children)) => Some(Value::Map(conform_level(
            schema, children, path, &map, settings,
        )?)),
        (value, _) => value,
    };

    match &value {
        None if attribute.required && settings.required.applies(nested) => {
            return Err(Error::ValidationError(format!(
                "{} is a required property but has no value when trying to save document",
                path
            )));
        }
        Some(v) if settings.validate => attribute.check_constraints(path, v)?,
        _ => {}
    }
    Ok(value)
}

fn keep_unknown(schema: &Schema, path: &str, value: &Value) -> Option<Value> {
    if !schema.allows_unknown(path) {
        return None;
    }
    match value {
        Value::Map(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| keep_unknown(schema, &join_path(path, k), v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

fn retain_known(
    schema: &Schema,
    attributes: &[Attribute],
    prefix: &str,
    map: &mut Object,
    save_unknown: bool,
) {
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let path = join_path(prefix, &key);
        match attributes.iter().find(|a| a.name == key) {
            Some(attribute) => {
                if let (Some(Value::Map(inner)), Some(children)) =
                    (map.get_mut(&key), attribute.nested_attributes())
                {
                    retain_known(schema, children, &path, inner, save_unknown);
                }
            }
            None => {
                let kept = map
                    .remove(&key)
                    .filter(|_| save_unknown)
                    .and_then(|value| keep_unknown(schema, &path, &value));
                if let Some(kept) = kept {
                    map.insert(key, kept);
                }
            }
        }
    }
}

fn apply_combine(schema: &Schema, out: &mut Object) {
    for attribute in schema.attributes() {
        let Some((sources, separator)) = attribute.combine() else {
            continue;
        };
        let parts: Vec<String> = sources
            .iter()
            .filter_map(|source| out.get(source))
            .filter(|value| !value.is_null())
            .map(Value::to_joined_string)
            .collect();
        if !parts.is_empty() {
            out.insert(attribute.name.clone(), Value::String(parts.join(separator)));
        }
    }
}

fn modify(attribute: &Attribute, value: Value, kind: ModifierKind) -> Value {
    let value = match (value, attribute.nested_attributes()) {
        (Value::Map(mut map), Some(children)) => {
            apply_modifiers(children, &mut map, kind);
            Value::Map(map)
        }
        (value, _) => value,
    };
    let modifier = match kind {
        ModifierKind::Set => attribute.set.as_ref(),
        ModifierKind::Get => attribute.get.as_ref(),
    };
    match modifier {
        Some(f) => f(value),
        None => value,
    }
}

fn apply_modifiers(attributes: &[Attribute], object: &mut Object, kind: ModifierKind) {
    for attribute in attributes {
        if let Some(value) = object.remove(&attribute.name) {
            object.insert(attribute.name.clone(), modify(attribute, value, kind));
        }
    }
}
