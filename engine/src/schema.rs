//! Schema definition.
//!
//! A [`Schema`] is an ordered list of [`Attribute`] definitions plus the policy
//! for attributes it does not declare. Schemas are validated when they are
//! built, so every later stage can rely on their invariants.

use crate::types::{best_match, type_names, AttributeType};
use crate::value::Value;
use crate::wire::WireType;
use crate::{error::Result, Error};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Zero-argument deriving function for defaults.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;
/// Value transformer applied on write (`set`) or read (`get`).
pub type Modifier = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Predicate used by `validate`.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Default of an attribute.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Computed(DefaultFn),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Custom validation rule.
#[derive(Clone)]
pub enum Validation {
    /// Value must equal this literal
    Equals(Value),
    Predicate(Predicate),
}

impl Validation {
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Validation::Equals(expected) => expected == value,
            Validation::Predicate(p) => p(value),
        }
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Equals(value) => f.debug_tuple("Equals").field(value).finish(),
            Validation::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Role of an attribute in the table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Hash,
    Range,
}

/// Provisioned capacity or on-demand billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throughput {
    OnDemand,
    Provisioned { read: u64, write: u64 },
}

impl Default for Throughput {
    fn default() -> Self {
        Throughput::Provisioned { read: 1, write: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Global,
    Local,
}

/// Which attributes an index projects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexProjection {
    #[default]
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// Index membership declared on an attribute.
///
/// For a global index the attribute is the index hash key; for a local index it
/// is the index range key and the table hash key is reused.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: Option<String>,
    pub kind: IndexKind,
    pub range_key: Option<String>,
    pub projection: IndexProjection,
    pub throughput: Option<Throughput>,
}

impl IndexDef {
    pub fn global() -> Self {
        Self {
            name: None,
            kind: IndexKind::Global,
            range_key: None,
            projection: IndexProjection::All,
            throughput: None,
        }
    }

    pub fn local() -> Self {
        Self {
            kind: IndexKind::Local,
            ..Self::global()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
        self.range_key = Some(range_key.into());
        self
    }

    pub fn with_projection(mut self, projection: IndexProjection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = Some(throughput);
        self
    }
}

/// A fully resolved index: names and keys filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub projection: IndexProjection,
    pub throughput: Option<Throughput>,
}

/// Definition of an attribute in a schema.
#[derive(Clone)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Candidate types, in preference order for ties
    pub types: Vec<AttributeType>,
    /// Whether this attribute must be present after defaults
    pub required: bool,
    pub default: Option<DefaultValue>,
    /// Apply the default even when a value is present
    pub force_default: bool,
    /// Allowed values
    pub enum_values: Option<Vec<Value>>,
    pub validate: Option<Validation>,
    pub set: Option<Modifier>,
    pub get: Option<Modifier>,
    pub key: Option<KeyRole>,
    pub indexes: Vec<IndexDef>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("force_default", &self.force_default)
            .field("enum_values", &self.enum_values)
            .field("validate", &self.validate)
            .field("set", &self.set.as_ref().map(|_| ".."))
            .field("get", &self.get.as_ref().map(|_| ".."))
            .field("key", &self.key)
            .field("indexes", &self.indexes)
            .finish()
    }
}

impl Attribute {
    /// Create an optional attribute with a single type.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            types: vec![attribute_type],
            required: false,
            default: None,
            force_default: false,
            enum_values: None,
            validate: None,
            set: None,
            get: None,
            key: None,
            indexes: Vec::new(),
        }
    }

    /// Add another candidate type.
    pub fn or(mut self, attribute_type: AttributeType) -> Self {
        self.types.push(attribute_type);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    pub fn force_default(mut self) -> Self {
        self.force_default = true;
        self
    }

    pub fn enumeration<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Validation::Predicate(Arc::new(f)));
        self
    }

    pub fn validate_equals(mut self, value: impl Into<Value>) -> Self {
        self.validate = Some(Validation::Equals(value.into()));
        self
    }

    pub fn on_set<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(f));
        self
    }

    pub fn on_get<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(f));
        self
    }

    pub fn hash_key(mut self) -> Self {
        self.key = Some(KeyRole::Hash);
        self
    }

    pub fn range_key(mut self) -> Self {
        self.key = Some(KeyRole::Range);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// The default value, resolved now.
    pub fn default_now(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::resolve)
    }

    /// Source attributes and separator, when this is a combine attribute.
    pub fn combine(&self) -> Option<(&[String], &str)> {
        match self.types.as_slice() {
            [AttributeType::Combine {
                attributes,
                separator,
            }] => Some((attributes, separator)),
            _ => None,
        }
    }

    pub fn accepts_null(&self) -> bool {
        self.types.iter().any(|t| matches!(t, AttributeType::Null))
    }

    /// Nested attributes of the first map type that declares them.
    pub fn nested_attributes(&self) -> Option<&[Attribute]> {
        self.types.iter().find_map(AttributeType::nested_attributes)
    }

    /// The candidate type that fits `value` best.
    pub fn resolve_type(&self, path: &str, value: &Value) -> Result<&AttributeType> {
        best_match(&self.types, value)
            .map(|(t, _)| t)
            .ok_or_else(|| Error::type_mismatch(path, type_names(&self.types), value.kind()))
    }

    /// Whether `value` is allowed by `enum` and `validate`.
    pub(crate) fn check_constraints(&self, path: &str, value: &Value) -> Result<()> {
        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(Error::ValidationError(format!(
                    "{} must equal one of {:?} but is set to {}",
                    path,
                    allowed.iter().map(Value::to_json).collect::<Vec<_>>(),
                    value.to_json()
                )));
            }
        }
        if let Some(rule) = &self.validate {
            if !rule.check(value) {
                return Err(Error::ValidationError(format!(
                    "{} with a value of {} had a validation error when trying to save the document",
                    path,
                    value.to_json()
                )));
            }
        }
        Ok(())
    }
}

/// Result of resolving an attribute's type.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedType<'a> {
    Declared(&'a AttributeType),
    /// Sentinel for undeclared attributes when unknown attributes are allowed
    Unknown,
}

/// Which undeclared attributes survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveUnknown {
    /// Undeclared attributes are dropped
    #[default]
    Disabled,
    /// Every undeclared attribute is kept
    All,
    /// Dotted path patterns; `*` matches one segment, `**` any remaining depth
    Paths(Vec<String>),
}

/// Automatically maintained timestamp attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timestamps {
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Timestamps {
    /// `createdAt` / `updatedAt`.
    pub fn standard() -> Self {
        Self {
            created_at: Some("createdAt".into()),
            updated_at: Some("updatedAt".into()),
        }
    }
}

/// An ordered list of attributes plus the unknown-attribute policy.
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: Vec<Attribute>,
    save_unknown: SaveUnknown,
    match_prefixes: bool,
    hash_key: String,
    range_key: Option<String>,
}

impl Schema {
    /// Build and validate a schema.
    ///
    /// The hash key is the attribute flagged [`KeyRole::Hash`], or the first
    /// attribute when none is flagged.
    pub fn new(attributes: Vec<Attribute>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(Error::MissingSchema("schema has no attributes".into()));
        }
        validate_attributes(&attributes, true)?;

        let mut hash_keys = attributes.iter().filter(|a| a.key == Some(KeyRole::Hash));
        let hash_key = match (hash_keys.next(), hash_keys.next()) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter(
                    "a schema may only have one hash key".into(),
                ))
            }
            (Some(attr), None) => attr.name.clone(),
            (None, _) => attributes[0].name.clone(),
        };
        let mut range_keys = attributes.iter().filter(|a| a.key == Some(KeyRole::Range));
        let range_key = match (range_keys.next(), range_keys.next()) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter(
                    "a schema may only have one range key".into(),
                ))
            }
            (first, _) => first.map(|a| a.name.clone()),
        };
        if range_key.as_deref() == Some(hash_key.as_str()) {
            return Err(Error::InvalidParameter(format!(
                "{} cannot be both hash key and range key",
                hash_key
            )));
        }

        let schema = Self {
            attributes,
            save_unknown: SaveUnknown::Disabled,
            match_prefixes: true,
            hash_key,
            range_key,
        };
        for key in std::iter::once(schema.hash_key.as_str()).chain(schema.range_key.as_deref()) {
            schema.key_wire_type(key)?;
        }
        Ok(schema)
    }

    /// Builder-style: set the unknown-attribute policy.
    pub fn with_save_unknown(mut self, save_unknown: SaveUnknown) -> Self {
        self.save_unknown = save_unknown;
        self
    }

    /// Builder-style: whether a path that is a prefix of a pattern matches it.
    pub fn with_prefix_matches(mut self, match_prefixes: bool) -> Self {
        self.match_prefixes = match_prefixes;
        self
    }

    /// Builder-style: add the timestamp attributes.
    ///
    /// `created_at` defaults to now; `updated_at` is forced to now on every write.
    pub fn with_timestamps(self, timestamps: Timestamps) -> Result<Self> {
        let mut schema = self;
        if let Some(name) = &timestamps.created_at {
            schema = schema.with_attribute(
                Attribute::new(name.clone(), AttributeType::date())
                    .default_with(|| Value::Date(chrono::Utc::now())),
            )?;
        }
        if let Some(name) = &timestamps.updated_at {
            schema = schema.with_attribute(
                Attribute::new(name.clone(), AttributeType::date())
                    .default_with(|| Value::Date(chrono::Utc::now()))
                    .force_default(),
            )?;
        }
        Ok(schema)
    }

    /// Builder-style: add an attribute, replacing a non-key attribute of the same name.
    pub fn with_attribute(mut self, attribute: Attribute) -> Result<Self> {
        if attribute.name == self.hash_key || Some(&attribute.name) == self.range_key.as_ref() {
            return Err(Error::InvalidParameter(format!(
                "{} is a key attribute and cannot be redefined",
                attribute.name
            )));
        }
        validate_attributes(std::slice::from_ref(&attribute), true)?;
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        validate_attributes(&self.attributes, true)?;
        Ok(self)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    pub fn save_unknown(&self) -> &SaveUnknown {
        &self.save_unknown
    }

    /// Look up an attribute by dotted path, descending into declared maps.
    pub fn attribute(&self, path: &str) -> Option<&Attribute> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.attributes.iter().find(|a| a.name == first)?;
        for segment in segments {
            current = current
                .types
                .iter()
                .filter_map(AttributeType::nested_attributes)
                .flat_map(|attrs| attrs.iter())
                .find(|a| a.name == segment)?;
        }
        Some(current)
    }

    /// Whether `path` names a declared attribute.
    pub fn contains(&self, path: &str) -> bool {
        self.attribute(path).is_some()
    }

    /// Resolve the type of a value at `path`.
    pub fn resolve_type(
        &self,
        path: &str,
        value: &Value,
        unknown_allowed: bool,
    ) -> Result<ResolvedType<'_>> {
        match self.attribute(path) {
            Some(attribute) => attribute.resolve_type(path, value).map(ResolvedType::Declared),
            None if unknown_allowed => Ok(ResolvedType::Unknown),
            None => Err(Error::type_mismatch(path, "a declared attribute", value.kind())),
        }
    }

    /// Whether an undeclared attribute at `path` may be saved.
    pub fn allows_unknown(&self, path: &str) -> bool {
        match &self.save_unknown {
            SaveUnknown::Disabled => false,
            SaveUnknown::All => true,
            SaveUnknown::Paths(patterns) => wildcard_allowed(patterns, path, self.match_prefixes),
        }
    }

    /// Wire tag of a key attribute (`S`, `N` or `B`).
    pub fn key_wire_type(&self, name: &str) -> Result<WireType> {
        let attribute = self.attribute(name).ok_or_else(|| {
            Error::InvalidParameter(format!("key attribute {} is not declared", name))
        })?;
        match attribute.types.as_slice() {
            [single] if matches!(single.wire_type(), WireType::S | WireType::N | WireType::B) => {
                Ok(single.wire_type())
            }
            _ => Err(Error::InvalidParameter(format!(
                "key attribute {} must have a single string, number or binary type",
                name
            ))),
        }
    }

    /// Indexes declared on this schema's attributes.
    pub fn indexes(&self) -> Vec<IndexSpec> {
        let mut specs = Vec::new();
        for attribute in &self.attributes {
            for def in &attribute.indexes {
                let suffix = match def.kind {
                    IndexKind::Global => "GlobalIndex",
                    IndexKind::Local => "LocalIndex",
                };
                let (hash_key, range_key) = match def.kind {
                    IndexKind::Global => (attribute.name.clone(), def.range_key.clone()),
                    IndexKind::Local => (self.hash_key.clone(), Some(attribute.name.clone())),
                };
                specs.push(IndexSpec {
                    name: def
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("{}{}", attribute.name, suffix)),
                    kind: def.kind,
                    hash_key,
                    range_key,
                    projection: def.projection.clone(),
                    throughput: def.throughput,
                });
            }
        }
        specs
    }
}

fn validate_attributes(attributes: &[Attribute], top_level: bool) -> Result<()> {
    let mut seen = HashSet::new();
    for attribute in attributes {
        if !seen.insert(attribute.name.as_str()) {
            return Err(Error::InvalidParameter(format!(
                "attribute {} is declared more than once",
                attribute.name
            )));
        }
        if attribute.name.is_empty() || attribute.name.contains('.') {
            return Err(Error::InvalidParameter(format!(
                "invalid attribute name \"{}\"",
                attribute.name
            )));
        }
        if attribute.types.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "attribute {} has no type",
                attribute.name
            )));
        }
        let combines = attribute.types.iter().filter(|t| t.is_combine()).count();
        if combines > 0 && attribute.types.len() > 1 {
            return Err(Error::InvalidParameter(
                "Combine type is not allowed to be used with multiple types.".into(),
            ));
        }
        if let Some((sources, _)) = attribute.combine() {
            if !top_level {
                return Err(Error::InvalidParameter(format!(
                    "combine attribute {} must be a top-level attribute",
                    attribute.name
                )));
            }
            if sources.is_empty() || sources.iter().any(|s| !seen_or_later(attributes, s)) {
                return Err(Error::InvalidParameter(format!(
                    "combine attribute {} must reference declared attributes",
                    attribute.name
                )));
            }
        }
        for attribute_type in &attribute.types {
            validate_type(&attribute.name, attribute_type)?;
        }
    }
    Ok(())
}

fn seen_or_later(attributes: &[Attribute], name: &str) -> bool {
    attributes.iter().any(|a| a.name == name && a.combine().is_none())
}

fn validate_type(name: &str, attribute_type: &AttributeType) -> Result<()> {
    match attribute_type {
        AttributeType::Set(element) => match element.as_ref() {
            AttributeType::String
            | AttributeType::Number
            | AttributeType::Binary
            | AttributeType::Date { .. } => Ok(()),
            other => Err(Error::InvalidParameter(format!(
                "set attribute {} cannot hold {} members",
                name,
                other.name()
            ))),
        },
        AttributeType::List(Some(element)) => validate_type(name, element),
        AttributeType::Map(Some(nested)) => validate_attributes(nested, false),
        _ => Ok(()),
    }
}

/// Whether `key` matches one of the dotted `patterns`.
///
/// `*` matches exactly one segment and `**` matches any remaining depth. When
/// `match_prefixes` is set, a key that stops before the end of a pattern (a
/// parent of an allowed path) also matches.
pub fn wildcard_allowed(patterns: &[String], key: &str, match_prefixes: bool) -> bool {
    patterns.iter().any(|pattern| {
        let parts: Vec<&str> = pattern.split('.').collect();
        let mut matched = 0;
        for segment in key.split('.') {
            match parts.get(matched) {
                Some(&"**") => return true,
                Some(&"*") => {}
                Some(part) if *part == segment => {}
                _ => return false,
            }
            matched += 1;
        }
        match_prefixes || matched == parts.len()
    })
}
