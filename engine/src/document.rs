//! Document type returned from reads.

use crate::schema::Schema;
use crate::value::{Object, Value};
use serde::{Serialize, Serializer};

/// A decoded item conforming to one schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    values: Object,
    /// Set when a TTL-expired item is returned instead of dropped
    expired: bool,
}

impl Document {
    /// Create a document from already conformed values.
    pub fn new(values: Object) -> Self {
        Self {
            values,
            expired: false,
        }
    }

    pub(crate) fn expired(values: Object) -> Self {
        Self {
            values,
            expired: true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    pub fn values(&self) -> &Object {
        &self.values
    }

    pub fn into_values(self) -> Object {
        self.values
    }

    /// The key attributes of this document under `schema`.
    pub fn key(&self, schema: &Schema) -> Object {
        std::iter::once(schema.hash_key())
            .chain(schema.range_key())
            .filter_map(|name| self.values.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    /// Plain JSON form of the values.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Map(self.values.clone()).to_json()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<Object> for Document {
    fn from(values: Object) -> Self {
        Document::new(values)
    }
}
