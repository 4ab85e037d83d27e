//! Conditions rendered into request fragments.
//!
//! The filter language itself lives outside this crate; anything that can
//! render itself as an expression with `#aN` / `:vN` placeholders implements
//! [`Condition`]. [`Filter`] is a small built-in implementation covering
//! comparisons and attribute existence.

use crate::error::Result;
use crate::value::Value;
use crate::wire::{to_attribute_value, with_attribute, AttributeValue};
use std::collections::BTreeMap;

/// A rendered condition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionFragment {
    pub expression: String,
    /// Name placeholder to attribute name
    pub names: BTreeMap<String, String>,
    /// Value placeholder to wire value
    pub values: BTreeMap<String, AttributeValue>,
    /// First placeholder index not used by this fragment
    pub next_index: usize,
}

/// Something that renders into a condition expression.
pub trait Condition: Send + Sync {
    /// Render with placeholders numbered from `start_index`.
    fn render(&self, start_index: usize) -> Result<ConditionFragment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
}

impl Comparison {
    fn render(&self, name: &str, value: &str) -> String {
        match self {
            Comparison::Eq => format!("{} = {}", name, value),
            Comparison::Ne => format!("{} <> {}", name, value),
            Comparison::Lt => format!("{} < {}", name, value),
            Comparison::Le => format!("{} <= {}", name, value),
            Comparison::Gt => format!("{} > {}", name, value),
            Comparison::Ge => format!("{} >= {}", name, value),
            Comparison::BeginsWith => format!("begins_with({}, {})", name, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Compare(String, Comparison, Value),
    Exists(String),
    NotExists(String),
}

/// Conjunction of simple clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compare(mut self, attribute: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        self.clauses
            .push(Clause::Compare(attribute.into(), op, value.into()));
        self
    }

    pub fn eq(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(attribute, Comparison::Eq, value)
    }

    pub fn exists(mut self, attribute: impl Into<String>) -> Self {
        self.clauses.push(Clause::Exists(attribute.into()));
        self
    }

    pub fn not_exists(mut self, attribute: impl Into<String>) -> Self {
        self.clauses.push(Clause::NotExists(attribute.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Condition for Filter {
    fn render(&self, start_index: usize) -> Result<ConditionFragment> {
        let mut fragment = ConditionFragment {
            next_index: start_index,
            ..ConditionFragment::default()
        };
        let mut parts = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let index = fragment.next_index;
            let name_key = format!("#a{}", index);
            let part = match clause {
                Clause::Compare(attribute, op, value) => {
                    let value_key = format!(":v{}", index);
                    let av = to_attribute_value(value).map_err(|e| with_attribute(e, attribute))?;
                    fragment.names.insert(name_key.clone(), attribute.clone());
                    fragment.values.insert(value_key.clone(), av);
                    op.render(&name_key, &value_key)
                }
                Clause::Exists(attribute) => {
                    fragment.names.insert(name_key.clone(), attribute.clone());
                    format!("attribute_exists({})", name_key)
                }
                Clause::NotExists(attribute) => {
                    fragment.names.insert(name_key.clone(), attribute.clone());
                    format!("attribute_not_exists({})", name_key)
                }
            };
            parts.push(part);
            fragment.next_index += 1;
        }
        fragment.expression = parts.join(" AND ");
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_from_start_index() {
        let fragment = Filter::new()
            .eq("status", "open")
            .exists("owner")
            .render(3)
            .unwrap();
        assert_eq!(fragment.expression, "#a3 = :v3 AND attribute_exists(#a4)");
        assert_eq!(fragment.names["#a3"], "status");
        assert_eq!(fragment.names["#a4"], "owner");
        assert_eq!(fragment.values.len(), 1);
        assert_eq!(fragment.next_index, 5);
    }

    #[test]
    fn empty_filter_renders_nothing() {
        let fragment = Filter::new().render(0).unwrap();
        assert!(fragment.expression.is_empty());
        assert_eq!(fragment.next_index, 0);
    }

    #[test]
    fn begins_with() {
        let fragment = Filter::new()
            .compare("sk", Comparison::BeginsWith, "2024-")
            .render(0)
            .unwrap();
        assert_eq!(fragment.expression, "begins_with(#a0, :v0)");
    }
}
