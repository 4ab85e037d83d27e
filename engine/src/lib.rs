//! # Docmap Engine
//!
//! Schema-driven type resolution and expression compilation for a
//! DynamoDB-style document store.
//!
//! This crate turns typed application objects into the store's JSON wire
//! format and back, and compiles partial updates into native update
//! expressions. It prepares and validates requests; it never sends them.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of the network or the store
//! - **Deterministic**: same inputs always produce the same requests
//! - **Fail early**: every error is raised before a request leaves the process
//!
//! ## Core Concepts
//!
//! ### Schemas
//!
//! A [`Schema`] is an ordered list of [`Attribute`]s. Each attribute has one
//! or more candidate [`AttributeType`]s and optional rules: `required`,
//! defaults, `enum`, `validate`, `set`/`get` modifiers, key roles and index
//! membership.
//!
//! ### Selection
//!
//! A model may support several shapes. [`select_schema`] scores an object
//! against each schema and picks the best fit.
//!
//! ### Codec
//!
//! [`codec::to_item`] conforms an object (defaults, required checks, combine
//! attributes, modifiers) and converts it to a wire [`Item`].
//! [`codec::from_item`] decodes an item into a [`Document`].
//!
//! ### Updates
//!
//! [`UpdateOp::parse`] reads an update object once; [`compile`] turns the ops
//! into an [`UpdatePlan`] with `#aN` / `:vN` placeholders.
//!
//! ## Quick Start
//!
//! ```rust
//! use docmap_engine::{compile, Attribute, AttributeType, Schema, UpdateOp};
//! use docmap_engine::value::object_from_json;
//! use serde_json::json;
//!
//! // 1. Define a schema
//! let schema = Schema::new(vec![
//!     Attribute::new("id", AttributeType::String),
//!     Attribute::new("price", AttributeType::Number),
//!     Attribute::new("legacy", AttributeType::String),
//! ])
//! .unwrap();
//!
//! // 2. Parse an update object
//! let update = object_from_json(json!({"price": 10, "$REMOVE": ["legacy"]})).unwrap();
//! let ops = UpdateOp::parse(&update).unwrap();
//!
//! // 3. Compile it
//! let plan = compile(&schema, &ops, 0).unwrap();
//! assert_eq!(plan.update_expression, "SET #a1 = :v1 REMOVE #a0");
//! assert_eq!(plan.names["#a0"], "legacy");
//! ```

pub mod codec;
pub mod condition;
pub mod document;
pub mod error;
pub mod request;
pub mod schema;
pub mod selector;
pub mod table;
pub mod types;
pub mod update;
pub mod value;
pub mod wire;

// Re-export main types at crate root
pub use codec::{ConformSettings, Expiry, ModifierKind, ReadSettings, RequiredCheck};
pub use condition::{Comparison, Condition, ConditionFragment, Filter};
pub use document::Document;
pub use error::{Error, Result};
pub use schema::{
    Attribute, DefaultValue, IndexDef, IndexKind, IndexProjection, IndexSpec, KeyRole,
    ResolvedType, SaveUnknown, Schema, Throughput, Timestamps, Validation,
};
pub use selector::select_schema;
pub use types::{AttributeType, DateStorage};
pub use update::{compile, UpdateOp, UpdatePlan, UpdateValue};
pub use value::{Object, Value};
pub use wire::{AttributeValue, Item, WireType};
