//! # Docmap Model
//!
//! Async table models on top of `docmap-engine`.
//!
//! A [`Model`] binds one or more schemas to a table. Constructing a model
//! spawns the table setup pipeline (create, wait for active, TTL, throughput
//! and index updates); data operations queue behind a readiness gate until
//! that pipeline completes, then prepare requests with the engine and send
//! them through a [`StoreClient`].
//!
//! The transport is not part of this crate: implement [`StoreClient`] for
//! whatever talks to the store.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod readiness;
pub mod registry;

pub use client::{StoreClient, TransportResult};
pub use config::{Config, ConfigError, ModelOptions, TtlOptions, UpdateTargets, WaitForActive};
pub use error::{ModelError, Result, TransportError};
pub use lifecycle::{Setup, Step, Table};
pub use model::{
    BatchGetResult, BatchGetSettings, BatchWriteResult, CreateSettings, DeleteSettings,
    GetSettings, Model, QueryResult, QuerySettings, ScanSettings, UpdateSettings,
};
pub use readiness::ReadinessGate;
pub use registry::ModelRegistry;
