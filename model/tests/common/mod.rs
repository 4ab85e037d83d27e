//! Shared helpers for model integration tests.
//!
//! [`MockStore`] is a scripted in-memory store client. Responses are queued per
//! operation and every call is recorded with its serialized request.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use docmap_engine::request::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    CreateTableInput, DeleteItemInput, DeleteItemOutput, DescribeTableInput, DescribeTableOutput,
    DescribeTimeToLiveInput, DescribeTimeToLiveOutput, GetItemInput, GetItemOutput,
    GlobalSecondaryIndexDescription, ItemsOutput, PutItemInput, PutItemOutput, QueryInput,
    QueryOutput, ScanInput, ScanOutput, TableDescription, TableStatus, TimeToLiveDescription,
    TimeToLiveStatus, UpdateItemInput, UpdateItemOutput, UpdateTableInput, UpdateTimeToLiveInput,
};
use docmap_engine::{Attribute, AttributeType, Schema};
use docmap_model::{StoreClient, TransportError, TransportResult};
use parking_lot::Mutex;
use serde::Serialize;

/// One recorded client call.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub input: serde_json::Value,
}

#[derive(Default)]
struct Script {
    tables: VecDeque<TransportResult<DescribeTableOutput>>,
    fallback_table: Option<TableDescription>,
    ttl: VecDeque<TimeToLiveStatus>,
    get: VecDeque<GetItemOutput>,
    update: VecDeque<UpdateItemOutput>,
    batch_get: VecDeque<BatchGetItemOutput>,
    batch_write: VecDeque<BatchWriteItemOutput>,
    items: VecDeque<ItemsOutput>,
    failures: HashMap<&'static str, TransportError>,
}

/// Scripted store client.
#[derive(Default)]
pub struct MockStore {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store whose table is already active.
    pub fn active(table_name: &str) -> Arc<Self> {
        let store = Self::new();
        store.set_table(table(table_name, TableStatus::Active));
        store
    }

    /// Description returned once the scripted ones run out.
    pub fn set_table(&self, table: TableDescription) {
        self.script.lock().fallback_table = Some(table);
    }

    pub fn push_table(&self, table: TableDescription) {
        self.script.lock().tables.push_back(Ok(DescribeTableOutput { table: Some(table) }));
    }

    pub fn push_describe_error(&self, error: TransportError) {
        self.script.lock().tables.push_back(Err(error));
    }

    pub fn push_ttl(&self, status: TimeToLiveStatus) {
        self.script.lock().ttl.push_back(status);
    }

    pub fn push_get(&self, output: GetItemOutput) {
        self.script.lock().get.push_back(output);
    }

    pub fn push_update(&self, output: UpdateItemOutput) {
        self.script.lock().update.push_back(output);
    }

    pub fn push_batch_get(&self, output: BatchGetItemOutput) {
        self.script.lock().batch_get.push_back(output);
    }

    pub fn push_batch_write(&self, output: BatchWriteItemOutput) {
        self.script.lock().batch_write.push_back(output);
    }

    pub fn push_items(&self, output: ItemsOutput) {
        self.script.lock().items.push_back(output);
    }

    /// Fail every call of `op`.
    pub fn fail(&self, op: &'static str, error: TransportError) {
        self.script.lock().failures.insert(op, error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Inputs of every call of `op`, in order.
    pub fn inputs(&self, op: &str) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.input.clone())
            .collect()
    }

    fn record<T: Serialize>(&self, op: &'static str, input: &T) -> TransportResult<()> {
        let input = serde_json::to_value(input).unwrap_or(serde_json::Value::Null);
        self.calls.lock().push(Call { op, input });
        match self.script.lock().failures.get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreClient for MockStore {
    async fn describe_table(&self, input: DescribeTableInput) -> TransportResult<DescribeTableOutput> {
        self.record("describe_table", &input)?;
        let mut script = self.script.lock();
        match script.tables.pop_front() {
            Some(result) => result,
            None => match &script.fallback_table {
                Some(table) => Ok(DescribeTableOutput {
                    table: Some(table.clone()),
                }),
                None => Err(TransportError::new(
                    "ResourceNotFoundException",
                    "Requested resource not found",
                )),
            },
        }
    }

    async fn create_table(&self, input: CreateTableInput) -> TransportResult<DescribeTableOutput> {
        self.record("create_table", &input)?;
        Ok(DescribeTableOutput {
            table: Some(table(&input.table_name, TableStatus::Creating)),
        })
    }

    async fn update_table(&self, input: UpdateTableInput) -> TransportResult<DescribeTableOutput> {
        self.record("update_table", &input)?;
        Ok(DescribeTableOutput::default())
    }

    async fn describe_time_to_live(
        &self,
        input: DescribeTimeToLiveInput,
    ) -> TransportResult<DescribeTimeToLiveOutput> {
        self.record("describe_time_to_live", &input)?;
        let status = self
            .script
            .lock()
            .ttl
            .pop_front()
            .unwrap_or(TimeToLiveStatus::Enabled);
        Ok(DescribeTimeToLiveOutput {
            time_to_live_description: Some(TimeToLiveDescription {
                time_to_live_status: Some(status),
                attribute_name: None,
            }),
        })
    }

    async fn update_time_to_live(&self, input: UpdateTimeToLiveInput) -> TransportResult<()> {
        self.record("update_time_to_live", &input)
    }

    async fn get_item(&self, input: GetItemInput) -> TransportResult<GetItemOutput> {
        self.record("get_item", &input)?;
        Ok(self.script.lock().get.pop_front().unwrap_or_default())
    }

    async fn put_item(&self, input: PutItemInput) -> TransportResult<PutItemOutput> {
        self.record("put_item", &input)?;
        Ok(PutItemOutput::default())
    }

    async fn update_item(&self, input: UpdateItemInput) -> TransportResult<UpdateItemOutput> {
        self.record("update_item", &input)?;
        Ok(self.script.lock().update.pop_front().unwrap_or_default())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> TransportResult<DeleteItemOutput> {
        self.record("delete_item", &input)?;
        Ok(DeleteItemOutput::default())
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> TransportResult<BatchGetItemOutput> {
        self.record("batch_get_item", &input)?;
        Ok(self.script.lock().batch_get.pop_front().unwrap_or_default())
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> TransportResult<BatchWriteItemOutput> {
        self.record("batch_write_item", &input)?;
        Ok(self.script.lock().batch_write.pop_front().unwrap_or_default())
    }

    async fn scan(&self, input: ScanInput) -> TransportResult<ScanOutput> {
        self.record("scan", &input)?;
        Ok(self.script.lock().items.pop_front().unwrap_or_default())
    }

    async fn query(&self, input: QueryInput) -> TransportResult<QueryOutput> {
        self.record("query", &input)?;
        Ok(self.script.lock().items.pop_front().unwrap_or_default())
    }
}

/// Table description with no indexes.
pub fn table(name: &str, status: TableStatus) -> TableDescription {
    TableDescription {
        table_name: name.to_string(),
        table_status: status,
        billing_mode_summary: None,
        provisioned_throughput: None,
        global_secondary_indexes: Vec::new(),
    }
}

/// Table description with one global index per `(name, status)`.
pub fn table_with_indexes(
    name: &str,
    status: TableStatus,
    indexes: &[(&str, TableStatus)],
) -> TableDescription {
    TableDescription {
        global_secondary_indexes: indexes
            .iter()
            .map(|(index, status)| GlobalSecondaryIndexDescription {
                index_name: index.to_string(),
                index_status: Some(*status),
                key_schema: Vec::new(),
                projection: None,
                provisioned_throughput: None,
            })
            .collect(),
        ..table(name, status)
    }
}

/// `id` hash key, `name` required, `price` number, `status` with a default.
pub fn cat_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new("name", AttributeType::String).required(),
        Attribute::new("price", AttributeType::Number),
        Attribute::new("status", AttributeType::String).default_value("new"),
    ])
    .unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docmap_model=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
