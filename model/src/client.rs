//! Store client seam.
//!
//! The transport to the store lives outside this crate. Anything that can send
//! the native requests implements [`StoreClient`]; errors come back as
//! [`TransportError`] and are propagated unmodified.

use async_trait::async_trait;
use docmap_engine::request::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    CreateTableInput, DeleteItemInput, DeleteItemOutput, DescribeTableInput, DescribeTableOutput,
    DescribeTimeToLiveInput, DescribeTimeToLiveOutput, GetItemInput, GetItemOutput, PutItemInput,
    PutItemOutput, QueryInput, QueryOutput, ScanInput, ScanOutput, UpdateItemInput,
    UpdateItemOutput, UpdateTableInput, UpdateTimeToLiveInput,
};

use crate::error::TransportError;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Async client for a DynamoDB-style store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn describe_table(&self, input: DescribeTableInput) -> TransportResult<DescribeTableOutput>;

    async fn create_table(&self, input: CreateTableInput) -> TransportResult<DescribeTableOutput>;

    async fn update_table(&self, input: UpdateTableInput) -> TransportResult<DescribeTableOutput>;

    async fn describe_time_to_live(
        &self,
        input: DescribeTimeToLiveInput,
    ) -> TransportResult<DescribeTimeToLiveOutput>;

    async fn update_time_to_live(&self, input: UpdateTimeToLiveInput) -> TransportResult<()>;

    async fn get_item(&self, input: GetItemInput) -> TransportResult<GetItemOutput>;

    async fn put_item(&self, input: PutItemInput) -> TransportResult<PutItemOutput>;

    async fn update_item(&self, input: UpdateItemInput) -> TransportResult<UpdateItemOutput>;

    async fn delete_item(&self, input: DeleteItemInput) -> TransportResult<DeleteItemOutput>;

    async fn batch_get_item(&self, input: BatchGetItemInput) -> TransportResult<BatchGetItemOutput>;

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> TransportResult<BatchWriteItemOutput>;

    async fn scan(&self, input: ScanInput) -> TransportResult<ScanOutput>;

    async fn query(&self, input: QueryInput) -> TransportResult<QueryOutput>;
}
