//! Models: schemas bound to a table.
//!
//! A [`Model`] owns one or more schemas and the table they live in. Every data
//! operation prepares its request first, so codec and compiler errors surface
//! before anything is sent, then waits for the table to become ready and
//! dispatches through the [`StoreClient`]. The `*_request` forms return the
//! prepared request without waiting or sending.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docmap_engine::codec::{self, ConformSettings, Expiry, ReadSettings};
use docmap_engine::request::{
    non_empty, BatchGetItemInput, BatchWriteItemInput, CreateTableInput, DeleteItemInput,
    GetItemInput, ItemsOutput, KeysAndAttributes, Names, PutItemInput, QueryInput, ReturnValues,
    ScanInput, Select, UpdateItemInput, Values, WriteRequest,
};
use docmap_engine::{
    compile, select_schema, table, wire, Attribute, AttributeType, Condition, Document, Item,
    Object, Schema, UpdateOp, Value,
};
use serde::Serialize;

use crate::client::StoreClient;
use crate::config::ModelOptions;
use crate::error::Result;
use crate::lifecycle::{Setup, Table};

/// Placeholder used by the overwrite guard on create.
const HASH_KEY_PLACEHOLDER: &str = "#__hash_key";

/// Settings for [`Model::get`].
#[derive(Debug, Clone, Default)]
pub struct GetSettings {
    pub consistent: Option<bool>,
    /// Only return these attributes
    pub attributes: Option<Vec<String>>,
}

/// Settings for [`Model::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateSettings {
    /// Replace an existing item with the same key
    pub overwrite: bool,
}

/// Settings for [`Model::update`].
#[derive(Clone, Default)]
pub struct UpdateSettings {
    pub return_values: ReturnValues,
    pub condition: Option<Arc<dyn Condition>>,
}

/// Settings for [`Model::delete`].
#[derive(Clone, Default)]
pub struct DeleteSettings {
    pub condition: Option<Arc<dyn Condition>>,
}

/// Settings for [`Model::batch_get`].
#[derive(Debug, Clone, Default)]
pub struct BatchGetSettings {
    pub consistent: Option<bool>,
    pub attributes: Option<Vec<String>>,
}

/// Settings for [`Model::scan`].
#[derive(Clone, Default)]
pub struct ScanSettings {
    pub filter: Option<Arc<dyn Condition>>,
    pub limit: Option<u32>,
    /// Continue after this key
    pub start_key: Option<Value>,
    pub index: Option<String>,
    pub consistent: Option<bool>,
    pub attributes: Option<Vec<String>>,
    /// Only count matching items
    pub count: bool,
}

/// Settings for [`Model::query`].
#[derive(Clone, Default)]
pub struct QuerySettings {
    pub scan: ScanSettings,
    /// Sort ascending by range key; `None` leaves the store's default
    pub ascending: Option<bool>,
}

/// Result of a scan or query.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub count: u64,
    pub scanned_count: u64,
    /// Key to continue from, when more items remain
    pub last_key: Option<Object>,
}

/// Result of [`Model::batch_get`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetResult {
    /// Found documents in the order their keys were requested
    pub documents: Vec<Document>,
    pub unprocessed_keys: Vec<Object>,
}

/// Result of [`Model::batch_put`] and [`Model::batch_delete`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResult {
    /// Items (for puts) or keys (for deletes) the store did not process
    pub unprocessed: Vec<Object>,
}

struct Inner {
    name: String,
    schemas: Arc<Vec<Schema>>,
    options: ModelOptions,
    table: Arc<Table>,
}

/// A set of schemas bound to one table.
///
/// Cheap to clone; clones share the table and its readiness state.
#[derive(Clone)]
pub struct Model {
    inner: Arc<Inner>,
}

impl Model {
    /// Create a model and spawn its table setup.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        schemas: Vec<Schema>,
        options: ModelOptions,
        client: Arc<dyn StoreClient>,
    ) -> Result<Self> {
        let name = name.into();
        table::check_key_agreement(&schemas)?;
        let schemas = match &options.ttl {
            Some(ttl) => {
                let lifetime = chrono::Duration::from_std(ttl.ttl).map_err(|_| {
                    docmap_engine::Error::InvalidParameter(format!(
                        "ttl of {:?} is out of range",
                        ttl.ttl
                    ))
                })?;
                let attribute = Attribute::new(ttl.attribute.clone(), AttributeType::date_seconds())
                    .default_with(move || Value::Date(Utc::now() + lifetime));
                schemas
                    .into_iter()
                    .map(|schema| schema.with_attribute(attribute.clone()))
                    .collect::<docmap_engine::Result<Vec<_>>>()?
            }
            None => schemas,
        };

        let table = Arc::new(Table::new(options.table_name(&name), client));
        let schemas = Arc::new(schemas);
        tracing::info!(model = %name, table = %table.name(), schemas = schemas.len(), "Model created");

        Setup::new(table.clone(), schemas.clone(), options.clone()).spawn();

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                schemas,
                options,
                table,
            }),
        })
    }

    /// Model name without prefix or suffix.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn table_name(&self) -> &str {
        self.inner.table.name()
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.inner.table
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.inner.schemas
    }

    pub fn options(&self) -> &ModelOptions {
        &self.inner.options
    }

    /// Schema that fits `object` best.
    pub fn schema_for(&self, object: &Object) -> &Schema {
        &self.inner.schemas[select_schema(&self.inner.schemas, object)]
    }

    fn key_schema(&self) -> &Schema {
        &self.inner.schemas[0]
    }

    /// The create-table request for this model.
    pub fn create_table_request(&self) -> Result<CreateTableInput> {
        Ok(table::create_table_input(
            self.table_name(),
            &self.inner.schemas,
            self.inner.options.throughput,
        )?)
    }

    // ------------------------------------------------------------------
    // Get
    // ------------------------------------------------------------------

    pub fn get_request(&self, key: impl Into<Value>, settings: &GetSettings) -> Result<GetItemInput> {
        let (projection_expression, names) = match &settings.attributes {
            Some(attributes) => {
                let (expression, names) = projection(attributes, 0);
                (Some(expression), Some(names))
            }
            None => (None, None),
        };
        Ok(GetItemInput {
            table_name: self.table_name().to_string(),
            key: codec::key_to_item(self.key_schema(), &key.into())?,
            consistent_read: settings.consistent,
            projection_expression,
            expression_attribute_names: names,
        })
    }

    /// Get one document by key.
    pub async fn get(&self, key: impl Into<Value>, settings: &GetSettings) -> Result<Option<Document>> {
        let input = self.get_request(key, settings)?;
        self.ready().await;
        tracing::debug!(table = %self.table_name(), "Dispatching get_item");
        let output = self.client().get_item(input).await?;
        match output.item {
            Some(item) => self.document_from_item(&item, Utc::now()),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    fn prepare_put(&self, object: &Object, settings: &CreateSettings) -> Result<(PutItemInput, Document)> {
        let schema = self.schema_for(object);
        let conformed = codec::conform(schema, object, &ConformSettings::save())?;
        let item = codec::convert(schema, &conformed)?;
        let (condition_expression, names) = if settings.overwrite {
            (None, None)
        } else {
            let mut names = Names::new();
            names.insert(HASH_KEY_PLACEHOLDER.to_string(), schema.hash_key().to_string());
            (
                Some(format!("attribute_not_exists({})", HASH_KEY_PLACEHOLDER)),
                Some(names),
            )
        };
        let input = PutItemInput {
            table_name: self.table_name().to_string(),
            item,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: None,
        };
        Ok((input, Document::new(conformed)))
    }

    pub fn create_request(&self, object: &Object, settings: &CreateSettings) -> Result<PutItemInput> {
        self.prepare_put(object, settings).map(|(input, _)| input)
    }

    /// Save a new document. Fails remotely when the key exists, unless
    /// `overwrite` is set.
    pub async fn create(&self, object: &Object, settings: &CreateSettings) -> Result<Document> {
        let (input, document) = self.prepare_put(object, settings)?;
        self.ready().await;
        tracing::debug!(table = %self.table_name(), "Dispatching put_item");
        self.client().put_item(input).await?;
        Ok(document)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_request(
        &self,
        key: impl Into<Value>,
        ops: &[UpdateOp],
        settings: &UpdateSettings,
    ) -> Result<UpdateItemInput> {
        let key = codec::key_to_item(self.key_schema(), &key.into())?;
        let mut names = Names::new();
        let mut values = Values::new();
        let mut next_index = 0;
        let mut condition_expression = None;
        if let Some(condition) = &settings.condition {
            let fragment = condition.render(0)?;
            names.extend(fragment.names);
            values.extend(fragment.values);
            next_index = fragment.next_index;
            condition_expression = Some(fragment.expression).filter(|e| !e.is_empty());
        }

        let plan = compile(self.key_schema(), ops, next_index)?;
        names.extend(plan.names);
        values.extend(plan.values);

        Ok(UpdateItemInput {
            table_name: self.table_name().to_string(),
            key,
            update_expression: plan.update_expression,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: non_empty(values),
            return_values: settings.return_values,
        })
    }

    /// Apply update operations to the item at `key`.
    ///
    /// Returns the document the store sends back for `return_values`.
    pub async fn update(
        &self,
        key: impl Into<Value>,
        ops: &[UpdateOp],
        settings: &UpdateSettings,
    ) -> Result<Option<Document>> {
        let input = self.update_request(key, ops, settings)?;
        self.dispatch_update(input).await
    }

    /// Update using a whole object: the key attributes are split off and the
    /// rest is parsed as the update.
    pub fn update_object_request(&self, object: &Object, settings: &UpdateSettings) -> Result<UpdateItemInput> {
        let (key, rest) = codec::split_key(self.key_schema(), object);
        let ops = UpdateOp::parse(&rest)?;
        self.update_request(Value::Map(key), &ops, settings)
    }

    pub async fn update_object(&self, object: &Object, settings: &UpdateSettings) -> Result<Option<Document>> {
        let input = self.update_object_request(object, settings)?;
        self.dispatch_update(input).await
    }

    async fn dispatch_update(&self, input: UpdateItemInput) -> Result<Option<Document>> {
        self.ready().await;
        tracing::debug!(
            table = %self.table_name(),
            expression = %input.update_expression,
            "Dispatching update_item"
        );
        let output = self.client().update_item(input).await?;
        match output.attributes {
            Some(item) => self.document_from_item(&item, Utc::now()),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn delete_request(&self, key: impl Into<Value>, settings: &DeleteSettings) -> Result<DeleteItemInput> {
        let key = codec::key_to_item(self.key_schema(), &key.into())?;
        let fragment = settings
            .condition
            .as_ref()
            .map(|condition| condition.render(0))
            .transpose()?;
        Ok(match fragment {
            Some(fragment) => DeleteItemInput {
                table_name: self.table_name().to_string(),
                key,
                condition_expression: Some(fragment.expression).filter(|e| !e.is_empty()),
                expression_attribute_names: non_empty(fragment.names),
                expression_attribute_values: non_empty(fragment.values),
            },
            None => DeleteItemInput {
                table_name: self.table_name().to_string(),
                key,
                condition_expression: None,
                expression_attribute_names: None,
                expression_attribute_values: None,
            },
        })
    }

    pub async fn delete(&self, key: impl Into<Value>, settings: &DeleteSettings) -> Result<()> {
        let input = self.delete_request(key, settings)?;
        self.ready().await;
        tracing::debug!(table = %self.table_name(), "Dispatching delete_item");
        self.client().delete_item(input).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    fn key_items(&self, keys: &[Value]) -> Result<Vec<Item>> {
        keys.iter()
            .map(|key| Ok(codec::key_to_item(self.key_schema(), key)?))
            .collect()
    }

    pub fn batch_get_request(&self, keys: &[Value], settings: &BatchGetSettings) -> Result<BatchGetItemInput> {
        let (projection_expression, names) = match &settings.attributes {
            Some(attributes) => {
                let (expression, names) = projection(attributes, 0);
                (Some(expression), Some(names))
            }
            None => (None, None),
        };
        let mut request_items = BTreeMap::new();
        request_items.insert(
            self.table_name().to_string(),
            KeysAndAttributes {
                keys: self.key_items(keys)?,
                consistent_read: settings.consistent,
                projection_expression,
                expression_attribute_names: names,
            },
        );
        Ok(BatchGetItemInput { request_items })
    }

    /// Get many documents by key.
    pub async fn batch_get(&self, keys: &[Value], settings: &BatchGetSettings) -> Result<BatchGetResult> {
        let input = self.batch_get_request(keys, settings)?;
        let requested = input
            .request_items
            .get(self.table_name())
            .map(|k| k.keys.clone())
            .unwrap_or_default();
        self.ready().await;
        tracing::debug!(table = %self.table_name(), keys = requested.len(), "Dispatching batch_get_item");
        let mut output = self.client().batch_get_item(input).await?;

        let found = output.responses.remove(self.table_name()).unwrap_or_default();
        let unprocessed = output
            .unprocessed_keys
            .remove(self.table_name())
            .map(|k| k.keys)
            .unwrap_or_default();
        let now = Utc::now();

        let mut result = BatchGetResult::default();
        for key in &requested {
            if let Some(item) = found.iter().find(|item| self.same_key(key, item)) {
                if let Some(document) = self.document_from_item(item, now)? {
                    result.documents.push(document);
                }
            }
            if unprocessed.iter().any(|k| self.same_key(key, k)) {
                result.unprocessed_keys.push(self.decode_key(key)?);
            }
        }
        Ok(result)
    }

    fn prepare_batch_put(&self, objects: &[Object]) -> Result<BatchWriteItemInput> {
        let requests = objects
            .iter()
            .map(|object| {
                let item = codec::to_item(self.schema_for(object), object, &ConformSettings::save())?;
                Ok(WriteRequest::put(item))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut request_items = BTreeMap::new();
        request_items.insert(self.table_name().to_string(), requests);
        Ok(BatchWriteItemInput { request_items })
    }

    pub fn batch_put_request(&self, objects: &[Object]) -> Result<BatchWriteItemInput> {
        self.prepare_batch_put(objects)
    }

    /// Save many documents, overwriting existing items.
    pub async fn batch_put(&self, objects: &[Object]) -> Result<BatchWriteResult> {
        let input = self.prepare_batch_put(objects)?;
        let sent: Vec<Item> = written(&input, self.table_name(), |r| {
            r.put_request.as_ref().map(|p| p.item.clone())
        });
        self.ready().await;
        tracing::debug!(table = %self.table_name(), items = sent.len(), "Dispatching batch_write_item");
        let output = self.client().batch_write_item(input).await?;

        let unprocessed: Vec<Item> = output
            .unprocessed_items
            .get(self.table_name())
            .into_iter()
            .flatten()
            .filter_map(|r| r.put_request.as_ref().map(|p| p.item.clone()))
            .collect();
        let now = Utc::now();
        let mut result = BatchWriteResult::default();
        for item in &sent {
            if let Some(pending) = unprocessed.iter().find(|u| self.same_key(item, u)) {
                if let Some(document) = self.document_from_item(pending, now)? {
                    result.unprocessed.push(document.into_values());
                }
            }
        }
        Ok(result)
    }

    pub fn batch_delete_request(&self, keys: &[Value]) -> Result<BatchWriteItemInput> {
        let requests = self
            .key_items(keys)?
            .into_iter()
            .map(WriteRequest::delete)
            .collect();
        let mut request_items = BTreeMap::new();
        request_items.insert(self.table_name().to_string(), requests);
        Ok(BatchWriteItemInput { request_items })
    }

    /// Delete many items by key.
    pub async fn batch_delete(&self, keys: &[Value]) -> Result<BatchWriteResult> {
        let input = self.batch_delete_request(keys)?;
        let sent: Vec<Item> = written(&input, self.table_name(), |r| {
            r.delete_request.as_ref().map(|d| d.key.clone())
        });
        self.ready().await;
        tracing::debug!(table = %self.table_name(), keys = sent.len(), "Dispatching batch_write_item");
        let output = self.client().batch_write_item(input).await?;

        let unprocessed: Vec<Item> = output
            .unprocessed_items
            .get(self.table_name())
            .into_iter()
            .flatten()
            .filter_map(|r| r.delete_request.as_ref().map(|d| d.key.clone()))
            .collect();
        let mut result = BatchWriteResult::default();
        for key in &sent {
            if unprocessed.iter().any(|u| self.same_key(key, u)) {
                result.unprocessed.push(self.decode_key(key)?);
            }
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Scan and query
    // ------------------------------------------------------------------

    pub fn scan_request(&self, settings: &ScanSettings) -> Result<ScanInput> {
        let mut expressions = Expressions::default();
        let filter_expression = expressions.render(settings.filter.as_deref())?;
        let projection_expression = expressions.project(settings.attributes.as_deref());
        Ok(ScanInput {
            table_name: self.table_name().to_string(),
            index_name: settings.index.clone(),
            filter_expression,
            projection_expression,
            expression_attribute_names: non_empty(expressions.names),
            expression_attribute_values: non_empty(expressions.values),
            limit: settings.limit,
            exclusive_start_key: self.start_key(settings)?,
            consistent_read: settings.consistent,
            select: settings.count.then_some(Select::Count),
        })
    }

    /// Scan the table, or an index, with an optional filter.
    pub async fn scan(&self, settings: &ScanSettings) -> Result<QueryResult> {
        let input = self.scan_request(settings)?;
        self.ready().await;
        tracing::debug!(table = %self.table_name(), "Dispatching scan");
        let output = self.client().scan(input).await?;
        self.query_result(output)
    }

    pub fn query_request(&self, key_condition: &dyn Condition, settings: &QuerySettings) -> Result<QueryInput> {
        let mut expressions = Expressions::default();
        let key_condition_expression = expressions.render(Some(key_condition))?.ok_or_else(|| {
            docmap_engine::Error::InvalidParameter("query requires a key condition".into())
        })?;
        let scan = &settings.scan;
        let filter_expression = expressions.render(scan.filter.as_deref())?;
        let projection_expression = expressions.project(scan.attributes.as_deref());
        Ok(QueryInput {
            table_name: self.table_name().to_string(),
            index_name: scan.index.clone(),
            key_condition_expression,
            filter_expression,
            projection_expression,
            expression_attribute_names: non_empty(expressions.names),
            expression_attribute_values: non_empty(expressions.values),
            limit: scan.limit,
            exclusive_start_key: self.start_key(scan)?,
            consistent_read: scan.consistent,
            scan_index_forward: settings.ascending,
            select: scan.count.then_some(Select::Count),
        })
    }

    /// Query by key condition with an optional filter.
    pub async fn query(&self, key_condition: &dyn Condition, settings: &QuerySettings) -> Result<QueryResult> {
        let input = self.query_request(key_condition, settings)?;
        self.ready().await;
        tracing::debug!(
            table = %self.table_name(),
            key_condition = %input.key_condition_expression,
            "Dispatching query"
        );
        let output = self.client().query(input).await?;
        self.query_result(output)
    }

    fn start_key(&self, settings: &ScanSettings) -> Result<Option<Item>> {
        Ok(settings
            .start_key
            .as_ref()
            .map(|key| codec::key_to_item(self.key_schema(), key))
            .transpose()?)
    }

    fn query_result(&self, output: ItemsOutput) -> Result<QueryResult> {
        let now = Utc::now();
        let mut documents = Vec::with_capacity(output.items.len());
        for item in &output.items {
            if let Some(document) = self.document_from_item(item, now)? {
                documents.push(document);
            }
        }
        Ok(QueryResult {
            documents,
            count: output.count,
            scanned_count: output.scanned_count,
            last_key: output
                .last_evaluated_key
                .as_ref()
                .map(|key| self.decode_key(key))
                .transpose()?,
        })
    }

    // ------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------

    fn read_settings(&self) -> ReadSettings {
        ReadSettings::full().with_expiry(self.inner.options.ttl.as_ref().map(|ttl| Expiry {
            attribute: ttl.attribute.clone(),
            return_expired: ttl.return_expired,
        }))
    }

    /// Decode a stored item with the schema it fits best.
    ///
    /// `None` when the item has expired and expired items are not returned.
    pub fn document_from_item(&self, item: &Item, now: DateTime<Utc>) -> Result<Option<Document>> {
        let object = wire::unmarshall(item)?;
        let schema = self.schema_for(&object);
        Ok(codec::from_item(schema, item, &self.read_settings(), now)?)
    }

    fn decode_key(&self, key: &Item) -> Result<Object> {
        Ok(codec::key_from_item(self.key_schema(), key)?)
    }

    fn same_key(&self, a: &Item, b: &Item) -> bool {
        let schema = self.key_schema();
        std::iter::once(schema.hash_key())
            .chain(schema.range_key())
            .all(|name| match (a.get(name), b.get(name)) {
                (Some(x), Some(y)) => wire::same_attribute_value(x, y),
                (None, None) => true,
                _ => false,
            })
    }

    fn client(&self) -> &Arc<dyn StoreClient> {
        self.inner.table.client()
    }

    async fn ready(&self) {
        if !self.inner.table.is_ready() {
            tracing::debug!(table = %self.table_name(), "Waiting for table to become ready");
        }
        self.inner.table.ready().await
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("table", &self.inner.table)
            .field("schemas", &self.inner.schemas.len())
            .finish()
    }
}

/// Placeholder mappings shared by the parts of one scan or query request.
#[derive(Default)]
struct Expressions {
    names: Names,
    values: Values,
    next_index: usize,
}

impl Expressions {
    fn render(&mut self, condition: Option<&dyn Condition>) -> Result<Option<String>> {
        let Some(condition) = condition else {
            return Ok(None);
        };
        let fragment = condition.render(self.next_index)?;
        self.names.extend(fragment.names);
        self.values.extend(fragment.values);
        self.next_index = fragment.next_index;
        Ok(Some(fragment.expression).filter(|e| !e.is_empty()))
    }

    fn project(&mut self, attributes: Option<&[String]>) -> Option<String> {
        let attributes = attributes?;
        let (expression, names) = projection(attributes, self.next_index);
        self.next_index += attributes.len();
        self.names.extend(names);
        Some(expression)
    }
}

/// `#aN, #aN+1, ...` projection over `attributes`.
fn projection(attributes: &[String], start_index: usize) -> (String, Names) {
    let mut names = Names::new();
    let placeholders: Vec<String> = attributes
        .iter()
        .enumerate()
        .map(|(i, attribute)| {
            let placeholder = format!("#a{}", start_index + i);
            names.insert(placeholder.clone(), attribute.clone());
            placeholder
        })
        .collect();
    (placeholders.join(", "), names)
}

fn written<F>(input: &BatchWriteItemInput, table_name: &str, select: F) -> Vec<Item>
where
    F: Fn(&WriteRequest) -> Option<Item>,
{
    input
        .request_items
        .get(table_name)
        .into_iter()
        .flatten()
        .filter_map(select)
        .collect()
}
