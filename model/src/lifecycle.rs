//! Table lifecycle state machine.
//!
//! Every model owns a [`Table`] that starts not-ready. On construction the
//! model spawns a [`Setup`] pipeline which, as configured, creates the table,
//! waits for it to become active, enables TTL and brings throughput and global
//! indexes in line. When every step succeeds the readiness gate opens and
//! queued data operations proceed. A failed step aborts the pipeline and the
//! table never becomes ready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docmap_engine::request::{
    DescribeTableInput, DescribeTimeToLiveInput, TableDescription, TimeToLiveSpecification,
    TimeToLiveStatus, UpdateTimeToLiveInput,
};
use docmap_engine::{table, Schema};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::StoreClient;
use crate::config::ModelOptions;
use crate::error::{ModelError, Result};
use crate::readiness::ReadinessGate;

/// Poll interval while TTL is being disabled.
const TTL_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// One step of the setup pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateTable,
    WaitForActive,
    UpdateTimeToLive,
    UpdateTable,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::CreateTable => "create_table",
            Step::WaitForActive => "wait_for_active",
            Step::UpdateTimeToLive => "update_time_to_live",
            Step::UpdateTable => "update_table",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps run for `options`, in order.
pub fn pipeline(options: &ModelOptions) -> Vec<Step> {
    let mut steps = Vec::new();
    if options.create {
        steps.push(Step::CreateTable);
    }
    if options.wait_for_active.enabled {
        steps.push(Step::WaitForActive);
    }
    if options.ttl.is_some() && (options.create || options.update.ttl) {
        steps.push(Step::UpdateTimeToLive);
    }
    if options.update.table() {
        steps.push(Step::UpdateTable);
    }
    steps
}

/// Remote table state shared by a model and its setup pipeline.
pub struct Table {
    name: String,
    client: Arc<dyn StoreClient>,
    gate: ReadinessGate,
    latest: RwLock<Option<TableDescription>>,
    already_created: AtomicBool,
    failure: Mutex<Option<ModelError>>,
}

impl Table {
    pub fn new(name: impl Into<String>, client: Arc<dyn StoreClient>) -> Self {
        Self {
            name: name.into(),
            client,
            gate: ReadinessGate::new(),
            latest: RwLock::new(None),
            already_created: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Wait until setup has completed.
    ///
    /// Pends forever when setup failed; see [`Table::setup_error`].
    pub async fn ready(&self) {
        self.gate.wait().await
    }

    /// Whether the table was already active when setup started.
    pub fn already_created(&self) -> bool {
        self.already_created.load(Ordering::SeqCst)
    }

    /// The error that aborted setup, if any.
    pub fn setup_error(&self) -> Option<ModelError> {
        self.failure.lock().as_ref().map(|cause| ModelError::Setup {
            table: self.name.clone(),
            reason: cause.to_string(),
        })
    }

    /// Cached description without a remote call.
    pub fn latest_description(&self) -> Option<TableDescription> {
        self.latest.read().clone()
    }

    /// Describe the table, using the cached description unless `force_refresh`
    /// is set or nothing is cached yet.
    pub async fn describe(&self, force_refresh: bool) -> Result<Option<TableDescription>> {
        if !force_refresh {
            if let Some(cached) = self.latest_description() {
                return Ok(Some(cached));
            }
        }
        tracing::debug!(table = %self.name, "Describing table");
        let output = self
            .client
            .describe_table(DescribeTableInput {
                table_name: self.name.clone(),
            })
            .await?;
        *self.latest.write() = output.table.clone();
        Ok(output.table)
    }

    /// Describe with a forced refresh, treating errors as "no table".
    async fn describe_tolerant(&self) -> Option<TableDescription> {
        match self.describe(true).await {
            Ok(table) => table,
            Err(e) => {
                tracing::debug!(table = %self.name, error = %e, "Describe table failed, assuming no table");
                None
            }
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("already_created", &self.already_created())
            .finish()
    }
}

/// The setup pipeline of one model.
pub struct Setup {
    table: Arc<Table>,
    schemas: Arc<Vec<Schema>>,
    options: ModelOptions,
}

impl Setup {
    pub fn new(table: Arc<Table>, schemas: Arc<Vec<Schema>>, options: ModelOptions) -> Self {
        Self {
            table,
            schemas,
            options,
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        pipeline(&self.options)
    }

    /// Run the pipeline in a background task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Run every step in order, then open the readiness gate.
    pub async fn run(self) -> Result<()> {
        let started = Instant::now();
        let steps = self.steps();
        tracing::info!(table = %self.table.name, steps = steps.len(), "Starting table setup");

        for step in steps {
            tracing::debug!(table = %self.table.name, step = %step, "Running setup step");
            let result = match step {
                Step::CreateTable => self.create_table().await,
                Step::WaitForActive => self.wait_for_active(started, false).await,
                Step::UpdateTimeToLive => self.update_time_to_live().await,
                Step::UpdateTable => self.update_table().await,
            };
            if let Err(e) = result {
                tracing::error!(table = %self.table.name, step = %step, error = %e, "Table setup failed");
                *self.table.failure.lock() = Some(e.clone());
                return Err(e);
            }
        }

        let released = self.table.gate.open();
        tracing::info!(
            table = %self.table.name,
            released,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Table ready"
        );
        Ok(())
    }

    async fn create_table(&self) -> Result<()> {
        let existing = self.table.describe_tolerant().await;
        if existing.is_some_and(|t| t.table_status == docmap_engine::request::TableStatus::Active) {
            self.table.already_created.store(true, Ordering::SeqCst);
            tracing::info!(table = %self.table.name, "Table already exists");
            return Ok(());
        }

        let input = table::create_table_input(&self.table.name, &self.schemas, self.options.throughput)?;
        tracing::info!(table = %self.table.name, "Creating table");
        self.table.client.create_table(input).await?;
        Ok(())
    }

    /// Poll until the table and all of its global indexes are active.
    ///
    /// The deadline counts from `started`. The first check neither sleeps nor,
    /// unless `force_first`, bypasses the cached description.
    async fn wait_for_active(&self, started: Instant, force_first: bool) -> Result<()> {
        let settings = self.options.wait_for_active;
        let mut attempt: u32 = 0;
        loop {
            let table = self.table.describe(force_first || attempt > 0).await?;
            if table.as_ref().is_some_and(TableDescription::is_fully_active) {
                tracing::debug!(table = %self.table.name, attempt, "Table is active");
                return Ok(());
            }
            if attempt > 0 {
                tokio::time::sleep(settings.frequency).await;
            }
            let elapsed = started.elapsed();
            if elapsed >= settings.timeout {
                tracing::warn!(
                    table = %self.table.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Wait for active timed out"
                );
                return Err(ModelError::WaitForActiveTimeout {
                    table: self.table.name.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
            attempt += 1;
        }
    }

    async fn update_time_to_live(&self) -> Result<()> {
        let Some(ttl) = &self.options.ttl else {
            return Ok(());
        };
        let describe = || {
            self.table.client.describe_time_to_live(DescribeTimeToLiveInput {
                table_name: self.table.name.clone(),
            })
        };

        let mut status = describe().await?.status();
        while status == Some(TimeToLiveStatus::Disabling) {
            tracing::debug!(table = %self.table.name, "Waiting for TTL to finish disabling");
            tokio::time::sleep(TTL_POLL_INTERVAL).await;
            status = describe().await?.status();
        }

        match status {
            None | Some(TimeToLiveStatus::Disabled) => {
                tracing::info!(table = %self.table.name, attribute = %ttl.attribute, "Enabling TTL");
                self.table
                    .client
                    .update_time_to_live(UpdateTimeToLiveInput {
                        table_name: self.table.name.clone(),
                        time_to_live_specification: TimeToLiveSpecification {
                            enabled: true,
                            attribute_name: ttl.attribute.clone(),
                        },
                    })
                    .await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn update_table(&self) -> Result<()> {
        let targets = self.options.update;

        if targets.throughput {
            let current = self.described().await?;
            if let Some(input) =
                table::throughput_update(&self.table.name, self.options.throughput, &current)
            {
                tracing::info!(table = %self.table.name, "Updating table throughput");
                self.table.client.update_table(input).await?;
                self.wait_for_active(Instant::now(), true).await?;
            }
        }

        if targets.indexes {
            let current = self.described().await?;
            let expected = table::global_indexes(&self.schemas, self.options.throughput);
            let changes = table::index_changes(&expected, &current.global_secondary_indexes);
            if !changes.is_empty() {
                let definitions = table::attribute_definitions(&self.schemas)?;
                for change in &changes {
                    tracing::info!(table = %self.table.name, change = ?change, "Updating table index");
                    let input = table::index_update(&self.table.name, change, &definitions);
                    self.table.client.update_table(input).await?;
                    self.wait_for_active(Instant::now(), true).await?;
                }
            }
        }
        Ok(())
    }

    async fn described(&self) -> Result<TableDescription> {
        self.table.describe(false).await?.ok_or_else(|| ModelError::Setup {
            table: self.table.name.clone(),
            reason: "table description is unavailable".into(),
        })
    }
}
