//! # Supervisor
//!
//! Owns the `ProcessesTable`, accepts commands over the wire protocol,
//! and dispatches them to workers. Runs the health-check and warm-pool
//! background loops and the three-phase termination protocol on
//! shutdown.

pub mod health;
pub mod routing;
pub mod server;
pub mod table;
pub mod termination;
pub mod transport;
pub mod warm_pool;

use crate::config::{OrchestratorConfig, Tunables};
use crate::metrics::MetricsRegistry;
use crate::worker::spawn::spawn_worker;
use orchestrator_domain::protocol::{Command, Response};
use orchestrator_domain::value_objects::{PipelineId, RequestId};
use orchestrator_domain::OrchestratorError;
use std::sync::Arc;
use std::time::Instant;
use table::ProcessesTable;
use tokio_util::sync::CancellationToken;

pub struct Supervisor {
    table: Arc<ProcessesTable>,
    config: Arc<OrchestratorConfig>,
    tunables: Tunables,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(config: Arc<OrchestratorConfig>, metrics: Arc<MetricsRegistry>, shutdown: CancellationToken) -> Arc<Self> {
        let tunables = config.tunables.clone();
        Arc::new(Self { table: Arc::new(ProcessesTable::new()), config, tunables, metrics, shutdown })
    }

    /// Starts the health-check and warm-pool background loops. Returns
    /// their join handles so `main` can await them alongside the socket
    /// server.
    pub fn spawn_background_loops(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let health = tokio::spawn(health::run(self.table.clone(), self.tunables.clone(), self.metrics.clone(), self.shutdown.clone()));
        let warm_pool = tokio::spawn(warm_pool::run(
            self.table.clone(),
            self.config.clone(),
            self.tunables.clone(),
            self.metrics.clone(),
            self.shutdown.clone(),
        ));
        vec![health, warm_pool]
    }

    pub async fn shutdown(self: &Arc<Self>) {
        self.shutdown.cancel();
        termination::shutdown_all(self.table.clone(), &self.tunables).await;
    }

    pub fn pipeline_count(&self) -> usize {
        self.table.len()
    }

    /// Dispatches one command; mirrors the wire protocol's command enum.
    pub async fn handle_command(&self, request_id: RequestId, command: Command) -> Result<Response, OrchestratorError> {
        let started = Instant::now();
        let label = command_label(&command);
        let result = self.handle_command_inner(request_id, command).await;
        self.metrics.command_latency_seconds.with_label_values(&[label]).observe(started.elapsed().as_secs_f64());
        result
    }

    async fn handle_command_inner(&self, request_id: RequestId, command: Command) -> Result<Response, OrchestratorError> {
        match command {
            Command::ListPipelines => {
                let pipeline_ids = self.table.snapshot_ids();
                Ok(Response::List { pipeline_ids })
            }
            Command::Init { descriptor, .. } => self.handle_init(request_id, descriptor).await,
            other => {
                let pipeline_id = other
                    .pipeline_id()
                    .ok_or_else(|| OrchestratorError::invalid_payload("command requires a pipeline_id"))?;
                routing::route_command(&self.table, pipeline_id, request_id, other, self.tunables.queue_timeout()).await
            }
        }
    }

    async fn handle_init(
        &self,
        request_id: RequestId,
        descriptor: orchestrator_domain::protocol::PipelineDescriptor,
    ) -> Result<Response, OrchestratorError> {
        let pipeline_id = match self.table.take_idle() {
            Some(id) => id,
            None => {
                let row = spawn_worker(&self.config).await?;
                let id = row.record.pipeline_id;
                self.table.insert(row);
                self.table
                    .take_idle()
                    .filter(|bound| *bound == id)
                    .ok_or_else(|| OrchestratorError::internal_error("newly spawned worker vanished before bind"))?
            }
        };

        self.metrics.active_pipelines.set(self.table.len() as i64);

        let response = routing::route_command(
            &self.table,
            pipeline_id,
            request_id,
            Command::Init { pipeline_id: Some(pipeline_id), descriptor },
            self.tunables.queue_timeout(),
        )
        .await;

        match response {
            Ok(Response::Init { success: true, .. }) => Ok(Response::Init { pipeline_id, success: true }),
            Ok(other) => Ok(other),
            Err(e) => {
                self.table.remove(pipeline_id);
                Err(e)
            }
        }
    }

    pub async fn list_pipelines(&self) -> Vec<PipelineId> {
        self.table.snapshot_ids()
    }

    /// Registers a pre-built row directly, bypassing `spawn_worker` —
    /// the seam integration tests use to exercise routing/health-check
    /// behavior against a `FakeTransport` instead of a real child
    /// process.
    #[cfg(any(test, feature = "test-support"))]
    pub fn insert_fake_worker(&self, row: table::WorkerRow) {
        self.table.insert(row);
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Init { .. } => "INIT",
        Command::ListPipelines => "LIST_PIPELINES",
        Command::Status { .. } => "STATUS",
        Command::Mute { .. } => "MUTE",
        Command::Resume { .. } => "RESUME",
        Command::Terminate { .. } => "TERMINATE",
        Command::ConsumeResult { .. } => "CONSUME_RESULT",
        Command::Offer { .. } => "OFFER",
    }
}
