//! Workflow engine - the main entry point for Layerflow.
//!
//! The engine manages the lifecycle of workflow runs, including:
//! - Validating and enqueueing run requests
//! - Draining the run queue onto dispatcher tasks
//! - Exposing the polling surface for run status and outputs
//! - Graceful shutdown coordination

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::Value as JsonValue;
use tokio::runtime::Runtime;
use tracing::{error, warn};

use crate::{
    LayerflowError, Result,
    common::{MemCache, Queue, Shutdown},
    config::{Config, StoreType},
    dispatcher::Dispatcher,
    model::{NodeId, WorkflowModel},
    registry::{RunJob, TaskContext, TaskRegistry},
    reporter::{self, OutputContent, RunReporter},
    state::{ProgressTracker, WorkflowState},
    store::{
        DbStore, MemStore, Store,
        data::{RunFrom, RunStatus},
    },
};

/// Size of the run-dispatch queue.
const RUN_QUEUE_SIZE: usize = 1024;

/// How a run should be started.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub run_from: RunFrom,
    /// Chat message waiting on this run, delivered the assembled result.
    pub source_message_id: Option<String>,
}

/// Snapshot of a run for polling clients.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: RunStatus,
    /// Task blamed for a failed run, empty otherwise.
    pub error_task: String,
    /// Nodes reported finished so far, in completion order.
    pub finished_nodes: Vec<NodeId>,
    /// Nodes currently marked as streaming partial output.
    pub streaming_nodes: Vec<NodeId>,
    /// Renderable outputs, populated once the run finished.
    pub outputs: Vec<OutputContent>,
}

/// The main workflow engine.
///
/// Engine is the central coordinator for Layerflow, responsible for:
/// - Managing the tokio runtime for async execution
/// - Owning the store, task registry, and progress cache
/// - Turning queued run records into dispatcher executions
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// let record_id = engine.run(workflow_model)?;
/// let report = engine.check_status(&record_id)?;
///
/// engine.shutdown();
/// ```
pub struct Engine {
    config: Arc<Config>,
    store: Arc<Store>,
    registry: Arc<TaskRegistry>,
    /// Shared services handed to every handler invocation.
    ctx: TaskContext,
    /// Queue of runs waiting for a worker.
    run_queue: Arc<Queue<RunJob>>,
    progress: ProgressTracker,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Arc<Runtime>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    /// Creates a new engine from a configuration, a task registry, and the
    /// runtime to execute on.
    pub fn new_with_config(
        config: Config,
        registry: TaskRegistry,
        runtime: Arc<Runtime>,
    ) -> Self {
        let store = Store::new();
        match config.store.store_type {
            StoreType::Mem => MemStore::new().init(&store),
        }
        let store = Arc::new(store);

        let cache: Arc<MemCache<String, JsonValue>> = Arc::new(MemCache::new(config.cache.capacity as usize));
        let progress = ProgressTracker::new(
            cache.clone(),
            Duration::from_secs(config.cache.finished_ttl_secs),
            Duration::from_secs(config.cache.stream_ttl_secs),
        );

        let run_queue = Queue::new(RUN_QUEUE_SIZE);
        let config = Arc::new(config);
        let ctx = TaskContext {
            store: store.clone(),
            run_queue: run_queue.clone(),
            cache,
            config: config.clone(),
        };

        Self {
            config,
            store,
            registry: Arc::new(registry),
            ctx,
            run_queue,
            progress,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the worker loop draining the run queue.
    ///
    /// Each dequeued job marks its record `Running` and is dispatched on its
    /// own task, so one slow run never blocks the queue.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        let ctx = self.ctx.clone();
        let registry = self.registry.clone();
        let progress = self.progress.clone();
        let store = self.store.clone();
        let run_queue = self.run_queue.clone();
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,

                    job_opt = run_queue.next_async() => {
                        let Some(job) = job_opt else { break };

                        let ctx = ctx.clone();
                        let registry = registry.clone();
                        let progress = progress.clone();
                        let store = store.clone();

                        tokio::spawn(async move {
                            if let Err(err) = Self::mark_running(&store, &job.record_id) {
                                error!("cannot mark run {} as running: {err}", job.record_id);
                                return;
                            }
                            let dispatcher = Dispatcher::new(ctx, registry, RunReporter::new(store), progress);
                            dispatcher.run(job).await;
                        });
                    }
                }
            }
        });
    }

    fn mark_running(
        store: &Arc<Store>,
        record_id: &str,
    ) -> Result<()> {
        let records = store.run_records();
        let mut record = records.find(record_id)?;
        if record.status != RunStatus::Queued {
            return Err(LayerflowError::Engine(format!("run {record_id} is {}, expected QUEUED", record.status.as_ref())));
        }
        record.status = RunStatus::Running;
        records.update(&record)?;
        Ok(())
    }

    /// Validate, persist, and enqueue a workflow run started from the web
    /// surface. Returns the run-record id.
    pub fn run(
        &self,
        model: WorkflowModel,
    ) -> Result<String> {
        self.run_with(model, RunOptions::default())
    }

    /// Like [`Engine::run`] with an explicit origin.
    pub fn run_with(
        &self,
        model: WorkflowModel,
        options: RunOptions,
    ) -> Result<String> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(LayerflowError::Engine("engine is not running".to_string()));
        }
        self.ctx.enqueue_workflow(model, options.run_from, options.source_message_id)
    }

    /// Persists a workflow definition to the store so it can later be
    /// started by id with [`Engine::run_deployed`].
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        self.store.deploy(workflow)
    }

    /// Starts a run of a previously deployed workflow.
    pub fn run_deployed(
        &self,
        wid: &str,
        options: RunOptions,
    ) -> Result<String> {
        let stored = self.store.workflows().find(wid)?;
        let model = WorkflowModel::from_json(&stored.data)?;
        self.run_with(model, options)
    }

    /// The polling surface: current status, finished nodes, and (for a
    /// finished run) the renderable outputs.
    pub fn check_status(
        &self,
        record_id: &str,
    ) -> Result<StatusReport> {
        let record = self.store.run_records().find(record_id)?;
        let state = WorkflowState::new(WorkflowModel::from_value(record.data)?);

        let streaming_nodes = state.node_ids().filter(|nid| self.progress.is_node_streaming(record_id, nid)).map(str::to_string).collect();
        let outputs = if record.status == RunStatus::Finished {
            reporter::collect_outputs(&state)
        } else {
            Vec::new()
        };

        Ok(StatusReport {
            status: record.status,
            error_task: record.error_task,
            finished_nodes: self.progress.finished_nodes(record_id),
            streaming_nodes,
            outputs,
        })
    }

    /// Drain the streaming buffer of one node, e.g. token chunks a handler
    /// pushed while it was still running.
    pub fn pull_node_stream(
        &self,
        record_id: &str,
        node_id: &str,
    ) -> Vec<JsonValue> {
        self.progress.pull_node_data(record_id, node_id)
    }

    /// Drop a run's transient progress keys once clients stop polling it.
    pub fn clear_progress(
        &self,
        record_id: &str,
    ) -> Result<()> {
        let record = self.store.run_records().find(record_id)?;
        let state = WorkflowState::new(WorkflowModel::from_value(record.data)?);
        self.progress.clear(record_id, state.node_ids());
        Ok(())
    }

    /// Caller-driven health check: force-fail a non-terminal run whose
    /// async bookkeeping holds an entry past its expire time. Returns
    /// whether the run was failed.
    pub fn fail_timed_out(
        &self,
        record_id: &str,
    ) -> Result<bool> {
        let record = self.store.run_records().find(record_id)?;
        if record.is_terminal() {
            return Ok(false);
        }

        let mut state = WorkflowState::new(WorkflowModel::from_value(record.data)?);
        let Some(node_id) = state.timed_out_async_task() else {
            return Ok(false);
        };

        warn!("run {record_id} force-failed, async task for node {node_id} expired");
        state.reconcile_run_times();
        state.strip_bookkeeping();
        RunReporter::new(self.store.clone()).report(&state, RunStatus::Failed, Some("async.timeout".to_string()))?;
        Ok(true)
    }

    /// Gracefully shuts down the engine. Queued jobs not yet picked up stay
    /// `Queued` in the store.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        self.shutdown.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }
}
