//! Run dispatcher: walks the layered plan and drives task handlers.
//!
//! One dispatcher invocation owns one run from dequeue to terminal report.
//! The plan is a sequence of serial steps and concurrent batches; the
//! snapshot is threaded through serial steps, while batch members each get a
//! clone of the pre-batch snapshot and are merged back at the batch boundary.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    LayerflowError,
    dispatcher::merge::{BatchResult, MergeOutcome, merge_batch},
    model::{NODE_FINISHED, WorkflowModel},
    registry::{RunJob, StepOutcome, TaskContext, TaskRegistry},
    reporter::RunReporter,
    state::{PlanStep, ProgressTracker, TaskBinding, WorkflowState},
    store::data::RunStatus,
    utils,
};

type ExecResult = std::result::Result<WorkflowModel, (WorkflowModel, LayerflowError)>;

pub struct Dispatcher {
    ctx: TaskContext,
    registry: Arc<TaskRegistry>,
    reporter: RunReporter,
    progress: ProgressTracker,
}

impl Dispatcher {
    pub fn new(
        ctx: TaskContext,
        registry: Arc<TaskRegistry>,
        reporter: RunReporter,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            ctx,
            registry,
            reporter,
            progress,
        }
    }

    /// Drive one run to a terminal state. Never returns an error; every
    /// failure path ends in a `Failed` report on the run record.
    pub async fn run(
        &self,
        job: RunJob,
    ) {
        info!("run {} started", job.record_id);
        match self.execute(job.model).await {
            Ok(model) => self.on_finish(model),
            Err((model, err)) => self.on_error(model, err),
        }
    }

    async fn execute(
        &self,
        model: WorkflowModel,
    ) -> ExecResult {
        let plan = match WorkflowState::new(model.clone()).get_layer_sorted_task_order() {
            Ok(plan) => plan,
            Err(err) => return Err((model, err)),
        };

        let mut current = model;
        for step in plan {
            match step {
                PlanStep::Serial(binding) => {
                    let result = Self::drive_node_supervised(self.ctx.clone(), self.registry.clone(), binding.clone(), current.clone()).await;
                    match result.outcome {
                        Ok(updated) => {
                            let mut state = WorkflowState::new(updated);
                            state.set_node_run_time(&binding.node_id, result.elapsed);
                            self.progress.report_node_status(state.record_id(), &binding.node_id, NODE_FINISHED);
                            current = state.into_model();
                        }
                        Err(err) => {
                            current.error_task = binding.task_name.clone();
                            return Err((current, err));
                        }
                    }
                }
                PlanStep::Batch(bindings) => {
                    let merged = self.run_batch(bindings, current).await;
                    current = merged.model;
                    if let Some(err) = merged.failure {
                        return Err((current, err));
                    }
                }
            }
        }

        Ok(current)
    }

    /// Run one batch layer: every member gets a clone of the pre-batch
    /// snapshot, runs concurrently, and reports back over a channel. All
    /// members are awaited before merging, so a failed batch still keeps
    /// the outputs its successful siblings produced.
    async fn run_batch(
        &self,
        bindings: Vec<TaskBinding>,
        base: WorkflowModel,
    ) -> MergeOutcome {
        let (tx, mut rx) = mpsc::channel::<(usize, BatchResult)>(bindings.len());

        for (i, binding) in bindings.iter().enumerate() {
            let ctx = self.ctx.clone();
            let registry = self.registry.clone();
            let binding = binding.clone();
            let snapshot = base.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = Self::drive_node_supervised(ctx, registry, binding, snapshot).await;
                let _ = tx.send((i, result)).await;
            });
        }
        drop(tx);

        // Collect in plan order regardless of completion order.
        let mut slots: Vec<Option<BatchResult>> = bindings.iter().map(|_| None).collect();
        while let Some((i, result)) = rx.recv().await {
            slots[i] = Some(result);
        }

        // A member that vanished without reporting counts as a failure, not
        // as a silently absent result.
        let results: Vec<BatchResult> = bindings
            .iter()
            .zip(slots)
            .map(|(binding, slot)| {
                slot.unwrap_or_else(|| BatchResult {
                    binding: binding.clone(),
                    elapsed: 0.0,
                    outcome: Err(LayerflowError::Task {
                        task_name: binding.task_name.clone(),
                        message: "handler task dropped without reporting".to_string(),
                    }),
                })
            })
            .collect();

        for result in &results {
            if result.outcome.is_ok() {
                self.progress.report_node_status(&base.rid, &result.binding.node_id, NODE_FINISHED);
            }
        }

        merge_batch(base, results)
    }

    /// Drive one node on its own task so a panicking handler surfaces as a
    /// task failure instead of unwinding the dispatcher. Without this a
    /// serial-step panic would leave the run record `Running` forever and a
    /// batch-member panic would go missing from the merge.
    async fn drive_node_supervised(
        ctx: TaskContext,
        registry: Arc<TaskRegistry>,
        binding: TaskBinding,
        model: WorkflowModel,
    ) -> BatchResult {
        let handle = tokio::spawn(Self::drive_node(ctx, registry, binding.clone(), model));
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                let message = if err.is_panic() {
                    format!("handler panicked: {err}")
                } else {
                    "handler task aborted before completing".to_string()
                };
                BatchResult {
                    binding: binding.clone(),
                    elapsed: 0.0,
                    outcome: Err(LayerflowError::Task {
                        task_name: binding.task_name,
                        message,
                    }),
                }
            }
        }
    }

    /// Execute one node to completion, honoring the suspension protocol.
    ///
    /// A `Retry` outcome replaces the snapshot and re-invokes the handler
    /// after the requested delay, up to the configured retry budget. The
    /// async bookkeeping on the snapshot is checked on each hop so a pending
    /// sub-workflow past its expire time fails the node instead of burning
    /// the whole budget.
    async fn drive_node(
        ctx: TaskContext,
        registry: Arc<TaskRegistry>,
        binding: TaskBinding,
        model: WorkflowModel,
    ) -> BatchResult {
        let started = utils::time::time_secs();
        let outcome = Self::drive_node_inner(&ctx, &registry, &binding, model).await;
        BatchResult {
            binding,
            elapsed: (utils::time::time_secs() - started).max(0.0),
            outcome,
        }
    }

    async fn drive_node_inner(
        ctx: &TaskContext,
        registry: &TaskRegistry,
        binding: &TaskBinding,
        model: WorkflowModel,
    ) -> crate::Result<WorkflowModel> {
        let handler = registry.lookup(&binding.task_name)?;

        let mut snapshot = model;
        let mut attempts: u32 = 0;
        loop {
            match handler.run(ctx, snapshot, &binding.node_id).await {
                StepOutcome::Done(updated) => {
                    let mut state = WorkflowState::new(updated);
                    state.set_node_status(&binding.node_id, NODE_FINISHED);
                    return Ok(state.into_model());
                }
                StepOutcome::Retry {
                    data,
                    delay,
                } => {
                    attempts += 1;
                    if attempts > ctx.config.retry.max_task_retries {
                        return Err(LayerflowError::Task {
                            task_name: binding.task_name.clone(),
                            message: format!("still pending after {attempts} attempts"),
                        });
                    }

                    let now = utils::time::time_secs();
                    if let Some((nid, _)) = data.async_tasks.iter().find(|(_, entry)| now > entry.expire_time) {
                        return Err(LayerflowError::AsyncTaskTimeout(nid.clone()));
                    }

                    // Persist the pending snapshot so the polling surface
                    // sees the async bookkeeping while the node suspends.
                    if !data.rid.is_empty() {
                        let records = ctx.store.run_records();
                        if let Ok(mut record) = records.find(&data.rid) {
                            if let Ok(value) = data.to_value() {
                                record.data = value;
                                let _ = records.update(&record);
                            }
                        }
                    }

                    let wait = if delay.is_zero() {
                        Duration::from_millis(ctx.config.retry.retry_interval_ms)
                    } else {
                        delay
                    };
                    tokio::time::sleep(wait).await;
                    snapshot = data;
                }
                StepOutcome::Failed(message) => {
                    return Err(LayerflowError::Task {
                        task_name: binding.task_name.clone(),
                        message,
                    });
                }
            }
        }
    }

    fn on_finish(
        &self,
        model: WorkflowModel,
    ) {
        let mut state = WorkflowState::new(model);
        state.reconcile_run_times();
        state.strip_bookkeeping();
        match self.reporter.report(&state, RunStatus::Finished, None) {
            Ok(_) => info!("run {} finished", state.record_id()),
            Err(err) => error!("failed to report finished run {}: {err}", state.record_id()),
        }
    }

    fn on_error(
        &self,
        model: WorkflowModel,
        err: LayerflowError,
    ) {
        let error_task = err.error_task();
        let mut state = WorkflowState::new(model);
        state.reconcile_run_times();
        state.strip_bookkeeping();
        warn!("run {} failed in {error_task}: {err}", state.record_id());
        if let Err(report_err) = self.reporter.report(&state, RunStatus::Failed, Some(error_task)) {
            error!("failed to report failed run {}: {report_err}", state.record_id());
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::Value as JsonValue;

    use super::*;
    use crate::{
        common::{MemCache, Queue},
        config::Config,
        registry::TaskHandler,
        state::TaskBinding,
        store::{DbStore, MemStore, Store},
    };

    fn ctx() -> TaskContext {
        let store = Store::new();
        MemStore::new().init(&store);
        let mut config = Config::default();
        config.retry.max_task_retries = 3;
        config.retry.retry_interval_ms = 1;
        TaskContext {
            store: Arc::new(store),
            run_queue: Queue::new(16),
            cache: Arc::new(MemCache::<String, JsonValue>::new(64)),
            config: Arc::new(config),
        }
    }

    struct PendingThenDone {
        remaining: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for PendingThenDone {
        async fn run(
            &self,
            _ctx: &TaskContext,
            data: WorkflowModel,
            _node_id: &str,
        ) -> StepOutcome {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 1 {
                StepOutcome::Retry {
                    data,
                    delay: Duration::from_millis(1),
                }
            } else {
                StepOutcome::Done(data)
            }
        }
    }

    fn binding() -> TaskBinding {
        TaskBinding {
            node_id: "A".to_string(),
            task_name: "stub.pending".to_string(),
        }
    }

    fn model() -> WorkflowModel {
        WorkflowModel {
            wid: "w1".to_string(),
            rid: "r1".to_string(),
            nodes: vec![crate::model::NodeModel::new("A", "Stub", "processing", "stub.pending")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_drive_node_retries_until_done() {
        let mut registry = TaskRegistry::new();
        registry.register("stub.pending", Arc::new(PendingThenDone {
            remaining: AtomicU32::new(3),
        }));

        let result = Dispatcher::drive_node(ctx(), Arc::new(registry), binding(), model()).await;
        let updated = result.outcome.unwrap();
        assert_eq!(updated.nodes[0].data.status, NODE_FINISHED);
    }

    #[tokio::test]
    async fn test_drive_node_exhausts_retry_budget() {
        let mut registry = TaskRegistry::new();
        registry.register("stub.pending", Arc::new(PendingThenDone {
            remaining: AtomicU32::new(u32::MAX),
        }));

        let result = Dispatcher::drive_node(ctx(), Arc::new(registry), binding(), model()).await;
        match result.outcome {
            Err(LayerflowError::Task {
                task_name, ..
            }) => assert_eq!(task_name, "stub.pending"),
            other => panic!("expected retry exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_task_failure() {
        struct Panics;

        #[async_trait]
        impl TaskHandler for Panics {
            async fn run(
                &self,
                _ctx: &TaskContext,
                _data: WorkflowModel,
                _node_id: &str,
            ) -> StepOutcome {
                panic!("handler crashed");
            }
        }

        let mut registry = TaskRegistry::new();
        registry.register("stub.pending", Arc::new(Panics));

        let result = Dispatcher::drive_node_supervised(ctx(), Arc::new(registry), binding(), model()).await;
        match result.outcome {
            Err(LayerflowError::Task {
                task_name,
                message,
            }) => {
                assert_eq!(task_name, "stub.pending");
                assert!(message.contains("panicked"), "unexpected message: {message}");
            }
            other => panic!("expected task failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drive_node_times_out_expired_async_task() {
        struct AlwaysPending;

        #[async_trait]
        impl TaskHandler for AlwaysPending {
            async fn run(
                &self,
                _ctx: &TaskContext,
                mut data: WorkflowModel,
                node_id: &str,
            ) -> StepOutcome {
                data.async_tasks.insert(node_id.to_string(), crate::model::AsyncTaskEntry {
                    data: JsonValue::Null,
                    start_time: 0.0,
                    expire_time: 1.0,
                });
                StepOutcome::Retry {
                    data,
                    delay: Duration::from_millis(1),
                }
            }
        }

        let mut registry = TaskRegistry::new();
        registry.register("stub.pending", Arc::new(AlwaysPending));

        let result = Dispatcher::drive_node(ctx(), Arc::new(registry), binding(), model()).await;
        assert!(matches!(result.outcome, Err(LayerflowError::AsyncTaskTimeout(nid)) if nid == "A"));
    }
}
