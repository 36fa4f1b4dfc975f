//! Task handler registry and execution protocol.
//!
//! Every node names a task as `module.function` (for example
//! `control_flows.conditional`). The dispatcher looks the name up here and
//! drives the handler through the [`StepOutcome`] protocol: a handler either
//! completes its node, asks to be re-polled later, or fails. Suspension is
//! data, not control flow, so a worker thread is never parked on a pending
//! sub-workflow.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    LayerflowError, Result,
    common::{MemCache, Queue},
    config::Config,
    model::{TaskName, WorkflowModel},
    state::WorkflowState,
    store::{
        Store,
        data::{RunFrom, RunRecord, RunStatus},
    },
    utils,
};

/// Result of one handler invocation on one node.
#[derive(Debug)]
pub enum StepOutcome {
    /// The node completed; the snapshot carries its outputs.
    Done(WorkflowModel),
    /// The node is waiting on external progress. The dispatcher re-invokes
    /// the handler with `data` after `delay`, up to the configured retry
    /// budget.
    Retry {
        data: WorkflowModel,
        delay: Duration,
    },
    /// The node failed; the message becomes the run's failure report.
    Failed(String),
}

/// A unit of executable node logic.
///
/// Handlers receive the full workflow snapshot and the id of the node to
/// execute, and return the updated snapshot. They must not assume they run
/// on any particular thread.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(
        &self,
        ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome;
}

/// Shared services a handler may use: persistence, the run-dispatch queue
/// for spawning nested runs, the progress cache, and configuration.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<Store>,
    pub run_queue: Arc<Queue<RunJob>>,
    pub cache: Arc<MemCache<String, JsonValue>>,
    pub config: Arc<Config>,
}

/// One queued execution: the record to drive plus its graph snapshot.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub record_id: String,
    pub model: WorkflowModel,
}

impl TaskContext {
    /// Validate, persist, and enqueue a workflow run.
    ///
    /// The plan is computed eagerly so a cyclic graph is rejected before any
    /// record exists. On success exactly one `Queued` record is created and
    /// one job enqueued.
    pub fn enqueue_workflow(
        &self,
        mut model: WorkflowModel,
        run_from: RunFrom,
        source_message_id: Option<String>,
    ) -> Result<String> {
        WorkflowState::new(model.clone()).get_layer_sorted_task_order()?;

        let record_id = utils::longid();
        model.rid = record_id.clone();

        let record = RunRecord {
            rid: record_id.clone(),
            wid: model.wid.clone(),
            status: RunStatus::Queued,
            data: model.to_value()?,
            run_from,
            source_message_id,
            start_time: utils::time::time_millis(),
            end_time: 0,
            error_task: String::new(),
        };
        self.store.run_records().create(&record)?;

        self.run_queue.send(RunJob {
            record_id: record_id.clone(),
            model,
        })?;
        debug!("enqueued run {record_id} of workflow {}", record.wid);

        Ok(record_id)
    }
}

/// Maps task names to handlers.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a `module.function` name. Re-registering a
    /// name replaces the previous handler.
    pub fn register(
        &mut self,
        name: &str,
        handler: Arc<dyn TaskHandler>,
    ) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn lookup(
        &self,
        name: &str,
    ) -> Result<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned().ok_or_else(|| LayerflowError::Task {
            task_name: name.to_string(),
            message: "no handler registered".to_string(),
        })
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<TaskName> {
        self.handlers.keys().cloned().collect()
    }
}
