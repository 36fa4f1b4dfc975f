//! Deterministic merge of concurrent batch snapshots.
//!
//! Every member of a batch starts from the same base snapshot and is only
//! allowed to mutate its own node, so merging copies exactly one node back
//! per member. The merge is the single point where concurrent results are
//! combined; nothing else ever reconciles two snapshots.

use crate::{
    LayerflowError,
    model::WorkflowModel,
    state::TaskBinding,
};

/// Outcome of one batch member, carried back to the merge point.
#[derive(Debug)]
pub struct BatchResult {
    pub binding: TaskBinding,
    /// Wall-clock seconds the member spent, including retries.
    pub elapsed: f64,
    pub outcome: crate::Result<WorkflowModel>,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub model: WorkflowModel,
    /// First failure in plan order, if any member failed.
    pub failure: Option<LayerflowError>,
}

/// Merge batch member snapshots back into the base snapshot.
///
/// For each successful member the member's node is copied wholesale into the
/// base and its timing recorded; failed members leave the base node
/// untouched. Because members touch disjoint nodes the result is independent
/// of completion order; the blamed failure is the first in plan order.
pub fn merge_batch(
    base: WorkflowModel,
    results: Vec<BatchResult>,
) -> MergeOutcome {
    let mut model = base;
    let mut failure: Option<LayerflowError> = None;

    for result in results {
        let node_id = &result.binding.node_id;
        match result.outcome {
            Ok(snapshot) => {
                if let Some(updated) = snapshot.nodes.iter().find(|n| &n.id == node_id) {
                    match model.nodes.iter_mut().find(|n| &n.id == node_id) {
                        Some(slot) => *slot = updated.clone(),
                        None => model.nodes.push(updated.clone()),
                    }
                }
                for (nid, secs) in snapshot.node_run_time {
                    model.node_run_time.insert(nid, secs);
                }
                model.node_run_time.insert(node_id.clone(), result.elapsed);
            }
            Err(err) => {
                model.node_run_time.insert(node_id.clone(), result.elapsed);
                if failure.is_none() {
                    model.error_task = result.binding.task_name.clone();
                    failure = Some(err);
                }
            }
        }
    }

    MergeOutcome {
        model,
        failure,
    }
}
