//! Control-flow handlers: pass-through, branching, and nested runs.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::{
    LayerflowError, Result,
    model::WorkflowModel,
    registry::{StepOutcome, TaskContext, TaskHandler},
    state::WorkflowState,
    store::data::{RunFrom, RunStatus},
    utils,
};

/// Pass-through node.
pub struct Empty;

#[async_trait]
impl TaskHandler for Empty {
    async fn run(
        &self,
        _ctx: &TaskContext,
        data: WorkflowModel,
        _node_id: &str,
    ) -> StepOutcome {
        StepOutcome::Done(WorkflowState::new(data).into_model())
    }
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn as_count(value: &JsonValue) -> u64 {
    match value {
        JsonValue::Number(n) => n.as_u64().unwrap_or(1),
        JsonValue::String(s) => s.trim().parse().unwrap_or(1),
        _ => 1,
    }
}

/// Evaluate a comparison the way the node's `field_type` asks for it.
/// Unknown operators compare false.
fn evaluate(
    operator: &str,
    field_type: &str,
    left: &JsonValue,
    right: &JsonValue,
) -> bool {
    if field_type == "number" {
        let l = as_number(left);
        let r = as_number(right);
        return match operator {
            "equal" => l == r,
            "not_equal" => l != r,
            "greater_than" => l > r,
            "less_than" => l < r,
            "greater_than_or_equal" => l >= r,
            "less_than_or_equal" => l <= r,
            _ => false,
        };
    }

    let l = as_text(left);
    let r = as_text(right);
    match operator {
        "equal" => l == r,
        "not_equal" => l != r,
        "greater_than" => l > r,
        "less_than" => l < r,
        "greater_than_or_equal" => l >= r,
        "less_than_or_equal" => l <= r,
        "include" => l.contains(&r),
        "not_include" => !l.contains(&r),
        "is_empty" => l.is_empty(),
        "is_not_empty" => !l.is_empty(),
        "starts_with" => l.starts_with(&r),
        "ends_with" => l.ends_with(&r),
        _ => false,
    }
}

/// Two-way branch: compares `left_field` against `right_field` and writes
/// `true_output` or `false_output` into `output`.
pub struct Conditional;

#[async_trait]
impl TaskHandler for Conditional {
    async fn run(
        &self,
        _ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let mut state = WorkflowState::new(data);
        let field_type = state.get_node_field_value(node_id, "field_type");
        let operator = state.get_node_field_value(node_id, "operator");
        let left = state.get_node_field_value(node_id, "left_field");
        let right = state.get_node_field_value(node_id, "right_field");
        let true_output = state.get_node_field_value(node_id, "true_output");
        let false_output = state.get_node_field_value(node_id, "false_output");

        let satisfied = evaluate(as_text(&operator).as_str(), as_text(&field_type).as_str(), &left, &right);
        state.update_node_field_value(node_id, "output", if satisfied { true_output } else { false_output });
        StepOutcome::Done(state.into_model())
    }
}

/// Resolve the invoke node's mapped inputs into the sub-workflow document,
/// then persist and enqueue it as a nested run.
fn start_nested_run(
    ctx: &TaskContext,
    state: &mut WorkflowState,
    node_id: &str,
) -> Result<String> {
    let workflow_id = as_text(&state.get_node_field_value(node_id, "workflow_id"));
    let mut sub = state
        .model()
        .related_workflows
        .get(&workflow_id)
        .cloned()
        .ok_or_else(|| LayerflowError::Workflow(format!("related workflow {workflow_id} not found")))?;

    for key in state.get_node_fields(node_id) {
        let Some(field) = state.get_node(node_id).and_then(|n| n.get_field(&key)).cloned() else {
            continue;
        };
        if field.is_output {
            continue;
        }
        let (Some(target), Some(sub_field)) = (field.node, field.field_key) else {
            continue;
        };
        let value = state.get_node_field_value(node_id, &key);
        if let Some(node) = sub.nodes.iter_mut().find(|n| n.id == target) {
            node.data.template.entry(sub_field).or_default().value = value;
        }
    }

    let record_id = ctx.enqueue_workflow(sub, RunFrom::Workflow, None)?;
    debug!("node {node_id} started nested run {record_id} of workflow {workflow_id}");
    Ok(record_id)
}

/// Copy the nested run's mapped output fields back onto the invoke node.
fn copy_nested_outputs(
    state: &mut WorkflowState,
    node_id: &str,
    sub: &WorkflowModel,
) {
    for key in state.get_node_fields(node_id) {
        let Some(field) = state.get_node(node_id).and_then(|n| n.get_field(&key)).cloned() else {
            continue;
        };
        if !field.is_output {
            continue;
        }
        let (Some(source), Some(source_field)) = (field.node, field.output_field_key) else {
            continue;
        };
        if let Some(value) = sub.nodes.iter().find(|n| n.id == source).and_then(|n| n.data.template.get(&source_field)).map(|f| f.value.clone()) {
            state.update_node_field_value(node_id, &key, value);
        }
    }
}

fn suspend(state: WorkflowState) -> StepOutcome {
    StepOutcome::Retry {
        data: state.into_model(),
        delay: Duration::ZERO,
    }
}

/// Runs another workflow as a node.
///
/// First visit: resolve inputs into the sub-workflow from
/// `related_workflows`, enqueue it as a nested run, stash the record id in
/// the async bookkeeping, and suspend. Later visits poll the nested record:
/// still pending suspends again with the entry unchanged, so one node never
/// creates a second nested record; a finished run copies the mapped outputs
/// back and completes; a failed run fails this node.
pub struct WorkflowInvoke;

#[async_trait]
impl TaskHandler for WorkflowInvoke {
    async fn run(
        &self,
        ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let mut state = WorkflowState::new(data);

        let Some(entry) = state.get_async_task(node_id).cloned() else {
            match start_nested_run(ctx, &mut state, node_id) {
                Ok(record_id) => {
                    let now = utils::time::time_secs();
                    state.add_async_task(node_id, json!({"record_id": record_id}), now, now + ctx.config.async_task_expire_secs as f64);
                    return suspend(state);
                }
                Err(err) => return StepOutcome::Failed(err.to_string()),
            }
        };

        let record_id = entry.data["record_id"].as_str().unwrap_or_default().to_string();
        let record = match ctx.store.run_records().find(&record_id) {
            Ok(record) => record,
            Err(err) => return StepOutcome::Failed(err.to_string()),
        };

        match record.status {
            RunStatus::Queued | RunStatus::Running => suspend(state),
            RunStatus::Finished => {
                let sub = match WorkflowModel::from_value(record.data) {
                    Ok(sub) => sub,
                    Err(err) => return StepOutcome::Failed(err.to_string()),
                };
                copy_nested_outputs(&mut state, node_id, &sub);
                state.remove_async_task(node_id);
                StepOutcome::Done(state.into_model())
            }
            RunStatus::Failed => StepOutcome::Failed(format!("nested run {record_id} failed in {}", record.error_task)),
        }
    }
}

/// Re-invokes a sub-workflow up to `max_loop_count` times, copying the
/// mapped outputs back after every iteration. Uses the same polling
/// protocol as [`WorkflowInvoke`].
pub struct WorkflowLoop;

#[async_trait]
impl TaskHandler for WorkflowLoop {
    async fn run(
        &self,
        ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let mut state = WorkflowState::new(data);

        let Some(entry) = state.get_async_task(node_id).cloned() else {
            match start_nested_run(ctx, &mut state, node_id) {
                Ok(record_id) => {
                    let now = utils::time::time_secs();
                    state.add_async_task(node_id, json!({"record_id": record_id, "loop_count": 1}), now, now + ctx.config.async_task_expire_secs as f64);
                    return suspend(state);
                }
                Err(err) => return StepOutcome::Failed(err.to_string()),
            }
        };

        let record_id = entry.data["record_id"].as_str().unwrap_or_default().to_string();
        let loop_count = as_count(&entry.data["loop_count"]);
        let record = match ctx.store.run_records().find(&record_id) {
            Ok(record) => record,
            Err(err) => return StepOutcome::Failed(err.to_string()),
        };

        match record.status {
            RunStatus::Queued | RunStatus::Running => suspend(state),
            RunStatus::Failed => StepOutcome::Failed(format!("nested run {record_id} failed in {}", record.error_task)),
            RunStatus::Finished => {
                let sub = match WorkflowModel::from_value(record.data) {
                    Ok(sub) => sub,
                    Err(err) => return StepOutcome::Failed(err.to_string()),
                };
                copy_nested_outputs(&mut state, node_id, &sub);

                let max_loop_count = as_count(&state.get_node_field_value(node_id, "max_loop_count"));
                if loop_count >= max_loop_count {
                    state.remove_async_task(node_id);
                    return StepOutcome::Done(state.into_model());
                }

                match start_nested_run(ctx, &mut state, node_id) {
                    Ok(next_record_id) => {
                        let now = utils::time::time_secs();
                        state.remove_async_task(node_id);
                        state.add_async_task(
                            node_id,
                            json!({"record_id": next_record_id, "loop_count": loop_count + 1}),
                            now,
                            now + ctx.config.async_task_expire_secs as f64,
                        );
                        suspend(state)
                    }
                    Err(err) => StepOutcome::Failed(err.to_string()),
                }
            }
        }
    }
}
