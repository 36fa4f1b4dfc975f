//! Workflow state: the in-flight view over one serialized workflow document.
//!
//! Exactly one state exists per in-flight execution pass. It owns the full
//! document, builds the DAG from the edge list, resolves inter-node field
//! values by following edges back to their source node, and produces the
//! layered execution plan the dispatcher walks.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::{
    Result,
    graph::{Dag, Layer},
    model::{AsyncTaskEntry, NodeId, TaskName, WorkflowModel},
    state::Node,
    utils,
};

/// Node types that are manual-start markers rather than value sources;
/// an edge from one of these never overrides the target's own value.
const NO_OP_SOURCE_TYPES: [&str; 2] = ["Empty", "ButtonTrigger"];

/// Categories excluded from the DAG when the node has no edges at all;
/// these are informational markers, not computational steps.
const EDGE_ONLY_CATEGORIES: [&str; 2] = ["triggers", "assistedNodes"];

/// Task names whose handlers suspend themselves via the retry protocol.
/// They are pulled out of concurrent batches and run as serial steps so a
/// self-suspending node never occupies a batch slot.
const ASYNC_TASK_NAMES: [&str; 2] = ["control_flows.workflow_invoke", "control_flows.workflow_loop"];

/// One task to dispatch: a node id bound to its handler name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBinding {
    pub node_id: NodeId,
    pub task_name: TaskName,
}

/// One step of the execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Run one task, threading the state snapshot through it.
    Serial(TaskBinding),
    /// Run all tasks concurrently against the same pre-batch snapshot.
    Batch(Vec<TaskBinding>),
}

/// Owns one workflow document for the duration of a scheduler pass.
pub struct WorkflowState {
    model: WorkflowModel,
    index: HashMap<NodeId, usize>,
}

impl WorkflowState {
    /// Build a state from a document, dropping nodes and edges marked
    /// `ignored`.
    pub fn new(mut model: WorkflowModel) -> Self {
        model.nodes.retain(|n| !n.ignored);
        model.edges.retain(|e| !e.ignored);

        let index = model.nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();

        Self {
            model,
            index,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.model.wid
    }

    pub fn record_id(&self) -> &str {
        &self.model.rid
    }

    pub fn model(&self) -> &WorkflowModel {
        &self.model
    }

    /// Give the document back, e.g. to hand it to the next plan step.
    pub fn into_model(self) -> WorkflowModel {
        self.model
    }

    pub fn get_node(
        &self,
        node_id: &str,
    ) -> Option<Node<'_>> {
        self.index.get(node_id).map(|i| Node::new(&self.model.nodes[*i]))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.model.nodes.iter().map(|n| n.id.as_str())
    }

    /// Resolve a field's value, following an inbound edge back to its
    /// source node when one exists.
    ///
    /// If an edge targets `(node_id, field)` and its source is not a no-op
    /// trigger type, the source node's output field wins over the node's own
    /// stored value, and the resolved value is written back into the node's
    /// field. The write-back makes repeated reads within a pass O(1) and
    /// keeps the final serialized state self-consistent without replaying
    /// edges. Dangling edges (source id absent from the node table) are
    /// skipped, not errored.
    pub fn get_node_field_value(
        &mut self,
        node_id: &str,
        field: &str,
    ) -> JsonValue {
        if !self.index.contains_key(node_id) {
            return JsonValue::Null;
        }

        let mut source: Option<(NodeId, String)> = None;
        for edge in &self.model.edges {
            let Some(source_node) = self.get_node(&edge.source) else {
                continue;
            };
            if NO_OP_SOURCE_TYPES.contains(&source_node.node_type()) {
                continue;
            }
            if edge.target == node_id && edge.target_handle == field {
                source = Some((edge.source.clone(), edge.source_handle.clone()));
                break;
            }
        }

        let Some((source_id, source_handle)) = source else {
            return self.own_field_value(node_id, field);
        };

        let input = self.own_field_value(&source_id, &source_handle);
        self.update_node_field_value(node_id, field, input.clone());
        input
    }

    fn own_field_value(
        &self,
        node_id: &str,
        field: &str,
    ) -> JsonValue {
        self.get_node(node_id).and_then(|n| n.get_field(field)).map(|f| f.value.clone()).unwrap_or(JsonValue::Null)
    }

    /// Direct field write, creating the field record when missing.
    pub fn update_node_field_value(
        &mut self,
        node_id: &str,
        field: &str,
        value: JsonValue,
    ) {
        if let Some(i) = self.index.get(node_id) {
            let record = self.model.nodes[*i].data.template.entry(field.to_string()).or_default();
            record.value = value;
        }
    }

    pub fn get_node_fields(
        &self,
        node_id: &str,
    ) -> Vec<String> {
        self.get_node(node_id).map(|n| n.fields().map(str::to_string).collect()).unwrap_or_default()
    }

    pub fn is_node_field_output(
        &self,
        node_id: &str,
        field: &str,
    ) -> bool {
        self.get_node(node_id).and_then(|n| n.get_field(field)).map(|f| f.is_output).unwrap_or(false)
    }

    pub fn set_node_status(
        &mut self,
        node_id: &str,
        status: u16,
    ) -> bool {
        match self.index.get(node_id) {
            Some(i) => {
                self.model.nodes[*i].data.status = status;
                true
            }
            None => false,
        }
    }

    /// Record a node's measured run time, both on the node itself and in
    /// the cumulative per-run map.
    pub fn set_node_run_time(
        &mut self,
        node_id: &str,
        seconds: f64,
    ) {
        if let Some(i) = self.index.get(node_id) {
            self.model.nodes[*i].data.run_time = seconds;
        }
        self.model.node_run_time.insert(node_id.to_string(), seconds);
    }

    /// Replace every unmeasured run-time sentinel with the fallback from
    /// the cumulative map, so every executed node persists a non-negative
    /// timing value.
    pub fn reconcile_run_times(&mut self) {
        for node in &mut self.model.nodes {
            if node.data.run_time < 0.0 {
                node.data.run_time = self.model.node_run_time.get(&node.id).copied().unwrap_or(0.0).max(0.0);
            }
        }
    }

    /// Drop the bookkeeping-only keys before final persistence.
    pub fn strip_bookkeeping(&mut self) {
        self.model.async_tasks.clear();
        self.model.related_workflows.clear();
        self.model.extra.remove("original_workflow_data");
        self.model.extra.remove("__node_id_map");
    }

    // --- async-task bookkeeping -------------------------------------------

    pub fn add_async_task(
        &mut self,
        node_id: &str,
        data: JsonValue,
        start_time: f64,
        expire_time: f64,
    ) {
        self.model.async_tasks.insert(node_id.to_string(), AsyncTaskEntry {
            data,
            start_time,
            expire_time,
        });
    }

    pub fn update_async_task(
        &mut self,
        node_id: &str,
        data: JsonValue,
    ) {
        if let Some(entry) = self.model.async_tasks.get_mut(node_id) {
            entry.data = data;
        }
    }

    pub fn get_async_task(
        &self,
        node_id: &str,
    ) -> Option<&AsyncTaskEntry> {
        self.model.async_tasks.get(node_id)
    }

    pub fn remove_async_task(
        &mut self,
        node_id: &str,
    ) {
        self.model.async_tasks.remove(node_id);
    }

    /// First async task past its expire time, if any.
    pub fn timed_out_async_task(&self) -> Option<NodeId> {
        let now = utils::time::time_secs();
        self.model.async_tasks.iter().find(|(_, entry)| now > entry.expire_time).map(|(nid, _)| nid.clone())
    }

    pub fn has_async_task_timeout(&self) -> bool {
        self.timed_out_async_task().is_some()
    }

    // --- planning ---------------------------------------------------------

    /// Build the DAG from the edge list. Edge endpoints are added as-is
    /// (dangling ids surface as phantom nodes that plan emission skips);
    /// nodes without any edge join the DAG unless they are edge-only
    /// category markers.
    fn build_dag(&self) -> Dag {
        let mut dag = Dag::new();
        for edge in &self.model.edges {
            dag.add_edge(&edge.source, &edge.target);
        }
        for node in &self.model.nodes {
            if !dag.contains(&node.id) && !EDGE_ONLY_CATEGORIES.contains(&node.category.as_str()) {
                dag.add_node(&node.id);
            }
        }
        dag
    }

    fn binding(
        &self,
        node_id: &str,
    ) -> Option<TaskBinding> {
        self.get_node(node_id).map(|node| TaskBinding {
            node_id: node_id.to_string(),
            task_name: node.task_name().to_string(),
        })
    }

    /// Flat execution plan in plain topological order.
    pub fn get_sorted_task_order(&self) -> Result<Vec<TaskBinding>> {
        let order = self.build_dag().topological_sort()?;
        Ok(order.iter().filter_map(|nid| self.binding(nid)).collect())
    }

    /// Layered execution plan.
    ///
    /// Within a layer, tasks whose handlers suspend via the retry protocol
    /// are pulled out of the concurrent batch and appended as serial steps.
    pub fn get_layer_sorted_task_order(&self) -> Result<Vec<PlanStep>> {
        let layers = self.build_dag().topological_sort_layered()?;

        let mut plan = Vec::new();
        for layer in layers {
            let ids = match layer {
                Layer::Single(id) => vec![id],
                Layer::Batch(ids) => ids,
            };

            let mut batchable = Vec::new();
            let mut suspending = Vec::new();
            for binding in ids.iter().filter_map(|nid| self.binding(nid)) {
                if ASYNC_TASK_NAMES.contains(&binding.task_name.as_str()) {
                    suspending.push(binding);
                } else {
                    batchable.push(binding);
                }
            }

            match batchable.len() {
                0 => {}
                1 => plan.push(PlanStep::Serial(batchable.into_iter().next().unwrap())),
                _ => plan.push(PlanStep::Batch(batchable)),
            }
            plan.extend(suspending.into_iter().map(PlanStep::Serial));
        }

        Ok(plan)
    }
}
