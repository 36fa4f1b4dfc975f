use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    LayerflowError, Result,
    model::{EdgeModel, NodeId, NodeModel},
};

/// Dotted `module.function` handler name.
pub type TaskName = String;

/// Bookkeeping for a node whose real work is another asynchronously-running
/// workflow (nested invoke, bounded loop). The entry persists the dependent
/// run's identifier and progress across repeated scheduler retries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsyncTaskEntry {
    pub data: JsonValue,
    pub start_time: f64,
    pub expire_time: f64,
}

/// The serialized workflow document the engine round-trips exactly.
///
/// The document is fully self-contained between scheduler hops: no
/// in-memory-only references survive a step boundary, which is what lets any
/// free worker pick up any plan step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowModel {
    /// Workflow id.
    #[serde(default)]
    pub wid: String,
    /// Run-record id this execution belongs to.
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
    /// Async-task bookkeeping per node, stripped before final persistence.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub async_tasks: HashMap<NodeId, AsyncTaskEntry>,
    /// Cumulative per-node run times, threaded through every scheduler hop.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub node_run_time: HashMap<NodeId, f64>,
    /// Task name recorded when the run fails.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_task: String,
    /// Sub-workflow documents referenced by nested-invoke nodes, stripped
    /// before final persistence.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub related_workflows: HashMap<String, WorkflowModel>,
    /// Unknown bookkeeping keys round-trip untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowModel>(s).map_err(|e| LayerflowError::Workflow(format!("{}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LayerflowError::Workflow(format!("{}", e)))
    }

    pub fn from_value(value: JsonValue) -> Result<Self> {
        serde_json::from_value::<WorkflowModel>(value).map_err(|e| LayerflowError::Workflow(format!("{}", e)))
    }

    pub fn to_value(&self) -> Result<JsonValue> {
        serde_json::to_value(self).map_err(|e| LayerflowError::Workflow(format!("{}", e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip_preserves_unknown_keys() {
        let text = r#"{
            "wid": "w1",
            "rid": "r1",
            "nodes": [
                {"id": "a", "type": "Text", "category": "outputs",
                 "data": {"task_name": "output.text", "template": {
                     "text": {"value": "hello", "show": true, "custom_flag": 1}
                 }}}
            ],
            "edges": [],
            "original_workflow_data": {"nodes": [], "edges": []}
        }"#;
        let model = WorkflowModel::from_json(text).unwrap();
        assert_eq!(model.wid, "w1");
        assert!(model.extra.contains_key("original_workflow_data"));

        let field = &model.nodes[0].data.template["text"];
        assert!(field.show);
        assert_eq!(field.extra["custom_flag"], 1);

        let round = WorkflowModel::from_json(&model.to_json().unwrap()).unwrap();
        assert!(round.extra.contains_key("original_workflow_data"));
        assert_eq!(round.nodes[0].data.run_time, crate::model::RUN_TIME_UNMEASURED);
    }
}
