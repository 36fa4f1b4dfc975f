use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::model::FieldRecord;

/// Stable node identifier, unique within one workflow graph.
pub type NodeId = String;

/// HTTP-style per-node progress marker: node finished.
pub const NODE_FINISHED: u16 = 200;
/// HTTP-style per-node progress marker: node in progress / streaming.
pub const NODE_STREAMING: u16 = 202;

/// Sentinel run time for nodes that have not been measured yet.
pub const RUN_TIME_UNMEASURED: f64 = -1.0;

fn default_run_time() -> f64 {
    RUN_TIME_UNMEASURED
}

/// One entry of the serialized node list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: NodeId,
    /// Node-type tag, e.g. "WorkflowInvoke".
    #[serde(rename = "type")]
    pub node_type: String,
    /// Category, e.g. "triggers", "outputs", "assistedNodes". Categorized
    /// nodes without edges are excluded from scheduling.
    #[serde(default)]
    pub category: String,
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// The payload of a node: its task binding, field template and progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Dotted `module.function` naming the external task handler.
    #[serde(default)]
    pub task_name: String,
    /// Field templates, insertion-ordered so plans and output assembly
    /// stay deterministic.
    #[serde(default)]
    pub template: IndexMap<String, FieldRecord>,
    /// HTTP-style execution status marker (200 finished, 202 streaming).
    #[serde(default)]
    pub status: u16,
    /// Measured run time in seconds, -1 until measured.
    #[serde(default = "default_run_time")]
    pub run_time: f64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl NodeModel {
    pub fn new(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        category: impl Into<String>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            category: category.into(),
            data: NodeData {
                task_name: task_name.into(),
                run_time: RUN_TIME_UNMEASURED,
                ..Default::default()
            },
            ignored: false,
            extra: Map::new(),
        }
    }

    /// Builder-style field insertion, used by tests and workflow assembly.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        record: FieldRecord,
    ) -> Self {
        self.data.template.insert(name.into(), record);
        self
    }
}
