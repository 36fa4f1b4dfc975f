use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// Directed dependency from one node's output field to another node's
/// input field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeModel {
    pub source: NodeId,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    pub target: NodeId,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,
}

impl EdgeModel {
    pub fn new(
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
            ignored: false,
        }
    }
}
