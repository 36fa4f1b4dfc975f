use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::model::NodeId;

/// One field of a node's template.
///
/// `node` plus `output_field_key`/`field_key` encode "this field's value is
/// actually sourced from another node's field" - used both for plain edges
/// and for the nested-workflow-invoke field mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Stored value; overwritten by edge resolution (write-back memoization).
    #[serde(default)]
    pub value: JsonValue,
    /// Whether the field is shown as a form input in the UI.
    #[serde(default)]
    pub show: bool,
    /// Whether this field carries the node's output.
    #[serde(default)]
    pub is_output: bool,
    /// Source node this field's value is mapped from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Field key on the source node that feeds this field's output mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_field_key: Option<String>,
    /// Field key on the source node that feeds this field's input mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_key: Option<String>,
    /// Display type tag of the field.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<JsonValue>,
    /// Unknown keys round-trip untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl FieldRecord {
    /// A plain value-carrying field.
    pub fn with_value(value: JsonValue) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    /// An output field.
    pub fn output(value: JsonValue) -> Self {
        Self {
            value,
            is_output: true,
            ..Default::default()
        }
    }
}
