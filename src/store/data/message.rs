use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Generating,
    /// The message is waiting on a workflow run it started.
    RunningWorkflow,
    Success,
    Failed,
}

/// A conversation message that can trigger a workflow run and receive its
/// assembled result.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChatMessage {
    pub mid: String,
    pub status: MessageStatus,
    /// Message payload; the run reporter writes `workflow_result` here.
    pub metadata: JsonValue,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for ChatMessage {
    fn iden() -> StoreIden {
        StoreIden::Messages
    }
}
