use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::AsRefStr;

use crate::store::{DbCollectionIden, StoreIden};

/// Lifecycle of one workflow run.
///
/// A record is created as `Queued`, moves to `Running` exactly once when a
/// worker picks it up, and ends in exactly one of the two terminal states.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[strum(serialize = "QUEUED")]
    Queued,
    #[strum(serialize = "RUNNING")]
    Running,
    #[strum(serialize = "FINISHED")]
    Finished,
    #[strum(serialize = "FAILED")]
    Failed,
}

/// Where a run was started from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunFrom {
    #[default]
    Web,
    Chat,
    Workflow,
}

/// One execution of a workflow, including the evolving graph snapshot.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunRecord {
    /// Run record id, unique per execution.
    pub rid: String,
    /// Workflow definition id this run belongs to.
    pub wid: String,
    pub status: RunStatus,
    /// Serialized workflow snapshot; updated on terminal status.
    pub data: JsonValue,
    pub run_from: RunFrom,
    /// Chat message that triggered the run, when `run_from` is `Chat`.
    pub source_message_id: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    /// Task name blamed for a failed run, empty otherwise.
    pub error_task: String,
}

impl DbCollectionIden for RunRecord {
    fn iden() -> StoreIden {
        StoreIden::RunRecords
    }
}

impl RunRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Finished | RunStatus::Failed)
    }
}
