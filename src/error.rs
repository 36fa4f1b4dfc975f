//! Error types for Layerflow.
//!
//! All errors in Layerflow are represented by the `LayerflowError` enum,
//! which provides specific variants for different error categories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Layerflow operations.
///
/// Each variant represents a specific category of error that can occur
/// during planning, execution, or storage operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum LayerflowError {
    /// Engine-level errors (startup, shutdown, dispatch).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, model shapes).
    #[error("{0}")]
    Convert(String),

    /// The node graph is not a DAG; planning fails before any task runs.
    #[error("{0}")]
    Cycle(String),

    /// A task handler failed; the offending task name is kept for the
    /// run record's failure report.
    #[error("task {task_name} failed: {message}")]
    Task {
        task_name: String,
        message: String,
    },

    /// An async sub-workflow exceeded its expire time.
    #[error("async task for node {0} timed out")]
    AsyncTaskTimeout(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Workflow document errors.
    #[error("{0}")]
    Workflow(String),

    /// Node definition or lookup errors.
    #[error("{0}")]
    Node(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl LayerflowError {
    /// The task name to record on a failed run, `unknown.error` for
    /// failures that did not originate in a task handler.
    pub fn error_task(&self) -> String {
        match self {
            LayerflowError::Task {
                task_name, ..
            } => task_name.clone(),
            LayerflowError::AsyncTaskTimeout(_) => "async.timeout".to_string(),
            _ => "unknown.error".to_string(),
        }
    }
}

impl From<LayerflowError> for String {
    fn from(val: LayerflowError) -> Self {
        val.to_string()
    }
}

impl From<serde_json::Error> for LayerflowError {
    fn from(error: serde_json::Error) -> Self {
        LayerflowError::Convert(error.to_string())
    }
}
