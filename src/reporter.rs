//! Terminal status reporting for workflow runs.
//!
//! The reporter is the single writer of terminal run-record state. It
//! persists the final workflow snapshot, stamps the end time and blamed
//! task, and for chat-triggered runs assembles the output nodes into a
//! markdown result delivered back onto the source message.

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use crate::{
    Result,
    state::WorkflowState,
    store::{
        Store,
        data::{MessageStatus, RunFrom, RunStatus},
    },
    utils,
};

/// One renderable output produced by a run.
#[derive(Debug, Clone)]
pub struct OutputContent {
    pub title: String,
    pub content_type: String,
    pub value: JsonValue,
}

impl OutputContent {
    /// Render the content as a markdown fragment.
    pub fn render(&self) -> String {
        let text = match &self.value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.content_type.as_str() {
            "mermaid" => format!("```mermaid\n{text}\n```"),
            "mindmap" | "echarts" | "table" => format!("```json\n{text}\n```"),
            "html" => format!("```html\n{text}\n```"),
            "audio" => format!("[audio]({text})"),
            _ => text,
        }
    }
}

/// Collect the renderable outputs of a run from its final snapshot.
///
/// An output is any `is_output` field on a node in the `outputs` category.
/// The title falls back from the field's display name to the field key.
pub(crate) fn collect_outputs(state: &WorkflowState) -> Vec<OutputContent> {
    let mut outputs = Vec::new();
    for node in &state.model().nodes {
        if node.category != "outputs" {
            continue;
        }
        for (key, field) in &node.data.template {
            if !field.is_output {
                continue;
            }
            let title = field.extra.get("display_name").and_then(|v| v.as_str()).unwrap_or(key.as_str()).to_string();
            let content_type = if field.field_type.is_empty() {
                node.node_type.to_lowercase()
            } else {
                field.field_type.to_lowercase()
            };
            outputs.push(OutputContent {
                title,
                content_type,
                value: field.value.clone(),
            });
        }
    }
    outputs
}

fn assemble_markdown(outputs: &[OutputContent]) -> String {
    outputs.iter().map(|o| format!("# {}\n{}", o.title, o.render())).collect::<Vec<_>>().join("\n\n")
}

/// Writes terminal run status to the store.
pub struct RunReporter {
    store: Arc<Store>,
}

impl RunReporter {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }

    /// Persist a run's terminal status and final snapshot.
    ///
    /// For chat-triggered runs whose source message is still waiting on the
    /// workflow, a finished run assembles the outputs into
    /// `metadata.workflow_result` and flips the message to `Success`; a
    /// failed run flips it to `Failed`.
    pub fn report(
        &self,
        state: &WorkflowState,
        status: RunStatus,
        error_task: Option<String>,
    ) -> Result<bool> {
        let records = self.store.run_records();
        let mut record = records.find(state.record_id())?;

        record.status = status;
        record.end_time = utils::time::time_millis();
        record.error_task = error_task.unwrap_or_default();
        record.data = state.model().to_value()?;
        records.update(&record)?;
        debug!("run {} reported as {}", record.rid, record.status.as_ref());

        if record.run_from == RunFrom::Chat {
            if let Some(mid) = &record.source_message_id {
                self.finalize_message(mid, status, state);
            }
        }

        Ok(true)
    }

    fn finalize_message(
        &self,
        mid: &str,
        status: RunStatus,
        state: &WorkflowState,
    ) {
        let messages = self.store.messages();
        let mut message = match messages.find(mid) {
            Ok(m) => m,
            Err(err) => {
                warn!("source message {mid} not found: {err}");
                return;
            }
        };
        if message.status != MessageStatus::RunningWorkflow {
            return;
        }

        match status {
            RunStatus::Finished => {
                if !message.metadata.is_object() {
                    message.metadata = json!({});
                }
                let result = assemble_markdown(&collect_outputs(state));
                message.metadata["workflow_result"] = json!(result);
                message.status = MessageStatus::Success;
            }
            RunStatus::Failed => {
                message.status = MessageStatus::Failed;
            }
            _ => return,
        }

        message.update_time = utils::time::time_millis();
        if let Err(err) = messages.update(&message) {
            warn!("failed to update source message {mid}: {err}");
        }
    }
}
