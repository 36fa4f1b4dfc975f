//! Built-in task handlers.
//!
//! The engine itself is ignorant of node semantics; these handlers are
//! registered through the same [`TaskRegistry`] seam as user handlers.

pub mod control_flows;
pub mod output;
pub mod triggers;

use std::sync::Arc;

use crate::registry::TaskRegistry;

pub fn register_builtin_tasks(registry: &mut TaskRegistry) {
    registry.register("control_flows.empty", Arc::new(control_flows::Empty));
    registry.register("control_flows.conditional", Arc::new(control_flows::Conditional));
    registry.register("control_flows.workflow_invoke", Arc::new(control_flows::WorkflowInvoke));
    registry.register("control_flows.workflow_loop", Arc::new(control_flows::WorkflowLoop));
    registry.register("output.text", Arc::new(output::Text));
    registry.register("triggers.button_trigger", Arc::new(triggers::ButtonTrigger));
}
