use async_trait::async_trait;

use crate::{
    model::WorkflowModel,
    registry::{StepOutcome, TaskContext, TaskHandler},
    state::WorkflowState,
};

/// Manual-start marker. Performs no work; the node only exists so a human
/// can kick the run off from a form.
pub struct ButtonTrigger;

#[async_trait]
impl TaskHandler for ButtonTrigger {
    async fn run(
        &self,
        _ctx: &TaskContext,
        data: WorkflowModel,
        _node_id: &str,
    ) -> StepOutcome {
        StepOutcome::Done(WorkflowState::new(data).into_model())
    }
}
