use async_trait::async_trait;

use crate::{
    model::WorkflowModel,
    registry::{StepOutcome, TaskContext, TaskHandler},
    state::WorkflowState,
};

/// Resolves the `text` input and exposes it as the node's `output`.
pub struct Text;

#[async_trait]
impl TaskHandler for Text {
    async fn run(
        &self,
        _ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let mut state = WorkflowState::new(data);
        let text = state.get_node_field_value(node_id, "text");
        state.update_node_field_value(node_id, "output", text);
        StepOutcome::Done(state.into_model())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::model::{EdgeModel, FieldRecord, NodeModel};

    #[tokio::test]
    async fn test_text_resolves_edge_input_into_output() {
        let mut source = NodeModel::new("src", "Stub", "processing", "stub.a");
        source.data.template.insert("result".to_string(), FieldRecord::output(json!("resolved")));

        let mut out = NodeModel::new("out", "Text", "outputs", "output.text");
        out.data.template.insert("text".to_string(), FieldRecord::with_value(json!("stale")));

        let model = WorkflowModel {
            nodes: vec![source, out],
            edges: vec![EdgeModel::new("src", "result", "out", "text")],
            ..Default::default()
        };

        let ctx = crate::tasks::control_flows::test_support::ctx();
        let outcome = Text.run(&ctx, model, "out").await;
        let StepOutcome::Done(updated) = outcome else {
            panic!("expected Done");
        };
        let node = updated.nodes.iter().find(|n| n.id == "out").unwrap();
        assert_eq!(node.data.template["output"].value, json!("resolved"));
    }
}
