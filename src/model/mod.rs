mod edge;
mod field;
mod node;
mod workflow;

pub use edge::EdgeModel;
pub use field::FieldRecord;
pub use node::{NODE_FINISHED, NODE_STREAMING, NodeData, NodeId, NodeModel, RUN_TIME_UNMEASURED};
pub use workflow::{AsyncTaskEntry, TaskName, WorkflowModel};
