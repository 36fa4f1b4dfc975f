mod node;
mod progress;
mod workflow;

pub use node::Node;
pub use progress::ProgressTracker;
pub use workflow::{PlanStep, TaskBinding, WorkflowState};
