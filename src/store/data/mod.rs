mod message;
mod run_record;
mod workflow;

pub use message::{ChatMessage, MessageStatus};
pub use run_record::{RunFrom, RunRecord, RunStatus};
pub use workflow::Workflow;
