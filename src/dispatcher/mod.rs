mod dispatcher;
mod merge;

pub use dispatcher::Dispatcher;
pub use merge::{BatchResult, MergeOutcome, merge_batch};
