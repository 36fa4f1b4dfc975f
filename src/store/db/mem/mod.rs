mod collect;

use std::sync::Arc;

use crate::store::{DbCollection, DbStore, Store, data::*};
pub use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    run_records: Arc<Collect<RunRecord>>,
    messages: Arc<Collect<ChatMessage>>,
    workflows: Arc<Collect<Workflow>>,
}

trait DbDocument {
    fn id(&self) -> &str;
}

impl DbDocument for RunRecord {
    fn id(&self) -> &str {
        &self.rid
    }
}

impl DbDocument for ChatMessage {
    fn id(&self) -> &str {
        &self.mid
    }
}

impl DbDocument for Workflow {
    fn id(&self) -> &str {
        &self.wid
    }
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) {
        s.register(self.run_records());
        s.register(self.messages());
        s.register(self.workflows());
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            run_records: Arc::new(Collect::new("run_records")),
            messages: Arc::new(Collect::new("messages")),
            workflows: Arc::new(Collect::new("workflows")),
        }
    }

    pub fn run_records(&self) -> Arc<dyn DbCollection<Item = RunRecord> + Send + Sync> {
        self.run_records.clone()
    }

    pub fn messages(&self) -> Arc<dyn DbCollection<Item = ChatMessage> + Send + Sync> {
        self.messages.clone()
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow> + Send + Sync> {
        self.workflows.clone()
    }
}
