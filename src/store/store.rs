use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{LayerflowError, Result, ShareLock, model::WorkflowModel, store::data::*, utils};

use super::{DbCollection, DbCollectionIden, StoreIden};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

/// Collection registry. Backends register their typed collections at init
/// and consumers fetch them back by item type.
pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn collection<DATA>(&self) -> Arc<dyn DbCollection<Item = DATA>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().unwrap();

        #[allow(clippy::expect_fun_call)]
        let collection = collections.get(&DATA::iden()).expect(&format!("fail to get collection: {}", DATA::iden().as_ref()));

        #[allow(clippy::expect_fun_call)]
        collection.downcast_ref::<DynDbSetRef<DATA>>().map(|v| v.0.clone()).expect(&format!("fail to get collection: {}", DATA::iden().as_ref()))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().unwrap();
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
    }

    pub fn run_records(&self) -> Arc<dyn DbCollection<Item = RunRecord>> {
        self.collection()
    }

    pub fn messages(&self) -> Arc<dyn DbCollection<Item = ChatMessage>> {
        self.collection()
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow>> {
        self.collection()
    }

    /// Create-or-update a workflow definition keyed by its `wid`.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        trace!("store::deploy({})", workflow.wid);
        if workflow.wid.is_empty() {
            return Err(LayerflowError::Workflow("missing wid in workflow".into()));
        }
        let title = workflow.extra.get("title").and_then(|v| v.as_str()).unwrap_or(&workflow.wid).to_string();
        let text = workflow.to_json()?;
        let workflows = self.workflows();
        match workflows.find(&workflow.wid) {
            Ok(existing) => {
                let data = Workflow {
                    wid: workflow.wid.clone(),
                    title,
                    data: text,
                    create_time: existing.create_time,
                    update_time: utils::time::time_millis(),
                };
                workflows.update(&data)
            }
            Err(_) => {
                let data = Workflow {
                    wid: workflow.wid.clone(),
                    title,
                    data: text,
                    create_time: utils::time::time_millis(),
                    update_time: 0,
                };
                workflows.create(&data)
            }
        }
    }
}
