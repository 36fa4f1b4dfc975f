use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// A stored workflow definition.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Workflow {
    pub wid: String,
    pub title: String,
    /// Serialized node/edge graph.
    pub data: String,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Workflow {
    fn iden() -> StoreIden {
        StoreIden::Workflows
    }
}
