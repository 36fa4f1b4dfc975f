use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    LayerflowError, Result, ShareLock,
    store::DbCollection,
};

use super::DbDocument;

/// One in-memory collection keyed by document id.
#[derive(Debug)]
pub struct Collect<T> {
    name: String,
    rows: ShareLock<HashMap<String, T>>,
}

impl<T> Collect<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let rows = self.rows.read().unwrap();
        Ok(rows.contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<T> {
        let rows = self.rows.read().unwrap();
        rows.get(id).cloned().ok_or_else(|| LayerflowError::Store(format!("cannot find record {id} in {}", self.name)))
    }

    fn count(&self) -> Result<usize> {
        let rows = self.rows.read().unwrap();
        Ok(rows.len())
    }

    fn create(
        &self,
        data: &T,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(data.id()) {
            return Err(LayerflowError::Store(format!("record {} already exists in {}", data.id(), self.name)));
        }
        rows.insert(data.id().to_string(), data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &T,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        if !rows.contains_key(data.id()) {
            return Err(LayerflowError::Store(format!("cannot find record {} in {}", data.id(), self.name)));
        }
        rows.insert(data.id().to_string(), data.clone());
        Ok(true)
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        Ok(rows.remove(id).is_some())
    }
}
