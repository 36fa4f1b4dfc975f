//! Storage layer for run records, chat messages, and workflow documents.
//!
//! Provides an abstraction over storage backends:
//! - `MemStore`: In-memory storage for testing and embedded use
//!
//! Production backends plug in by implementing [`DbCollection`] per
//! collection and [`DbStore`] for registration.

pub mod data;
mod db;
mod store;

use strum::{AsRefStr, EnumIter};

use crate::Result;

pub use db::MemStore;
pub use store::Store;

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq, EnumIter)]
pub enum StoreIden {
    /// Workflow definitions.
    #[strum(serialize = "workflows")]
    Workflows,
    /// Workflow run records.
    #[strum(serialize = "run_records")]
    RunRecords,
    /// Chat messages that can trigger runs.
    #[strum(serialize = "messages")]
    Messages,
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Counts all records in the collection.
    fn count(&self) -> Result<usize>;

    /// Creates a new record.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Deletes a record by ID.
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;
}

/// Trait for database store initialization.
pub trait DbStore {
    /// Initializes the database and registers collections with the store.
    fn init(
        &self,
        s: &Store,
    );
}
