//! # Layerflow
//!
//! Layerflow is a layered DAG workflow execution engine written in Rust.
//! It takes a serialized node/edge graph, plans it into serial and concurrent
//! execution steps, dispatches each node to a registered task handler, and
//! reports terminal status to a pluggable store.
//!
//! ## Core Features
//!
//! - **Layered Scheduling**: independent nodes are grouped into layers and
//!   executed concurrently instead of one at a time
//! - **Self-Retry Protocol**: nodes whose work is itself another workflow run
//!   suspend via bounded retry polling instead of blocking a worker
//! - **Deterministic Batch Merge**: concurrent snapshots are merged back into
//!   one consistent state without cross-branch clobbering
//! - **Pluggable Storage**: in-memory store for testing, trait-based seam for
//!   production persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use layerflow::{EngineBuilder, WorkflowModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! let record_id = engine.run(workflow)?;
//! let report = engine.check_status(&record_id)?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod graph;
mod model;
mod registry;
mod reporter;
mod state;
mod store;
mod tasks;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::{MemCache, Queue};
pub use config::{CacheConfig, Config, RetryConfig, StoreConfig, StoreType};
pub use engine::{Engine, RunOptions, StatusReport};
pub use error::LayerflowError;
pub use graph::{Dag, Layer};
pub use model::*;
pub use registry::{RunJob, StepOutcome, TaskContext, TaskHandler, TaskRegistry};
pub use reporter::OutputContent;
pub use state::{Node, PlanStep, ProgressTracker, TaskBinding, WorkflowState};
pub use store::{
    DbCollection, MemStore, Store,
    data::{ChatMessage, MessageStatus, RunFrom, RunRecord, RunStatus, Workflow},
};

/// Result type alias for Layerflow operations.
pub type Result<T> = std::result::Result<T, LayerflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
