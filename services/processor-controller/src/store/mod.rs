//! Typed access to stored objects.
//!
//! One [`Store`] per kind. Writes follow the usual optimistic-concurrency
//! rules: an object carrying a non-zero resource version must match the
//! stored one, spec writes never touch status, status writes never touch
//! spec, and the generation moves only when spec changes.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use procon_events::WatchEvent;
use procon_id::{ObjectKey, ResourceVersion};
use thiserror::Error;

use crate::api::{Function, LabelSelector, Processor, Resource, Stream, Workload};

pub use memory::{MemoryStore, MemoryStores, StoreAction, Verb};

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("conflict writing {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: ObjectKey,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Returns true for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// CRUD, list and watch for one kind.
#[async_trait]
pub trait Store<R: Resource>: Send + Sync {
    /// Fetches an owned copy of one object.
    async fn get(&self, key: &R::Key) -> Result<R, StoreError>;

    /// Lists every object whose labels match `selector`.
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<R>, StoreError>;

    /// Subscribes to changes from now on.
    fn watch(&self) -> BoxStream<'static, WatchEvent<R>>;

    /// Creates an object. The store assigns uid, generation and resource
    /// version; status starts empty.
    async fn create(&self, object: &R) -> Result<R, StoreError>;

    /// Replaces metadata and spec, keeping the stored status.
    async fn update(&self, object: &R) -> Result<R, StoreError>;

    /// Replaces status, keeping the stored metadata and spec.
    async fn update_status(&self, object: &R) -> Result<R, StoreError>;
}

/// One store handle per kind the controller touches.
#[derive(Clone)]
pub struct Stores {
    pub processors: Arc<dyn Store<Processor>>,
    pub functions: Arc<dyn Store<Function>>,
    pub streams: Arc<dyn Store<Stream>>,
    pub workloads: Arc<dyn Store<Workload>>,
}
