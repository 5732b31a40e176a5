//! Collaborator interfaces the audit engine is generic over.
//!
//! Concrete adapters for real document stores live outside this crate.
//! [`MemoryDocStore`] implements every interface in memory and is used by
//! the replay tool and the tests.

pub mod memory;

use crate::core::{AuditRecord, Document, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use memory::MemoryDocStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Acknowledgement of one written document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocResult {
    pub id: String,
    pub rev: String,
}

/// Pass-through options for a primary bulk write (e.g. `all_or_nothing`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOptions {
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// One row of a keyed audit lookup. `doc` is `None` when the key is unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub id: String,
    pub doc: Option<AuditRecord>,
}

/// Store holding the documents being audited.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Fetches the currently stored state of a document.
    async fn get_doc(&self, id: &str) -> StoreResult<Document>;

    async fn save_doc(&self, doc: &Document) -> StoreResult<DocResult>;

    async fn remove_doc(&self, id: &str, rev: Option<&str>) -> StoreResult<DocResult>;

    async fn bulk_docs(&self, docs: &[Document], options: &BulkOptions)
    -> StoreResult<Vec<DocResult>>;
}

/// Store holding audit records. May be the same backing store as the primary one.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Looks up audit records by id, one row per requested key.
    async fn fetch_by_keys(&self, ids: &[String]) -> StoreResult<Vec<AuditRow>>;

    async fn bulk_docs(&self, records: &[AuditRecord]) -> StoreResult<Vec<DocResult>>;
}

/// Mints identifiers for documents that do not have one yet.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn allocate(&self, count: usize) -> StoreResult<Vec<String>>;
}

/// Yields the name of the user performing the current call.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    async fn resolve_actor(&self) -> StoreResult<String>;
}
