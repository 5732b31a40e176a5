use super::{AuditRow, AuditStore, BulkOptions, DocResult, IdAllocator, PrimaryStore, StoreResult};
use crate::core::{AuditRecord, Document, StoreError, audit_id_for, revision_generation};
use crate::identity::UuidAllocator;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredDoc {
    rev: String,
    deleted: bool,
    body: Value,
}

/// In-memory document store with CouchDB-style revision tokens.
///
/// Every write bumps the generation of the document's revision
/// (`<generation>-<32 hex>`). Deletes leave a tombstone so the generation keeps
/// counting if the id is reused. Writes never check the incoming revision: the
/// last writer wins.
///
/// One instance can back the primary store, the audit store and the id
/// allocator at the same time; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocStore {
    docs: Arc<RwLock<HashMap<String, StoredDoc>>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document exactly as given, keeping its `_rev`.
    ///
    /// Used to seed state that was written before auditing was enabled.
    pub async fn put_raw(&self, doc: &Document) -> StoreResult<()> {
        let id = doc
            .id
            .clone()
            .ok_or_else(|| StoreError::Rejected("document without _id".to_string()))?;
        let rev = doc
            .rev
            .clone()
            .ok_or_else(|| StoreError::Rejected(format!("document '{}' without _rev", id)))?;
        let body = serde_json::to_value(doc)?;
        let mut docs = self.docs.write().await;
        docs.insert(
            id,
            StoredDoc {
                rev,
                deleted: doc.deleted,
                body,
            },
        );
        Ok(())
    }

    /// Raw JSON of a live document.
    pub async fn raw(&self, id: &str) -> Option<Value> {
        let docs = self.docs.read().await;
        docs.get(id)
            .filter(|stored| !stored.deleted)
            .map(|stored| stored.body.clone())
    }

    /// Current revision of a document, tombstones included.
    pub async fn current_rev(&self, id: &str) -> Option<String> {
        let docs = self.docs.read().await;
        docs.get(id).map(|stored| stored.rev.clone())
    }

    pub async fn is_deleted(&self, id: &str) -> bool {
        let docs = self.docs.read().await;
        docs.get(id).is_some_and(|stored| stored.deleted)
    }

    /// Number of live documents, audit records included.
    pub async fn len(&self) -> usize {
        let docs = self.docs.read().await;
        docs.values().filter(|stored| !stored.deleted).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reads the audit record of a primary document straight from storage.
    pub async fn audit_record(&self, primary_id: &str) -> StoreResult<Option<AuditRecord>> {
        match self.raw(&audit_id_for(primary_id)).await {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    fn next_rev(previous: Option<&StoredDoc>) -> String {
        let generation = previous
            .and_then(|stored| revision_generation(&stored.rev))
            .unwrap_or(0)
            + 1;
        format!("{}-{}", generation, Uuid::new_v4().simple())
    }

    fn write_locked(
        docs: &mut HashMap<String, StoredDoc>,
        id: String,
        mut body: Value,
        deleted: bool,
    ) -> StoreResult<DocResult> {
        let rev = Self::next_rev(docs.get(&id));
        let fields = body.as_object_mut().ok_or_else(|| {
            StoreError::Rejected(format!("document '{}' is not a JSON object", id))
        })?;
        fields.insert("_id".to_string(), json!(id));
        fields.insert("_rev".to_string(), json!(rev));
        docs.insert(
            id.clone(),
            StoredDoc {
                rev: rev.clone(),
                deleted,
                body,
            },
        );
        Ok(DocResult { id, rev })
    }

    fn write_document_locked(
        docs: &mut HashMap<String, StoredDoc>,
        doc: &Document,
    ) -> StoreResult<DocResult> {
        let id = doc
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let body = serde_json::to_value(doc)?;
        Self::write_locked(docs, id, body, doc.deleted)
    }
}

#[async_trait]
impl PrimaryStore for MemoryDocStore {
    async fn get_doc(&self, id: &str) -> StoreResult<Document> {
        let docs = self.docs.read().await;
        match docs.get(id) {
            Some(stored) if !stored.deleted => Ok(serde_json::from_value(stored.body.clone())?),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn save_doc(&self, doc: &Document) -> StoreResult<DocResult> {
        let mut docs = self.docs.write().await;
        Self::write_document_locked(&mut docs, doc)
    }

    async fn remove_doc(&self, id: &str, _rev: Option<&str>) -> StoreResult<DocResult> {
        let mut docs = self.docs.write().await;
        match docs.get(id) {
            Some(stored) if !stored.deleted => {}
            _ => return Err(StoreError::NotFound(id.to_string())),
        }
        Self::write_locked(&mut docs, id.to_string(), json!({ "_deleted": true }), true)
    }

    async fn bulk_docs(
        &self,
        docs: &[Document],
        _options: &BulkOptions,
    ) -> StoreResult<Vec<DocResult>> {
        let mut stored = self.docs.write().await;
        docs.iter()
            .map(|doc| Self::write_document_locked(&mut stored, doc))
            .collect()
    }
}

#[async_trait]
impl AuditStore for MemoryDocStore {
    async fn fetch_by_keys(&self, ids: &[String]) -> StoreResult<Vec<AuditRow>> {
        let docs = self.docs.read().await;
        ids.iter()
            .map(|id| -> StoreResult<AuditRow> {
                let doc = match docs.get(id) {
                    Some(stored) if !stored.deleted => {
                        Some(serde_json::from_value(stored.body.clone())?)
                    }
                    _ => None,
                };
                Ok(AuditRow {
                    id: id.clone(),
                    doc,
                })
            })
            .collect()
    }

    async fn bulk_docs(&self, records: &[AuditRecord]) -> StoreResult<Vec<DocResult>> {
        let mut docs = self.docs.write().await;
        records
            .iter()
            .map(|record| -> StoreResult<DocResult> {
                let body = serde_json::to_value(record)?;
                Self::write_locked(&mut docs, record.id.clone(), body, false)
            })
            .collect()
    }
}

#[async_trait]
impl IdAllocator for MemoryDocStore {
    async fn allocate(&self, count: usize) -> StoreResult<Vec<String>> {
        UuidAllocator.allocate(count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::is_initial_revision;

    #[tokio::test]
    async fn test_save_bumps_revision_generation() {
        let store = MemoryDocStore::new();
        let doc = Document::new().with_id("a").with_field("n", json!(1));

        let first = PrimaryStore::save_doc(&store, &doc).await.unwrap();
        assert!(is_initial_revision(&first.rev));

        let second = PrimaryStore::save_doc(&store, &doc.clone().with_rev(first.rev))
            .await
            .unwrap();
        assert_eq!(revision_generation(&second.rev), Some(2));

        let stored = store.get_doc("a").await.unwrap();
        assert_eq!(stored.rev.as_deref(), Some(second.rev.as_str()));
        assert_eq!(stored.field("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_save_without_id_assigns_one() {
        let store = MemoryDocStore::new();
        let result = PrimaryStore::save_doc(&store, &Document::new()).await.unwrap();
        assert_eq!(result.id.len(), 32);
        assert!(store.get_doc(&result.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_leaves_tombstone() {
        let store = MemoryDocStore::new();
        let saved = PrimaryStore::save_doc(&store, &Document::new().with_id("a"))
            .await
            .unwrap();

        let removed = store.remove_doc("a", Some(saved.rev.as_str())).await.unwrap();
        assert_eq!(revision_generation(&removed.rev), Some(2));
        assert!(store.is_deleted("a").await);
        assert_eq!(
            store.get_doc("a").await.unwrap_err(),
            StoreError::NotFound("a".to_string())
        );
        assert!(store.remove_doc("a", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_by_keys_reports_missing_rows() {
        let store = MemoryDocStore::new();
        let record = AuditRecord::for_primary("a");
        AuditStore::bulk_docs(&store, &[record]).await.unwrap();

        let rows = store
            .fetch_by_keys(&["a-audit".to_string(), "b-audit".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let found = rows[0].doc.as_ref().unwrap();
        assert_eq!(found.id, "a-audit");
        assert!(found.rev.as_deref().is_some_and(is_initial_revision));
        assert_eq!(rows[1].id, "b-audit");
        assert!(rows[1].doc.is_none());
    }

    #[tokio::test]
    async fn test_put_raw_keeps_revision() {
        let store = MemoryDocStore::new();
        store
            .put_raw(&Document::new().with_id("123").with_rev("1-ASD"))
            .await
            .unwrap();
        assert_eq!(store.current_rev("123").await.as_deref(), Some("1-ASD"));

        let err = store.put_raw(&Document::new().with_id("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_allocate_mints_distinct_ids() {
        let store = MemoryDocStore::new();
        let ids = store.allocate(3).await.unwrap();

        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| id.len() == 32));
        assert_ne!(ids[0], ids[1]);
        assert!(store.allocate(0).await.unwrap().is_empty());
    }
}
