use crate::batch::run_batched;
use crate::config::AuditConfig;
use crate::core::{Action, AuditError, AuditRecord, Document, Result, StoreError, audit_id_for};
use crate::reconcile::Reconciler;
use crate::store::{
    ActorResolver, AuditStore, BulkOptions, DocResult, IdAllocator, PrimaryStore, StoreResult,
};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Audited access to a primary document store.
///
/// Every mutation first writes the audit records of the documents involved
/// and only then touches the primary store. If the audit write fails the
/// primary store is left alone. If the primary mutation fails after the audit
/// write succeeded, the audit entries stay in place.
///
/// # Examples
///
/// ```ignore
/// let store = Arc::new(MemoryDocStore::new());
/// let audit = AuditLog::with_store(store, StaticActor::new("alice"));
///
/// let saved = audit.save_doc(Document::new().with_field("type", json!("data_record"))).await?;
/// let record = audit.get(&saved.id).await?.unwrap();
/// assert_eq!(record.history.len(), 1);
/// ```
pub struct AuditLog {
    primary: Arc<dyn PrimaryStore>,
    audit: Arc<dyn AuditStore>,
    allocator: Arc<dyn IdAllocator>,
    actor: Arc<dyn ActorResolver>,
    config: AuditConfig,
}

impl AuditLog {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        audit: Arc<dyn AuditStore>,
        allocator: Arc<dyn IdAllocator>,
        actor: Arc<dyn ActorResolver>,
    ) -> Self {
        Self {
            primary,
            audit,
            allocator,
            actor,
            config: AuditConfig::default(),
        }
    }

    /// Uses one store for documents, audit records and id allocation.
    pub fn with_store<S, A>(store: Arc<S>, actor: A) -> Self
    where
        S: PrimaryStore + AuditStore + IdAllocator + 'static,
        A: ActorResolver + 'static,
    {
        Self::new(store.clone(), store.clone(), store, Arc::new(actor))
    }

    pub fn with_config(mut self, config: AuditConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Records audit entries for `docs` without touching the primary store.
    ///
    /// Documents without an id get one assigned in place. Returns one audit
    /// record per document id as persisted, in order of first appearance.
    /// Repeats of an id within `docs` append to the same history.
    pub async fn log_only(
        &self,
        docs: &mut [Document],
        action_override: Option<Action>,
    ) -> Result<Vec<AuditRecord>> {
        let span = info_span!(
            "audit.log",
            app = %self.config.app_name,
            docs = docs.len(),
            action = ?action_override
        );
        self.audit_docs(docs, action_override).instrument(span).await
    }

    /// Audits and saves one document.
    pub async fn save_doc(&self, mut doc: Document) -> Result<DocResult> {
        self.log_only(std::slice::from_mut(&mut doc), None).await?;
        self.primary
            .save_doc(&doc)
            .await
            .map_err(|err| self.primary_failure(err))
    }

    /// Audits and saves a list of documents in one primary bulk write.
    pub async fn bulk_save(
        &self,
        mut docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<DocResult>> {
        self.log_only(&mut docs, None).await?;
        self.primary
            .bulk_docs(&docs, &options)
            .await
            .map_err(|err| self.primary_failure(err))
    }

    /// Audits the deletion of a document, then removes it by id and revision.
    pub async fn remove_doc(&self, mut doc: Document) -> Result<DocResult> {
        let Some(id) = doc.id.clone() else {
            return Err(AuditError::InvalidDocument(
                "cannot remove a document without an _id".to_string(),
            ));
        };
        self.log_only(std::slice::from_mut(&mut doc), Some(Action::Delete))
            .await?;
        self.primary
            .remove_doc(&id, doc.rev.as_deref())
            .await
            .map_err(|err| self.primary_failure(err))
    }

    /// Returns the audit record of a primary document, if it has one.
    pub async fn get(&self, primary_id: &str) -> Result<Option<AuditRecord>> {
        let audit_id = audit_id_for(primary_id);
        let mut existing = self
            .fetch_existing(std::slice::from_ref(&audit_id))
            .await
            .map_err(AuditError::ExistingAuditFetch)?;
        Ok(existing.remove(&audit_id))
    }

    async fn audit_docs(
        &self,
        docs: &mut [Document],
        action_override: Option<Action>,
    ) -> Result<Vec<AuditRecord>> {
        let actor = self
            .actor
            .resolve_actor()
            .await
            .map_err(AuditError::ActorResolution)?;

        let mut seen = HashSet::new();
        let audit_ids: Vec<String> = docs
            .iter()
            .filter_map(|doc| doc.id.as_deref())
            .map(audit_id_for)
            .filter(|audit_id| seen.insert(audit_id.clone()))
            .collect();
        let existing = self
            .fetch_existing(&audit_ids)
            .await
            .map_err(AuditError::ExistingAuditFetch)?;
        event!(
            Level::DEBUG,
            requested = audit_ids.len(),
            found = existing.len(),
            "existing audit records fetched"
        );

        let reconciler = Reconciler::new(&actor, self.allocator.as_ref(), self.primary.as_ref())
            .with_action_override(action_override);
        let existing = &existing;
        let reconciler = &reconciler;
        let mut records: Vec<AuditRecord> =
            try_join_all(group_by_id(docs).into_iter().map(|group| async move {
                let mut current = group[0]
                    .id
                    .as_deref()
                    .and_then(|id| existing.get(&audit_id_for(id)).cloned());
                // repeats of an id build on the record left by the previous one
                for doc in group {
                    current = Some(reconciler.reconcile(doc, current).await?);
                }
                Ok::<_, AuditError>(current)
            }))
            .await?
            .into_iter()
            .flatten()
            .collect();

        let results = run_batched(&records, self.config.batch_size, |chunk| {
            self.audit.bulk_docs(chunk)
        })
        .await
        .map_err(AuditError::AuditPersist)?;

        if results.len() == records.len() {
            for (record, result) in records.iter_mut().zip(results) {
                record.rev = Some(result.rev);
            }
        }
        event!(Level::DEBUG, records = records.len(), "audit records persisted");
        Ok(records)
    }

    async fn fetch_existing(
        &self,
        audit_ids: &[String],
    ) -> StoreResult<HashMap<String, AuditRecord>> {
        let rows = run_batched(audit_ids, self.config.batch_size, |chunk| {
            self.audit.fetch_by_keys(chunk)
        })
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .collect())
    }

    fn primary_failure(&self, err: StoreError) -> AuditError {
        event!(
            Level::WARN,
            app = %self.config.app_name,
            error = %err,
            "primary mutation failed after audit records were persisted"
        );
        AuditError::PrimaryMutation(err)
    }
}

/// Splits `docs` into groups sharing an `_id`, in order of first appearance.
/// Documents without an id each form their own group.
fn group_by_id(docs: &mut [Document]) -> Vec<Vec<&mut Document>> {
    let mut groups: Vec<Vec<&mut Document>> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for doc in docs.iter_mut() {
        let Some(id) = doc.id.clone() else {
            groups.push(vec![doc]);
            continue;
        };
        match slots.get(&id) {
            Some(&slot) => groups[slot].push(doc),
            None => {
                slots.insert(id, groups.len());
                groups.push(vec![doc]);
            }
        }
    }
    groups
}
