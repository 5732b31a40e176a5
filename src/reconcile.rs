//! History reconciliation: decides which entries a document's audit record
//! gains for one change event.
//!
//! The decision depends on whether the document already has an id, whether
//! an audit record exists for it, and whether its revision shows history
//! that was written before auditing started. In that last case the stored
//! state is fetched and recorded as an anonymous backfill entry ahead of the
//! live one.

use crate::core::{
    Action, AuditError, AuditRecord, Document, HistoryEntry, Result, StoreError,
    is_initial_revision,
};
use crate::store::{IdAllocator, PrimaryStore};
use chrono::Utc;
use log::warn;
use tracing::{Level, event};

/// Appends an entry for `doc` to `history`.
///
/// The previously newest entry is healed first: its placeholder revision is
/// replaced by the revision `doc` carries, which is the revision that change
/// produced. The new entry stores a snapshot of `doc` with the placeholder.
pub fn append_history(
    history: &mut Vec<HistoryEntry>,
    action: Action,
    actor: Option<&str>,
    doc: &Document,
) {
    if let Some(previous) = history.last_mut() {
        previous.snapshot.rev = doc.rev.clone();
    }
    history.push(HistoryEntry {
        action,
        actor: actor.map(str::to_string),
        timestamp: Utc::now(),
        snapshot: doc.snapshot(),
    });
}

/// Action recorded for a change to a document that is already known.
pub fn live_action(doc: &Document, action_override: Option<Action>) -> Action {
    match action_override {
        Some(action) => action,
        None if doc.deleted => Action::Delete,
        None => Action::Update,
    }
}

/// Per-call reconciliation context shared by every document of the call.
pub struct Reconciler<'a> {
    actor: &'a str,
    action_override: Option<Action>,
    allocator: &'a dyn IdAllocator,
    primary: &'a dyn PrimaryStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        actor: &'a str,
        allocator: &'a dyn IdAllocator,
        primary: &'a dyn PrimaryStore,
    ) -> Self {
        Self {
            actor,
            action_override: None,
            allocator,
            primary,
        }
    }

    pub fn with_action_override(mut self, action_override: Option<Action>) -> Self {
        self.action_override = action_override;
        self
    }

    /// Computes the audit record that must exist after this change to `doc`.
    ///
    /// A document without an id gets one allocated and assigned in place.
    /// `existing` is the audit record currently stored for the document, if any.
    pub async fn reconcile(
        &self,
        doc: &mut Document,
        existing: Option<AuditRecord>,
    ) -> Result<AuditRecord> {
        let id = match doc.id.clone() {
            Some(id) => id,
            None => {
                let id = self.allocate_id().await?;
                doc.id = Some(id.clone());
                let mut record = AuditRecord::for_primary(&id);
                append_history(&mut record.history, Action::Create, Some(self.actor), doc);
                return Ok(record);
            }
        };

        if let Some(mut record) = existing {
            let action = live_action(doc, self.action_override);
            append_history(&mut record.history, action, Some(self.actor), doc);
            return Ok(record);
        }

        let mut record = AuditRecord::for_primary(&id);
        if doc.has_unaudited_revisions() {
            self.backfill(&id, doc, &mut record.history).await;
        } else {
            append_history(&mut record.history, Action::Create, Some(self.actor), doc);
        }
        Ok(record)
    }

    async fn allocate_id(&self) -> Result<String> {
        let ids = self
            .allocator
            .allocate(1)
            .await
            .map_err(AuditError::IdentifierAllocation)?;
        ids.into_iter().next().ok_or_else(|| {
            AuditError::IdentifierAllocation(StoreError::Rejected(
                "allocator returned no identifiers".to_string(),
            ))
        })
    }

    /// Records the stored state of a document that was changed before
    /// auditing started, followed by the live change.
    ///
    /// When the stored state cannot be read, the live change is recorded as
    /// the creation of the document instead.
    async fn backfill(&self, id: &str, doc: &Document, history: &mut Vec<HistoryEntry>) {
        match self.primary.get_doc(id).await {
            Ok(prior) => {
                event!(
                    Level::DEBUG,
                    id,
                    prior_rev = prior.rev.as_deref().unwrap_or_default(),
                    "backfilling unaudited history"
                );
                let prior_action = if prior.rev.as_deref().is_some_and(is_initial_revision) {
                    Action::Create
                } else {
                    Action::Update
                };
                append_history(history, prior_action, None, &prior);
                let action = live_action(doc, self.action_override);
                append_history(history, action, Some(self.actor), doc);
            }
            Err(err) => {
                warn!(
                    "prior state unavailable, recording document as created: id='{}' error='{}'",
                    id, err
                );
                append_history(history, Action::Create, Some(self.actor), doc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::REVISION_PLACEHOLDER;
    use crate::store::MemoryDocStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct EmptyAllocator;

    #[async_trait]
    impl IdAllocator for EmptyAllocator {
        async fn allocate(&self, _count: usize) -> crate::store::StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_append_heals_previous_entry() {
        let mut history = Vec::new();
        let first = Document::new().with_id("a").with_rev("1-aaa");
        append_history(&mut history, Action::Create, Some("u"), &first);
        assert_eq!(history[0].snapshot.rev.as_deref(), Some(REVISION_PLACEHOLDER));

        let second = Document::new().with_id("a").with_rev("2-bbb");
        append_history(&mut history, Action::Update, Some("u"), &second);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot.rev.as_deref(), Some("2-bbb"));
        assert_eq!(history[1].snapshot.rev.as_deref(), Some(REVISION_PLACEHOLDER));
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[test]
    fn test_live_action_precedence() {
        let doc = Document::new().with_id("a");
        let deleted = doc.clone().mark_deleted();
        assert_eq!(live_action(&doc, None), Action::Update);
        assert_eq!(live_action(&deleted, None), Action::Delete);
        assert_eq!(live_action(&doc, Some(Action::Delete)), Action::Delete);
        assert_eq!(live_action(&deleted, Some(Action::Update)), Action::Update);
    }

    #[tokio::test]
    async fn test_new_document_gets_allocated_id() {
        let store = MemoryDocStore::new();
        let reconciler = Reconciler::new("someuser", &store, &store);
        let mut doc = Document::new().with_field("type", json!("data_record"));

        let record = reconciler.reconcile(&mut doc, None).await.unwrap();

        let id = doc.id.clone().unwrap();
        assert_eq!(record.id, format!("{}-audit", id));
        assert_eq!(record.actions(), vec![Action::Create]);
        assert_eq!(record.history[0].actor.as_deref(), Some("someuser"));
        assert_eq!(record.history[0].snapshot.id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_empty_allocation_is_an_error() {
        let store = MemoryDocStore::new();
        let reconciler = Reconciler::new("someuser", &EmptyAllocator, &store);
        let err = reconciler
            .reconcile(&mut Document::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::IdentifierAllocation(_)));
    }

    #[tokio::test]
    async fn test_initial_revision_is_recorded_as_create() {
        let store = MemoryDocStore::new();
        let reconciler = Reconciler::new("someuser", &store, &store);
        let mut doc = Document::new().with_id("abc").with_rev("1-xyz");

        let record = reconciler.reconcile(&mut doc, None).await.unwrap();
        assert_eq!(record.actions(), vec![Action::Create]);
    }

    #[tokio::test]
    async fn test_backfill_from_prior_update() {
        let store = MemoryDocStore::new();
        store
            .put_raw(&Document::new().with_id("abc").with_rev("4-old"))
            .await
            .unwrap();
        let reconciler = Reconciler::new("someuser", &store, &store)
            .with_action_override(Some(Action::Delete));
        let mut doc = Document::new().with_id("abc").with_rev("5-new");

        let record = reconciler.reconcile(&mut doc, None).await.unwrap();

        assert_eq!(record.actions(), vec![Action::Update, Action::Delete]);
        assert_eq!(record.history[0].actor, None);
        assert_eq!(record.history[0].snapshot.rev.as_deref(), Some("5-new"));
        assert_eq!(record.history[1].actor.as_deref(), Some("someuser"));
    }

    #[tokio::test]
    async fn test_existing_record_is_extended() {
        let store = MemoryDocStore::new();
        let reconciler = Reconciler::new("someuser", &store, &store);
        let mut existing = AuditRecord::for_primary("abc");
        append_history(
            &mut existing.history,
            Action::Create,
            Some("other"),
            &Document::new().with_id("abc"),
        );
        let mut doc = Document::new().with_id("abc").with_rev("2-next").mark_deleted();

        let record = reconciler.reconcile(&mut doc, Some(existing)).await.unwrap();

        assert_eq!(record.actions(), vec![Action::Create, Action::Delete]);
        assert_eq!(record.history[0].snapshot.rev.as_deref(), Some("2-next"));
        assert_eq!(record.history[0].actor.as_deref(), Some("other"));
    }
}
