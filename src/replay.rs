//! Scripted replay of document changes through an audited in-memory store.
//!
//! A script names a default actor and an ordered list of operations:
//!
//! ```json
//! {
//!   "actor": "alice",
//!   "operations": [
//!     { "op": "seed", "doc": { "_id": "123", "_rev": "3-abc", "name": "legacy" } },
//!     { "op": "save", "doc": { "_id": "123", "name": "renamed" } },
//!     { "op": "bulk_save", "docs": [{ "name": "new" }], "options": { "all_or_nothing": true } },
//!     { "op": "remove", "id": "123", "actor": "bob" },
//!     { "op": "log", "docs": [{ "_id": "456" }], "action": "update" }
//!   ]
//! }
//! ```
//!
//! `seed` writes a document directly, bypassing auditing, to model history
//! that predates the audit trail. Other operations that name an existing
//! document without a `_rev` pick up the stored revision first, the way a
//! client reads before it writes.

use crate::audit_log::AuditLog;
use crate::config::AuditConfig;
use crate::core::{Action, AuditError, AuditRecord, Document, StoreError};
use crate::identity::StaticActor;
use crate::store::{BulkOptions, MemoryDocStore, PrimaryStore};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Level, event};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read script '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid replay script: {0}")]
    Parse(String),

    #[error(transparent)]
    Config(AuditError),

    #[error("Operation {index} failed: {source}")]
    Audit {
        index: usize,
        #[source]
        source: AuditError,
    },

    #[error("Operation {index} failed: {source}")]
    Store {
        index: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayOp {
    Seed {
        doc: Document,
    },
    Save {
        doc: Document,
        #[serde(default)]
        actor: Option<String>,
    },
    BulkSave {
        docs: Vec<Document>,
        #[serde(default)]
        options: BulkOptions,
        #[serde(default)]
        actor: Option<String>,
    },
    Remove {
        id: String,
        #[serde(default)]
        actor: Option<String>,
    },
    Log {
        docs: Vec<Document>,
        #[serde(default)]
        action: Option<Action>,
        #[serde(default)]
        actor: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    pub actor: String,
    #[serde(default)]
    pub operations: Vec<ReplayOp>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        serde_json::from_str(json).map_err(|err| ReplayError::Parse(err.to_string()))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ReplayError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        Self::from_json(&json)
    }
}

/// Outcome of a replay: the final audit record of every document touched,
/// in the order the documents were first touched.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub records: Vec<AuditRecord>,
    pub store: MemoryDocStore,
}

impl ReplayReport {
    pub fn record_for(&self, primary_id: &str) -> Option<&AuditRecord> {
        self.records
            .iter()
            .find(|record| record.primary_id() == primary_id)
    }
}

struct Replayer {
    store: Arc<MemoryDocStore>,
    config: AuditConfig,
    default_actor: String,
    touched: Vec<String>,
}

impl Replayer {
    fn audit_log(&self, actor: Option<&str>) -> Result<AuditLog, AuditError> {
        let actor = StaticActor::new(actor.unwrap_or(&self.default_actor));
        AuditLog::with_store(self.store.clone(), actor).with_config(self.config.clone())
    }

    fn touch(&mut self, id: &str) {
        if !self.touched.iter().any(|touched| touched == id) {
            self.touched.push(id.to_string());
        }
    }

    async fn stamp_revision(&self, doc: &mut Document) {
        if doc.rev.is_some() {
            return;
        }
        if let Some(id) = doc.id.as_deref() {
            if let Ok(stored) = self.store.get_doc(id).await {
                doc.rev = stored.rev;
            }
        }
    }

    async fn apply(&mut self, index: usize, op: ReplayOp) -> Result<(), ReplayError> {
        let audit_err = |source: AuditError| ReplayError::Audit { index, source };
        match op {
            ReplayOp::Seed { doc } => {
                self.store
                    .put_raw(&doc)
                    .await
                    .map_err(|source| ReplayError::Store { index, source })?;
            }
            ReplayOp::Save { mut doc, actor } => {
                self.stamp_revision(&mut doc).await;
                let result = self
                    .audit_log(actor.as_deref())
                    .map_err(audit_err)?
                    .save_doc(doc)
                    .await
                    .map_err(audit_err)?;
                self.touch(&result.id);
            }
            ReplayOp::BulkSave {
                mut docs,
                options,
                actor,
            } => {
                for doc in docs.iter_mut() {
                    self.stamp_revision(doc).await;
                }
                let results = self
                    .audit_log(actor.as_deref())
                    .map_err(audit_err)?
                    .bulk_save(docs, options)
                    .await
                    .map_err(audit_err)?;
                for result in &results {
                    self.touch(&result.id);
                }
            }
            ReplayOp::Remove { id, actor } => {
                let doc = self
                    .store
                    .get_doc(&id)
                    .await
                    .map_err(|source| ReplayError::Store { index, source })?;
                self.audit_log(actor.as_deref())
                    .map_err(audit_err)?
                    .remove_doc(doc)
                    .await
                    .map_err(audit_err)?;
                self.touch(&id);
            }
            ReplayOp::Log {
                mut docs,
                action,
                actor,
            } => {
                for doc in docs.iter_mut() {
                    self.stamp_revision(doc).await;
                }
                let records = self
                    .audit_log(actor.as_deref())
                    .map_err(audit_err)?
                    .log_only(&mut docs, action)
                    .await
                    .map_err(audit_err)?;
                for record in &records {
                    self.touch(record.primary_id());
                }
            }
        }
        Ok(())
    }
}

/// Runs every operation of `script` against a fresh [`MemoryDocStore`].
///
/// Stops at the first failing operation.
pub async fn run(script: &ReplayScript, config: AuditConfig) -> Result<ReplayReport, ReplayError> {
    config.validate().map_err(ReplayError::Config)?;
    let mut replayer = Replayer {
        store: Arc::new(MemoryDocStore::new()),
        config,
        default_actor: script.actor.clone(),
        touched: Vec::new(),
    };

    for (index, op) in script.operations.iter().cloned().enumerate() {
        replayer.apply(index, op).await?;
    }
    event!(
        Level::INFO,
        operations = script.operations.len(),
        documents = replayer.touched.len(),
        "replay finished"
    );

    let audit = replayer.audit_log(None).map_err(ReplayError::Config)?;
    let mut records = Vec::with_capacity(replayer.touched.len());
    for id in &replayer.touched {
        let record = audit.get(id).await.map_err(|source| ReplayError::Audit {
            index: script.operations.len(),
            source,
        })?;
        records.extend(record);
    }

    Ok(ReplayReport {
        records,
        store: (*replayer.store).clone(),
    })
}
