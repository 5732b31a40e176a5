pub mod error;
pub mod types;

pub use error::{AuditError, AuditStage, Result, StoreError};
pub use types::{
    AUDIT_RECORD_TYPE, Action, AuditRecord, Document, HistoryEntry, REVISION_PLACEHOLDER,
    audit_id_for, is_initial_revision, revision_generation,
};
