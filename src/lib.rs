// ============================================================================
// docaudit Library
// ============================================================================

pub mod core;
pub mod store;
pub mod batch;
pub mod reconcile;
pub mod config;
pub mod identity;
pub mod replay;
mod audit_log;

// Re-export main types for convenience
pub use audit_log::AuditLog;
pub use batch::{DEFAULT_BATCH_SIZE, run_batched};
pub use config::AuditConfig;
pub use crate::core::{
    AUDIT_RECORD_TYPE, Action, AuditError, AuditRecord, AuditStage, Document, HistoryEntry,
    REVISION_PLACEHOLDER, Result, StoreError, audit_id_for, is_initial_revision,
    revision_generation,
};
pub use identity::{ActorFn, StaticActor, UuidAllocator};
pub use reconcile::{Reconciler, append_history, live_action};

// Re-export collaborator interfaces
pub use store::{
    ActorResolver, AuditRow, AuditStore, BulkOptions, DocResult, IdAllocator, MemoryDocStore,
    PrimaryStore, StoreResult,
};
