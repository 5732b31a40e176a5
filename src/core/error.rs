use thiserror::Error;

/// Failure reported by a store collaborator (primary store, audit store,
/// identifier allocator or actor resolver).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document '{0}' not found")]
    NotFound(String),

    #[error("Document update conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Stage of an audited call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStage {
    ActorResolution,
    ExistingAuditFetch,
    IdentifierAllocation,
    AuditPersist,
    PrimaryMutation,
    Validation,
}

/// Terminal error of one audited call.
///
/// Every variant names the stage that failed. A failure while fetching the
/// prior state of a document during backfill never shows up here: it is
/// recovered inside reconciliation.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Actor resolution failed: {0}")]
    ActorResolution(#[source] StoreError),

    #[error("Fetching existing audit records failed: {0}")]
    ExistingAuditFetch(#[source] StoreError),

    #[error("Identifier allocation failed: {0}")]
    IdentifierAllocation(#[source] StoreError),

    #[error("Persisting audit records failed: {0}")]
    AuditPersist(#[source] StoreError),

    #[error("Primary store mutation failed: {0}")]
    PrimaryMutation(#[source] StoreError),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuditError {
    pub fn stage(&self) -> AuditStage {
        match self {
            Self::ActorResolution(_) => AuditStage::ActorResolution,
            Self::ExistingAuditFetch(_) => AuditStage::ExistingAuditFetch,
            Self::IdentifierAllocation(_) => AuditStage::IdentifierAllocation,
            Self::AuditPersist(_) => AuditStage::AuditPersist,
            Self::PrimaryMutation(_) => AuditStage::PrimaryMutation,
            Self::InvalidDocument(_) | Self::Config(_) => AuditStage::Validation,
        }
    }

    /// The collaborator error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::ActorResolution(err)
            | Self::ExistingAuditFetch(err)
            | Self::IdentifierAllocation(err)
            | Self::AuditPersist(err)
            | Self::PrimaryMutation(err) => Some(err),
            Self::InvalidDocument(_) | Self::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
