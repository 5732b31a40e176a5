use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Revision value stored in a snapshot whose post-write revision is not known yet.
pub const REVISION_PLACEHOLDER: &str = "current";

/// `type` tag carried by every audit document.
pub const AUDIT_RECORD_TYPE: &str = "audit_record";

const AUDIT_ID_SUFFIX: &str = "-audit";

/// Derives the audit document id for a primary document id.
pub fn audit_id_for(primary_id: &str) -> String {
    format!("{}{}", primary_id, AUDIT_ID_SUFFIX)
}

/// Generation number of a revision token (`"3-abc"` -> `3`).
///
/// Returns `None` for tokens without a numeric generation prefix.
pub fn revision_generation(rev: &str) -> Option<u64> {
    let (generation, _) = rev.split_once('-')?;
    generation.parse().ok()
}

/// True when the token names the first revision ever written for a document.
pub fn is_initial_revision(rev: &str) -> bool {
    revision_generation(rev) == Some(1)
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A caller-owned document in the primary store.
///
/// Store metadata lives in the underscore fields; everything else is kept
/// verbatim in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document from a JSON object, lifting `_id`, `_rev` and `_deleted`.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn mark_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// True when the document carries a revision that is not its first one.
    pub fn has_unaudited_revisions(&self) -> bool {
        self.rev.as_deref().is_some_and(|rev| !is_initial_revision(rev))
    }

    /// Shallow copy with the revision replaced by [`REVISION_PLACEHOLDER`].
    pub fn snapshot(&self) -> Self {
        let mut copy = self.clone();
        copy.rev = Some(REVISION_PLACEHOLDER.to_string());
        copy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// One line of a document's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: Action,
    /// Acting user; `None` for entries synthesized during backfill.
    #[serde(rename = "user")]
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "doc")]
    pub snapshot: Document,
}

/// Companion document holding the full history of one primary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl AuditRecord {
    /// Empty audit record for the given primary document id.
    pub fn for_primary(primary_id: &str) -> Self {
        Self {
            id: audit_id_for(primary_id),
            rev: None,
            kind: AUDIT_RECORD_TYPE.to_string(),
            history: Vec::new(),
        }
    }

    /// Primary document id this record belongs to.
    pub fn primary_id(&self) -> &str {
        self.id.strip_suffix(AUDIT_ID_SUFFIX).unwrap_or(&self.id)
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.history.iter().map(|entry| entry.action).collect()
    }
}
