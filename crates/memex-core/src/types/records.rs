//! Persisted record shapes.

use super::{
    Attributes, Confidence, EntityId, EntityType, EvidenceId, RelStatus, RelType, RelationshipId,
    SourceType, Timestamp,
};
use serde::{Deserialize, Serialize};

/// A resolved real-world thing.
///
/// `canonical_key` is the identity: it is unique across the store and never
/// changes after creation. `name` is the display form from the first
/// observation. Only `attributes` and `updated_at` change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub name: String,
    pub normalized_name: String,
    pub canonical_key: String,
    pub attributes: Attributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A provenance log entry. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_excerpt: String,
    pub created_at: Timestamp,
}

/// A directed, typed claim between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub from: EntityId,
    pub to: EntityId,
    pub rel_type: RelType,
    pub confidence: Confidence,
    pub status: RelStatus,
    pub first_seen_at: Timestamp,
    pub last_seen_at: Timestamp,
    /// Most recent supporting evidence. A weak reference: the row it names
    /// may be gone.
    pub evidence_id: Option<EvidenceId>,
    pub properties: Attributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Relationship {
    /// The unique-index key of this row.
    #[must_use]
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            from: self.from,
            to: self.to,
            rel_type: self.rel_type,
            status: self.status,
        }
    }

    /// The endpoint that is not `entity`. For a self-loop this is `entity`.
    #[must_use]
    pub fn other_end(&self, entity: EntityId) -> EntityId {
        if self.from == entity {
            self.to
        } else {
            self.from
        }
    }
}

/// `(from, to, rel_type, status)`: no two relationship rows share all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub from: EntityId,
    pub to: EntityId,
    pub rel_type: RelType,
    pub status: RelStatus,
}

impl RelationshipKey {
    /// The same claim under a different status.
    #[must_use]
    pub fn with_status(self, status: RelStatus) -> Self {
        Self { status, ..self }
    }
}

impl std::fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({} -[{}]-> {}, {})",
            self.from, self.rel_type, self.to, self.status
        )
    }
}
