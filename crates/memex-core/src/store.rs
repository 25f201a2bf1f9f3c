//! # Storage Seam
//!
//! The `GraphStore` trait is the repository the engine is handed at
//! construction. It is plain CRUD over three tables plus two unique
//! indexes:
//!
//! - entities by `canonical_key`
//! - relationships by `(from, to, rel_type, status)`
//!
//! Inserting a row whose unique key is already held fails with
//! `MemexError::Conflict`. The engine reads that as "someone got there
//! first" and retries the write as an update.
//!
//! All fallible operations return `Result<T, MemexError>` so in-memory and
//! persistent backends are interchangeable.

use crate::{
    Confidence, Entity, EntityId, Evidence, EvidenceId, MemexError, RelStatus, Relationship,
    RelationshipId, RelationshipKey,
};
use std::collections::BTreeMap;

// =============================================================================
// EDGE FILTER
// =============================================================================

/// Per-direction filter applied by adjacency queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    /// Keep only rows with exactly this status. `None` keeps every status.
    pub status: Option<RelStatus>,
    /// Keep only rows with `confidence >= min_confidence`.
    pub min_confidence: Option<Confidence>,
}

impl EdgeFilter {
    /// A filter that keeps everything.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            status: None,
            min_confidence: None,
        }
    }

    /// Whether `rel` passes this filter.
    #[must_use]
    pub fn admits(&self, rel: &Relationship) -> bool {
        self.status.is_none_or(|s| rel.status == s)
            && self.min_confidence.is_none_or(|c| rel.confidence >= c)
    }
}

/// Relationships touching one entity, split by direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Incident {
    /// Rows where the entity is `from`.
    pub outgoing: Vec<Relationship>,
    /// Rows where the entity is `to`.
    pub incoming: Vec<Relationship>,
}

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// Keyed storage for entities, evidence and relationships.
///
/// Row ids are allocated by the store, monotonically, and never reused.
/// Insert methods hand the freshly allocated id to a builder closure so the
/// row is constructed and written in one step.
pub trait GraphStore {
    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Lookup an entity by id.
    fn entity(&self, id: EntityId) -> Result<Option<Entity>, MemexError>;

    /// Lookup an entity through the canonical-key index.
    fn entity_by_key(&self, canonical_key: &str) -> Result<Option<Entity>, MemexError>;

    /// Insert a new entity.
    ///
    /// Fails with `Conflict` if the built row's `canonical_key` is taken.
    fn insert_entity<F>(&mut self, build: F) -> Result<Entity, MemexError>
    where
        F: FnOnce(EntityId) -> Entity;

    /// Overwrite an existing entity row.
    ///
    /// The canonical key is immutable; a changed key is a `Validation` error.
    fn update_entity(&mut self, entity: &Entity) -> Result<(), MemexError>;

    /// All entities in id order.
    fn entities(&self) -> Result<Vec<Entity>, MemexError>;

    /// Number of entity rows.
    fn entity_count(&self) -> Result<usize, MemexError>;

    // -------------------------------------------------------------------------
    // Evidence
    // -------------------------------------------------------------------------

    /// Append an evidence row. Evidence is never deduplicated.
    fn insert_evidence<F>(&mut self, build: F) -> Result<Evidence, MemexError>
    where
        F: FnOnce(EvidenceId) -> Evidence;

    /// Lookup evidence by id.
    fn evidence(&self, id: EvidenceId) -> Result<Option<Evidence>, MemexError>;

    /// Number of evidence rows.
    fn evidence_count(&self) -> Result<usize, MemexError>;

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    /// Lookup a relationship by id.
    fn relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, MemexError>;

    /// Lookup a relationship through the `(from, to, type, status)` index.
    fn relationship_by_key(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<Relationship>, MemexError>;

    /// Insert a new relationship.
    ///
    /// Fails with `Conflict` if the built row's key is taken.
    fn insert_relationship<F>(&mut self, build: F) -> Result<Relationship, MemexError>
    where
        F: FnOnce(RelationshipId) -> Relationship;

    /// Overwrite an existing relationship row, moving its index entry if
    /// the status changed.
    ///
    /// Endpoints and type are immutable. Fails with `Conflict` if the new
    /// key is held by a different row and with `NotFound` if the row is
    /// gone.
    fn update_relationship(&mut self, rel: &Relationship) -> Result<(), MemexError>;

    /// Delete a relationship row and its index entries.
    fn remove_relationship(
        &mut self,
        id: RelationshipId,
    ) -> Result<Option<Relationship>, MemexError>;

    /// Rows where `entity` is `from`, filtered.
    fn outgoing(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError>;

    /// Rows where `entity` is `to`, filtered.
    fn incoming(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError>;

    /// Outgoing and incoming rows for a whole traversal frontier.
    ///
    /// Backends that can answer in one round-trip override this.
    fn incident_batch(
        &self,
        entities: &[EntityId],
        filter: &EdgeFilter,
    ) -> Result<BTreeMap<EntityId, Incident>, MemexError> {
        let mut out = BTreeMap::new();
        for &entity in entities {
            if out.contains_key(&entity) {
                continue;
            }
            let incident = Incident {
                outgoing: self.outgoing(entity, filter)?,
                incoming: self.incoming(entity, filter)?,
            };
            out.insert(entity, incident);
        }
        Ok(out)
    }

    /// All relationships in id order.
    fn relationships(&self) -> Result<Vec<Relationship>, MemexError>;

    /// All relationships with the given status, in id order.
    fn relationships_with_status(
        &self,
        status: RelStatus,
    ) -> Result<Vec<Relationship>, MemexError> {
        Ok(self
            .relationships()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Number of relationship rows.
    fn relationship_count(&self) -> Result<usize, MemexError>;
}

/// Reject changes to a relationship's identity fields.
pub(crate) fn ensure_same_endpoints(
    stored: &Relationship,
    next: &Relationship,
) -> Result<(), MemexError> {
    if stored.from != next.from || stored.to != next.to || stored.rel_type != next.rel_type {
        return Err(MemexError::Validation(format!(
            "relationship {} endpoints and type are immutable",
            stored.id
        )));
    }
    Ok(())
}
