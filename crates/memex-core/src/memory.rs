//! # In-Memory Store
//!
//! A `GraphStore` over `BTreeMap` tables. Volatile, deterministic, and the
//! backend used by tests.

use crate::store::{EdgeFilter, GraphStore, ensure_same_endpoints};
use crate::{
    Entity, EntityId, Evidence, EvidenceId, MemexError, Relationship, RelationshipId,
    RelationshipKey,
};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory tables and indexes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: BTreeMap<EntityId, Entity>,
    /// Unique index: canonical key -> entity.
    entity_keys: BTreeMap<String, EntityId>,

    evidence: BTreeMap<EvidenceId, Evidence>,

    relationships: BTreeMap<RelationshipId, Relationship>,
    /// Unique index: (from, to, type, status) -> relationship.
    relationship_keys: BTreeMap<RelationshipKey, RelationshipId>,
    /// Adjacency: from -> relationship ids.
    outgoing: BTreeMap<EntityId, BTreeSet<RelationshipId>>,
    /// Adjacency: to -> relationship ids.
    incoming: BTreeMap<EntityId, BTreeSet<RelationshipId>>,

    last_entity_id: u64,
    last_evidence_id: u64,
    last_relationship_id: u64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_adjacent(
        &self,
        ids: Option<&BTreeSet<RelationshipId>>,
        filter: &EdgeFilter,
    ) -> Vec<Relationship> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
            .filter(|r| filter.admits(r))
            .cloned()
            .collect()
    }
}

impl GraphStore for MemoryStore {
    fn entity(&self, id: EntityId) -> Result<Option<Entity>, MemexError> {
        Ok(self.entities.get(&id).cloned())
    }

    fn entity_by_key(&self, canonical_key: &str) -> Result<Option<Entity>, MemexError> {
        Ok(self
            .entity_keys
            .get(canonical_key)
            .and_then(|id| self.entities.get(id))
            .cloned())
    }

    fn insert_entity<F>(&mut self, build: F) -> Result<Entity, MemexError>
    where
        F: FnOnce(EntityId) -> Entity,
    {
        let id = EntityId(self.last_entity_id.saturating_add(1));
        let entity = build(id);

        if self.entity_keys.contains_key(&entity.canonical_key) {
            return Err(MemexError::Conflict(format!(
                "canonical key '{}' already exists",
                entity.canonical_key
            )));
        }

        self.last_entity_id = id.0;
        self.entity_keys.insert(entity.canonical_key.clone(), id);
        self.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn update_entity(&mut self, entity: &Entity) -> Result<(), MemexError> {
        let stored = self
            .entities
            .get_mut(&entity.id)
            .ok_or_else(|| MemexError::entity_not_found(entity.id))?;

        if stored.canonical_key != entity.canonical_key {
            return Err(MemexError::Validation(format!(
                "canonical key of entity {} is immutable",
                entity.id
            )));
        }

        *stored = entity.clone();
        Ok(())
    }

    fn entities(&self) -> Result<Vec<Entity>, MemexError> {
        Ok(self.entities.values().cloned().collect())
    }

    fn entity_count(&self) -> Result<usize, MemexError> {
        Ok(self.entities.len())
    }

    fn insert_evidence<F>(&mut self, build: F) -> Result<Evidence, MemexError>
    where
        F: FnOnce(EvidenceId) -> Evidence,
    {
        let id = EvidenceId(self.last_evidence_id.saturating_add(1));
        let evidence = build(id);
        self.last_evidence_id = id.0;
        self.evidence.insert(id, evidence.clone());
        Ok(evidence)
    }

    fn evidence(&self, id: EvidenceId) -> Result<Option<Evidence>, MemexError> {
        Ok(self.evidence.get(&id).cloned())
    }

    fn evidence_count(&self) -> Result<usize, MemexError> {
        Ok(self.evidence.len())
    }

    fn relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, MemexError> {
        Ok(self.relationships.get(&id).cloned())
    }

    fn relationship_by_key(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<Relationship>, MemexError> {
        Ok(self
            .relationship_keys
            .get(key)
            .and_then(|id| self.relationships.get(id))
            .cloned())
    }

    fn insert_relationship<F>(&mut self, build: F) -> Result<Relationship, MemexError>
    where
        F: FnOnce(RelationshipId) -> Relationship,
    {
        let id = RelationshipId(self.last_relationship_id.saturating_add(1));
        let rel = build(id);
        let key = rel.key();

        if self.relationship_keys.contains_key(&key) {
            return Err(MemexError::Conflict(format!(
                "relationship {} already exists",
                key
            )));
        }

        self.last_relationship_id = id.0;
        self.relationship_keys.insert(key, id);
        self.outgoing.entry(rel.from).or_default().insert(id);
        self.incoming.entry(rel.to).or_default().insert(id);
        self.relationships.insert(id, rel.clone());
        Ok(rel)
    }

    fn update_relationship(&mut self, rel: &Relationship) -> Result<(), MemexError> {
        let stored = self
            .relationships
            .get(&rel.id)
            .ok_or_else(|| MemexError::relationship_not_found(rel.id))?;
        ensure_same_endpoints(stored, rel)?;

        let old_key = stored.key();
        let new_key = rel.key();
        if old_key != new_key {
            let occupied = self
                .relationship_keys
                .get(&new_key)
                .is_some_and(|holder| *holder != rel.id);
            if occupied {
                return Err(MemexError::Conflict(format!(
                    "relationship {} already exists",
                    new_key
                )));
            }
            self.relationship_keys.remove(&old_key);
            self.relationship_keys.insert(new_key, rel.id);
        }

        self.relationships.insert(rel.id, rel.clone());
        Ok(())
    }

    fn remove_relationship(
        &mut self,
        id: RelationshipId,
    ) -> Result<Option<Relationship>, MemexError> {
        let Some(rel) = self.relationships.remove(&id) else {
            return Ok(None);
        };
        self.relationship_keys.remove(&rel.key());
        if let Some(ids) = self.outgoing.get_mut(&rel.from) {
            ids.remove(&id);
        }
        if let Some(ids) = self.incoming.get_mut(&rel.to) {
            ids.remove(&id);
        }
        Ok(Some(rel))
    }

    fn outgoing(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        Ok(self.collect_adjacent(self.outgoing.get(&entity), filter))
    }

    fn incoming(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        Ok(self.collect_adjacent(self.incoming.get(&entity), filter))
    }

    fn relationships(&self) -> Result<Vec<Relationship>, MemexError> {
        Ok(self.relationships.values().cloned().collect())
    }

    fn relationship_count(&self) -> Result<usize, MemexError> {
        Ok(self.relationships.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
