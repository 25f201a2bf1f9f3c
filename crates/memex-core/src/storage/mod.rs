//! # Storage Backends
//!
//! `StorageBackend` picks between the volatile `MemoryStore` and the
//! disk-backed `RedbStore` at open time and forwards every `GraphStore`
//! call to whichever it holds.

mod redb_store;

pub use redb_store::RedbStore;

use crate::memory::MemoryStore;
use crate::store::{EdgeFilter, GraphStore, Incident};
use crate::{
    Entity, EntityId, Evidence, EvidenceId, MemexError, RelStatus, Relationship, RelationshipId,
    RelationshipKey,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend chosen at startup.
#[derive(Debug)]
pub enum StorageBackend {
    /// BTreeMap tables (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// A fresh in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open or create a redb database at `path`.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, MemexError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::InMemory($store) => $call,
            StorageBackend::Persistent($store) => $call,
        }
    };
}

impl GraphStore for StorageBackend {
    fn entity(&self, id: EntityId) -> Result<Option<Entity>, MemexError> {
        delegate!(self, s => s.entity(id))
    }

    fn entity_by_key(&self, canonical_key: &str) -> Result<Option<Entity>, MemexError> {
        delegate!(self, s => s.entity_by_key(canonical_key))
    }

    fn insert_entity<F>(&mut self, build: F) -> Result<Entity, MemexError>
    where
        F: FnOnce(EntityId) -> Entity,
    {
        delegate!(self, s => s.insert_entity(build))
    }

    fn update_entity(&mut self, entity: &Entity) -> Result<(), MemexError> {
        delegate!(self, s => s.update_entity(entity))
    }

    fn entities(&self) -> Result<Vec<Entity>, MemexError> {
        delegate!(self, s => s.entities())
    }

    fn entity_count(&self) -> Result<usize, MemexError> {
        delegate!(self, s => s.entity_count())
    }

    fn insert_evidence<F>(&mut self, build: F) -> Result<Evidence, MemexError>
    where
        F: FnOnce(EvidenceId) -> Evidence,
    {
        delegate!(self, s => s.insert_evidence(build))
    }

    fn evidence(&self, id: EvidenceId) -> Result<Option<Evidence>, MemexError> {
        delegate!(self, s => s.evidence(id))
    }

    fn evidence_count(&self) -> Result<usize, MemexError> {
        delegate!(self, s => s.evidence_count())
    }

    fn relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, MemexError> {
        delegate!(self, s => s.relationship(id))
    }

    fn relationship_by_key(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<Relationship>, MemexError> {
        delegate!(self, s => s.relationship_by_key(key))
    }

    fn insert_relationship<F>(&mut self, build: F) -> Result<Relationship, MemexError>
    where
        F: FnOnce(RelationshipId) -> Relationship,
    {
        delegate!(self, s => s.insert_relationship(build))
    }

    fn update_relationship(&mut self, rel: &Relationship) -> Result<(), MemexError> {
        delegate!(self, s => s.update_relationship(rel))
    }

    fn remove_relationship(
        &mut self,
        id: RelationshipId,
    ) -> Result<Option<Relationship>, MemexError> {
        delegate!(self, s => s.remove_relationship(id))
    }

    fn outgoing(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        delegate!(self, s => s.outgoing(entity, filter))
    }

    fn incoming(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        delegate!(self, s => s.incoming(entity, filter))
    }

    fn incident_batch(
        &self,
        entities: &[EntityId],
        filter: &EdgeFilter,
    ) -> Result<BTreeMap<EntityId, Incident>, MemexError> {
        delegate!(self, s => s.incident_batch(entities, filter))
    }

    fn relationships(&self) -> Result<Vec<Relationship>, MemexError> {
        delegate!(self, s => s.relationships())
    }

    fn relationships_with_status(
        &self,
        status: RelStatus,
    ) -> Result<Vec<Relationship>, MemexError> {
        delegate!(self, s => s.relationships_with_status(status))
    }

    fn relationship_count(&self) -> Result<usize, MemexError> {
        delegate!(self, s => s.relationship_count())
    }
}
