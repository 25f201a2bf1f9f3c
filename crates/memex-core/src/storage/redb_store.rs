//! # redb-backed Storage
//!
//! A disk-backed `GraphStore` on the redb embedded database.
//!
//! - Records are postcard-encoded byte values keyed by id
//! - Unique indexes live in their own tables and are checked inside the
//!   same write transaction that inserts the row
//! - Every mutating call is exactly one ACID transaction
//! - Id counters are stored in `metadata` so ids survive reopen

use crate::store::{EdgeFilter, GraphStore, Incident, ensure_same_endpoints};
use crate::{
    Entity, EntityId, Evidence, EvidenceId, MemexError, Relationship, RelationshipId,
    RelationshipKey,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// entity id -> encoded `Entity`
const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// canonical key -> entity id
const ENTITY_KEYS: TableDefinition<&str, u64> = TableDefinition::new("entity_keys");

/// evidence id -> encoded `Evidence`
const EVIDENCE: TableDefinition<u64, &[u8]> = TableDefinition::new("evidence");

/// relationship id -> encoded `Relationship`
const RELATIONSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("relationships");

/// (from, to, rel_type, status) -> relationship id
const RELATIONSHIP_KEYS: TableDefinition<(u64, u64, u8, u8), u64> =
    TableDefinition::new("relationship_keys");

/// (from, relationship id) adjacency
const OUTGOING: TableDefinition<(u64, u64), ()> = TableDefinition::new("outgoing");

/// (to, relationship id) adjacency
const INCOMING: TableDefinition<(u64, u64), ()> = TableDefinition::new("incoming");

/// counter name -> last allocated id
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_ENTITY_ID: &str = "last_entity_id";
const LAST_EVIDENCE_ID: &str = "last_evidence_id";
const LAST_RELATIONSHIP_ID: &str = "last_relationship_id";

type Blob = &'static [u8];

fn storage_err(e: impl std::fmt::Display) -> MemexError {
    MemexError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MemexError> {
    postcard::to_allocvec(value).map_err(|e| MemexError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MemexError> {
    postcard::from_bytes(bytes).map_err(|e| MemexError::Serialization(e.to_string()))
}

fn key_tuple(key: &RelationshipKey) -> (u64, u64, u8, u8) {
    (
        key.from.0,
        key.to.0,
        key.rel_type as u8,
        key.status as u8,
    )
}

fn load<T, R>(table: &R, id: u64) -> Result<Option<T>, MemexError>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, Blob>,
{
    match table.get(id).map_err(storage_err)? {
        Some(data) => Ok(Some(decode(data.value())?)),
        None => Ok(None),
    }
}

fn load_all<T, R>(table: &R) -> Result<Vec<T>, MemexError>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, Blob>,
{
    let mut out = Vec::new();
    for entry in table.iter().map_err(storage_err)? {
        let (_, value) = entry.map_err(storage_err)?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

/// Relationships reachable through one adjacency table for one entity.
fn adjacent<A, R>(
    adjacency: &A,
    relationships: &R,
    entity: EntityId,
    filter: &EdgeFilter,
) -> Result<Vec<Relationship>, MemexError>
where
    A: ReadableTable<(u64, u64), ()>,
    R: ReadableTable<u64, Blob>,
{
    let mut out = Vec::new();
    for entry in adjacency
        .range((entity.0, 0)..=(entity.0, u64::MAX))
        .map_err(storage_err)?
    {
        let (key, _) = entry.map_err(storage_err)?;
        let (_, rel_id) = key.value();
        if let Some(rel) = load::<Relationship, _>(relationships, rel_id)?
            && filter.admits(&rel)
        {
            out.push(rel);
        }
    }
    Ok(out)
}

/// Last allocated ids, mirrored from the `metadata` table.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    entity: u64,
    evidence: u64,
    relationship: u64,
}

/// A disk-backed graph store using redb.
pub struct RedbStore {
    db: Database,
    counters: Counters,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemexError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Create every table up front so readers never see a missing one.
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            write_txn.open_table(ENTITIES).map_err(storage_err)?;
            write_txn.open_table(ENTITY_KEYS).map_err(storage_err)?;
            write_txn.open_table(EVIDENCE).map_err(storage_err)?;
            write_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
            write_txn.open_table(RELATIONSHIP_KEYS).map_err(storage_err)?;
            write_txn.open_table(OUTGOING).map_err(storage_err)?;
            write_txn.open_table(INCOMING).map_err(storage_err)?;
            write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        let counters = {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let meta = read_txn.open_table(METADATA).map_err(storage_err)?;
            let read = |name: &str| -> Result<u64, MemexError> {
                Ok(meta
                    .get(name)
                    .map_err(storage_err)?
                    .map(|v| v.value())
                    .unwrap_or(0))
            };
            Counters {
                entity: read(LAST_ENTITY_ID)?,
                evidence: read(LAST_EVIDENCE_ID)?,
                relationship: read(LAST_RELATIONSHIP_ID)?,
            }
        };

        tracing::debug!(?counters, "opened redb store");
        Ok(Self { db, counters })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), MemexError> {
        self.db.compact().map_err(storage_err)?;
        Ok(())
    }

    fn count(&self, table: TableDefinition<'static, u64, Blob>) -> Result<usize, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        let len = table.len().map_err(storage_err)?;
        usize::try_from(len).map_err(storage_err)
    }

    fn read_one<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, u64, Blob>,
        id: u64,
    ) -> Result<Option<T>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        load(&table, id)
    }

    fn read_all<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, u64, Blob>,
    ) -> Result<Vec<T>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        load_all(&table)
    }

    fn adjacent_one(
        &self,
        adjacency: TableDefinition<'static, (u64, u64), ()>,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let adjacency = read_txn.open_table(adjacency).map_err(storage_err)?;
        let relationships = read_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
        adjacent(&adjacency, &relationships, entity, filter)
    }
}

// =============================================================================
// GRAPHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStore for RedbStore {
    fn entity(&self, id: EntityId) -> Result<Option<Entity>, MemexError> {
        self.read_one(ENTITIES, id.0)
    }

    fn entity_by_key(&self, canonical_key: &str) -> Result<Option<Entity>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let keys = read_txn.open_table(ENTITY_KEYS).map_err(storage_err)?;
        let Some(id) = keys.get(canonical_key).map_err(storage_err)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let entities = read_txn.open_table(ENTITIES).map_err(storage_err)?;
        load(&entities, id)
    }

    fn insert_entity<F>(&mut self, build: F) -> Result<Entity, MemexError>
    where
        F: FnOnce(EntityId) -> Entity,
    {
        let id = EntityId(self.counters.entity.saturating_add(1));
        let entity = build(id);
        let bytes = encode(&entity)?;

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut keys = write_txn.open_table(ENTITY_KEYS).map_err(storage_err)?;
            if keys
                .get(entity.canonical_key.as_str())
                .map_err(storage_err)?
                .is_some()
            {
                return Err(MemexError::Conflict(format!(
                    "canonical key '{}' already exists",
                    entity.canonical_key
                )));
            }
            keys.insert(entity.canonical_key.as_str(), id.0)
                .map_err(storage_err)?;

            let mut entities = write_txn.open_table(ENTITIES).map_err(storage_err)?;
            entities
                .insert(id.0, bytes.as_slice())
                .map_err(storage_err)?;

            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta.insert(LAST_ENTITY_ID, id.0).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        self.counters.entity = id.0;
        Ok(entity)
    }

    fn update_entity(&mut self, entity: &Entity) -> Result<(), MemexError> {
        let bytes = encode(entity)?;
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut entities = write_txn.open_table(ENTITIES).map_err(storage_err)?;
            let stored: Entity = load(&entities, entity.id.0)?
                .ok_or_else(|| MemexError::entity_not_found(entity.id))?;
            if stored.canonical_key != entity.canonical_key {
                return Err(MemexError::Validation(format!(
                    "canonical key of entity {} is immutable",
                    entity.id
                )));
            }
            entities
                .insert(entity.id.0, bytes.as_slice())
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn entities(&self) -> Result<Vec<Entity>, MemexError> {
        self.read_all(ENTITIES)
    }

    fn entity_count(&self) -> Result<usize, MemexError> {
        self.count(ENTITIES)
    }

    fn insert_evidence<F>(&mut self, build: F) -> Result<Evidence, MemexError>
    where
        F: FnOnce(EvidenceId) -> Evidence,
    {
        let id = EvidenceId(self.counters.evidence.saturating_add(1));
        let evidence = build(id);
        let bytes = encode(&evidence)?;

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(EVIDENCE).map_err(storage_err)?;
            table.insert(id.0, bytes.as_slice()).map_err(storage_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta.insert(LAST_EVIDENCE_ID, id.0).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        self.counters.evidence = id.0;
        Ok(evidence)
    }

    fn evidence(&self, id: EvidenceId) -> Result<Option<Evidence>, MemexError> {
        self.read_one(EVIDENCE, id.0)
    }

    fn evidence_count(&self) -> Result<usize, MemexError> {
        self.count(EVIDENCE)
    }

    fn relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, MemexError> {
        self.read_one(RELATIONSHIPS, id.0)
    }

    fn relationship_by_key(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<Relationship>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let keys = read_txn.open_table(RELATIONSHIP_KEYS).map_err(storage_err)?;
        let Some(id) = keys
            .get(key_tuple(key))
            .map_err(storage_err)?
            .map(|v| v.value())
        else {
            return Ok(None);
        };
        let relationships = read_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
        load(&relationships, id)
    }

    fn insert_relationship<F>(&mut self, build: F) -> Result<Relationship, MemexError>
    where
        F: FnOnce(RelationshipId) -> Relationship,
    {
        let id = RelationshipId(self.counters.relationship.saturating_add(1));
        let rel = build(id);
        let key = rel.key();
        let bytes = encode(&rel)?;

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut keys = write_txn.open_table(RELATIONSHIP_KEYS).map_err(storage_err)?;
            if keys.get(key_tuple(&key)).map_err(storage_err)?.is_some() {
                return Err(MemexError::Conflict(format!(
                    "relationship {} already exists",
                    key
                )));
            }
            keys.insert(key_tuple(&key), id.0).map_err(storage_err)?;

            let mut relationships = write_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
            relationships
                .insert(id.0, bytes.as_slice())
                .map_err(storage_err)?;

            let mut outgoing = write_txn.open_table(OUTGOING).map_err(storage_err)?;
            outgoing.insert((rel.from.0, id.0), ()).map_err(storage_err)?;
            let mut incoming = write_txn.open_table(INCOMING).map_err(storage_err)?;
            incoming.insert((rel.to.0, id.0), ()).map_err(storage_err)?;

            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta.insert(LAST_RELATIONSHIP_ID, id.0).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        self.counters.relationship = id.0;
        Ok(rel)
    }

    fn update_relationship(&mut self, rel: &Relationship) -> Result<(), MemexError> {
        let bytes = encode(rel)?;
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut relationships = write_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
            let stored: Relationship = load(&relationships, rel.id.0)?
                .ok_or_else(|| MemexError::relationship_not_found(rel.id))?;
            ensure_same_endpoints(&stored, rel)?;

            let old_key = key_tuple(&stored.key());
            let new_key = key_tuple(&rel.key());
            if old_key != new_key {
                let mut keys = write_txn.open_table(RELATIONSHIP_KEYS).map_err(storage_err)?;
                let holder = keys.get(new_key).map_err(storage_err)?.map(|v| v.value());
                if holder.is_some_and(|h| h != rel.id.0) {
                    return Err(MemexError::Conflict(format!(
                        "relationship {} already exists",
                        rel.key()
                    )));
                }
                keys.remove(old_key).map_err(storage_err)?;
                keys.insert(new_key, rel.id.0).map_err(storage_err)?;
            }

            relationships
                .insert(rel.id.0, bytes.as_slice())
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn remove_relationship(
        &mut self,
        id: RelationshipId,
    ) -> Result<Option<Relationship>, MemexError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let removed = {
            let mut relationships = write_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
            let Some(rel) = load::<Relationship, _>(&relationships, id.0)? else {
                return Ok(None);
            };
            relationships.remove(id.0).map_err(storage_err)?;

            let mut keys = write_txn.open_table(RELATIONSHIP_KEYS).map_err(storage_err)?;
            keys.remove(key_tuple(&rel.key())).map_err(storage_err)?;
            let mut outgoing = write_txn.open_table(OUTGOING).map_err(storage_err)?;
            outgoing.remove((rel.from.0, id.0)).map_err(storage_err)?;
            let mut incoming = write_txn.open_table(INCOMING).map_err(storage_err)?;
            incoming.remove((rel.to.0, id.0)).map_err(storage_err)?;
            rel
        };
        write_txn.commit().map_err(storage_err)?;
        Ok(Some(removed))
    }

    fn outgoing(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        self.adjacent_one(OUTGOING, entity, filter)
    }

    fn incoming(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        self.adjacent_one(INCOMING, entity, filter)
    }

    /// One read transaction for the whole frontier.
    fn incident_batch(
        &self,
        entities: &[EntityId],
        filter: &EdgeFilter,
    ) -> Result<BTreeMap<EntityId, Incident>, MemexError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let relationships = read_txn.open_table(RELATIONSHIPS).map_err(storage_err)?;
        let outgoing = read_txn.open_table(OUTGOING).map_err(storage_err)?;
        let incoming = read_txn.open_table(INCOMING).map_err(storage_err)?;

        let mut out = BTreeMap::new();
        for &entity in entities {
            if out.contains_key(&entity) {
                continue;
            }
            let incident = Incident {
                outgoing: adjacent(&outgoing, &relationships, entity, filter)?,
                incoming: adjacent(&incoming, &relationships, entity, filter)?,
            };
            out.insert(entity, incident);
        }
        Ok(out)
    }

    fn relationships(&self) -> Result<Vec<Relationship>, MemexError> {
        self.read_all(RELATIONSHIPS)
    }

    fn relationship_count(&self) -> Result<usize, MemexError> {
        self.count(RELATIONSHIPS)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        Attributes, Confidence, EntityType, RelStatus, RelType, SourceType, Timestamp,
        canonical_key,
    };
    use tempfile::tempdir;

    fn person(name: &str) -> impl FnOnce(EntityId) -> Entity + '_ {
        move |id| Entity {
            id,
            entity_type: EntityType::Person,
            name: name.to_string(),
            normalized_name: crate::normalize(name),
            canonical_key: canonical_key(EntityType::Person, name),
            attributes: Attributes::new(),
            created_at: Timestamp::from_micros(1),
            updated_at: Timestamp::from_micros(1),
        }
    }

    fn knows(from: EntityId, to: EntityId) -> impl FnOnce(RelationshipId) -> Relationship {
        move |id| Relationship {
            id,
            from,
            to,
            rel_type: RelType::Knows,
            confidence: Confidence::from_basis_points(5_000).expect("valid"),
            status: RelStatus::Active,
            first_seen_at: Timestamp::from_micros(1),
            last_seen_at: Timestamp::from_micros(1),
            evidence_id: None,
            properties: Attributes::new(),
            created_at: Timestamp::from_micros(1),
            updated_at: Timestamp::from_micros(1),
        }
    }

    #[test]
    fn entity_insert_and_lookup() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let nate = store.insert_entity(person("Nate")).expect("insert");
        assert_eq!(nate.id, EntityId(1));
        assert_eq!(store.entity(nate.id).expect("read"), Some(nate.clone()));
        assert_eq!(
            store.entity_by_key("PERSON:nate").expect("read"),
            Some(nate)
        );
        assert_eq!(store.entity_by_key("PERSON:nobody").expect("read"), None);
        assert_eq!(store.entity_count().expect("count"), 1);
    }

    #[test]
    fn duplicate_canonical_key_conflicts_without_burning_an_id() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        store.insert_entity(person("Nate")).expect("insert");
        let err = store.insert_entity(person("NATE")).expect_err("conflict");
        assert!(matches!(err, MemexError::Conflict(_)));

        let next = store.insert_entity(person("Olive")).expect("insert");
        assert_eq!(next.id, EntityId(2));
        assert_eq!(store.entity_count().expect("count"), 2);
    }

    #[test]
    fn update_entity_rejects_key_change() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let mut nate = store.insert_entity(person("Nate")).expect("insert");
        nate.attributes.insert("role".into(), "cfo".into());
        store.update_entity(&nate).expect("update");
        assert_eq!(store.entity(nate.id).expect("read"), Some(nate.clone()));

        nate.canonical_key = "PERSON:someone else".into();
        assert!(matches!(
            store.update_entity(&nate),
            Err(MemexError::Validation(_))
        ));
    }

    #[test]
    fn relationship_status_move_reindexes() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let a = store.insert_entity(person("A")).expect("insert").id;
        let b = store.insert_entity(person("B")).expect("insert").id;

        let mut rel = store.insert_relationship(knows(a, b)).expect("insert");
        let active_key = rel.key();
        rel.status = RelStatus::Contested;
        store.update_relationship(&rel).expect("update");

        assert_eq!(store.relationship_by_key(&active_key).expect("read"), None);
        assert_eq!(
            store
                .relationship_by_key(&active_key.with_status(RelStatus::Contested))
                .expect("read")
                .map(|r| r.id),
            Some(rel.id)
        );

        // A fresh ACTIVE row can now take the vacated slot.
        let fresh = store.insert_relationship(knows(a, b)).expect("insert");
        assert_ne!(fresh.id, rel.id);

        // Moving the fresh row onto the CONTESTED slot collides.
        let mut moved = fresh;
        moved.status = RelStatus::Contested;
        assert!(matches!(
            store.update_relationship(&moved),
            Err(MemexError::Conflict(_))
        ));
    }

    #[test]
    fn incident_batch_splits_directions_and_filters() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let a = store.insert_entity(person("A")).expect("insert").id;
        let b = store.insert_entity(person("B")).expect("insert").id;
        let c = store.insert_entity(person("C")).expect("insert").id;

        store.insert_relationship(knows(a, b)).expect("insert");
        let mut cb = store.insert_relationship(knows(c, b)).expect("insert");
        cb.status = RelStatus::Retracted;
        store.update_relationship(&cb).expect("update");

        let all = store
            .incident_batch(&[b, a, b], &EdgeFilter::any())
            .expect("batch");
        assert_eq!(all.len(), 2);
        assert_eq!(all[&b].incoming.len(), 2);
        assert!(all[&b].outgoing.is_empty());
        assert_eq!(all[&a].outgoing.len(), 1);

        let active = EdgeFilter {
            status: Some(RelStatus::Active),
            ..EdgeFilter::any()
        };
        let filtered = store.incident_batch(&[b], &active).expect("batch");
        assert_eq!(filtered[&b].incoming.len(), 1);
        assert_eq!(filtered[&b].incoming[0].from, a);
    }

    #[test]
    fn remove_relationship_clears_indexes() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let a = store.insert_entity(person("A")).expect("insert").id;
        let b = store.insert_entity(person("B")).expect("insert").id;

        let rel = store.insert_relationship(knows(a, b)).expect("insert");
        let removed = store.remove_relationship(rel.id).expect("remove");
        assert_eq!(removed.map(|r| r.id), Some(rel.id));
        assert_eq!(store.relationship(rel.id).expect("read"), None);
        assert_eq!(store.relationship_by_key(&rel.key()).expect("read"), None);
        assert!(store.outgoing(a, &EdgeFilter::any()).expect("read").is_empty());
        assert!(store.incoming(b, &EdgeFilter::any()).expect("read").is_empty());
        assert_eq!(store.remove_relationship(rel.id).expect("remove"), None);
    }

    #[test]
    fn recovery_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let (a, b, rel_id, ev_id) = {
            let mut store = RedbStore::open(&db_path).expect("open db");
            let a = store.insert_entity(person("A")).expect("insert").id;
            let b = store.insert_entity(person("B")).expect("insert").id;
            let rel = store.insert_relationship(knows(a, b)).expect("insert");
            let ev = store
                .insert_evidence(|id| Evidence {
                    id,
                    source_type: SourceType::Sms,
                    source_id: "msg-1".into(),
                    source_excerpt: "A knows B".into(),
                    created_at: Timestamp::from_micros(1),
                })
                .expect("insert");
            (a, b, rel.id, ev.id)
        };
        // Store dropped here, simulating process exit

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        assert_eq!(store.entity_count().expect("count"), 2);
        assert_eq!(store.relationship_count().expect("count"), 1);
        assert_eq!(store.evidence_count().expect("count"), 1);
        assert_eq!(
            store.evidence(ev_id).expect("read").map(|e| e.source_id),
            Some("msg-1".to_string())
        );
        let out = store.outgoing(a, &EdgeFilter::any()).expect("read");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, rel_id);
        assert_eq!(out[0].to, b);

        // Counters survive, so ids are never reused.
        let c = store.insert_entity(person("C")).expect("insert");
        assert_eq!(c.id, EntityId(3));
        let rel2 = store.insert_relationship(knows(b, c.id)).expect("insert");
        assert_eq!(rel2.id, RelationshipId(2));
    }

    #[test]
    fn recovery_multiple_reopen_cycles() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        for cycle in 1..=3u64 {
            let mut store = RedbStore::open(&db_path).expect("open db");
            let name = format!("person {}", cycle);
            let e = store.insert_entity(person(&name)).expect("insert");
            assert_eq!(e.id, EntityId(cycle));
        }

        let mut store = RedbStore::open(&db_path).expect("open db");
        assert_eq!(store.entity_count().expect("count"), 3);
        store.compact().expect("compact");
        assert_eq!(store.entities().expect("read").len(), 3);
    }
}
