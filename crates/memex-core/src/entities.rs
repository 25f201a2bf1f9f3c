//! # Entity Store
//!
//! Idempotent upsert keyed by canonical key, with shallow attribute merge.
//! The display `name` and the identity are fixed by the first observation.

use crate::canonical::{canonical_key, normalize};
use crate::clock::Clock;
use crate::engine::{KnowledgeGraph, Upserted};
use crate::ingestor::{validate_attributes, validate_name};
use crate::store::GraphStore;
use crate::{Attributes, Entity, EntityId, EntityType, MemexError};

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Resolve `(entity_type, name)` to an entity id, creating the row on
    /// first sight and merging `attributes` into it afterwards.
    pub fn upsert_entity(
        &mut self,
        entity_type: EntityType,
        name: &str,
        attributes: Attributes,
    ) -> Result<EntityId, MemexError> {
        self.merge_entity(entity_type, name, attributes)
            .map(|u| u.record.id)
    }

    /// Lookup by id. Absence is `Ok(None)`.
    pub fn entity(&self, id: EntityId) -> Result<Option<Entity>, MemexError> {
        self.store.entity(id)
    }

    /// Lookup by `(type, raw name)` through the canonical key.
    pub fn find_entity(
        &self,
        entity_type: EntityType,
        name: &str,
    ) -> Result<Option<Entity>, MemexError> {
        self.store.entity_by_key(&canonical_key(entity_type, name))
    }

    /// Best-effort substring search over normalized and display names.
    ///
    /// Exact normalized matches come first, then id order. `limit` is
    /// clamped to `1..=max_search_limit`.
    pub fn search_entities(&self, query: &str, limit: usize) -> Result<Vec<Entity>, MemexError> {
        let needle = normalize(query);
        let raw = query.trim().to_lowercase();
        if needle.is_empty() && raw.is_empty() {
            return Err(MemexError::Validation("search query is empty".into()));
        }
        let limit = limit.clamp(1, self.config.max_search_limit.max(1));

        let mut hits: Vec<Entity> = self
            .store
            .entities()?
            .into_iter()
            .filter(|e| {
                (!needle.is_empty() && e.normalized_name.contains(&needle))
                    || e.name.to_lowercase().contains(&raw)
            })
            .collect();
        hits.sort_by_key(|e| (e.normalized_name != needle, e.id));
        hits.truncate(limit);
        Ok(hits)
    }

    pub(crate) fn merge_entity(
        &mut self,
        entity_type: EntityType,
        name: &str,
        attributes: Attributes,
    ) -> Result<Upserted<Entity>, MemexError> {
        validate_name(name)?;
        validate_attributes(&attributes)?;

        let key = canonical_key(entity_type, name);
        if let Some(existing) = self.store.entity_by_key(&key)? {
            return self.merge_attributes(existing, attributes).map(Upserted::merged);
        }

        let now = self.now();
        let normalized = normalize(name);
        let inserted = self.store.insert_entity(|id| Entity {
            id,
            entity_type,
            name: name.trim().to_string(),
            normalized_name: normalized,
            canonical_key: key.clone(),
            attributes: attributes.clone(),
            created_at: now,
            updated_at: now,
        });

        match inserted {
            Ok(entity) => {
                tracing::info!(
                    entity_id = entity.id.0,
                    canonical_key = %entity.canonical_key,
                    "entity created"
                );
                Ok(Upserted::created(entity))
            }
            Err(MemexError::Conflict(_)) => {
                // Another writer took the key first; merge into its row.
                let existing = self.store.entity_by_key(&key)?.ok_or_else(|| {
                    MemexError::Conflict(format!("canonical key '{}' is contended", key))
                })?;
                self.merge_attributes(existing, attributes)
                    .map(Upserted::merged)
            }
            Err(e) => Err(e),
        }
    }

    fn merge_attributes(
        &mut self,
        mut entity: Entity,
        attributes: Attributes,
    ) -> Result<Entity, MemexError> {
        let merged_keys = attributes.len();
        entity.attributes.extend(attributes);
        validate_attributes(&entity.attributes)?;
        entity.updated_at = self.now_after(entity.updated_at);
        self.store.update_entity(&entity)?;

        tracing::debug!(
            entity_id = entity.id.0,
            canonical_key = %entity.canonical_key,
            merged_keys,
            "entity merged"
        );
        Ok(entity)
    }
}
