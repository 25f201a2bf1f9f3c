//! # Ingestor Module
//!
//! Input validation and batch ingestion of extracted facts.
//!
//! - Validate every fact before the graph is touched
//! - Reject unknown enum spellings, oversized fields and dangling references
//! - Apply in order: entities, evidence, relationships

use crate::canonical::{canonical_key, normalize};
use crate::clock::Clock;
use crate::engine::KnowledgeGraph;
use crate::primitives::{
    MAX_ATTRIBUTE_KEYS, MAX_BATCH_FACTS, MAX_EXCERPT_LENGTH, MAX_NAME_LENGTH,
    MAX_SOURCE_ID_LENGTH,
};
use crate::relationships::RelationshipClaim;
use crate::store::GraphStore;
use crate::{
    Attributes, Confidence, EntityId, EntityType, EvidenceId, MemexError, RelStatus, RelType,
    RelationshipId, SourceType,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FIELD VALIDATION
// =============================================================================

/// Names must normalize to something and fit `MAX_NAME_LENGTH` bytes.
pub(crate) fn validate_name(name: &str) -> Result<(), MemexError> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(MemexError::Validation(format!(
            "name exceeds {} bytes",
            MAX_NAME_LENGTH
        )));
    }
    if normalize(name).is_empty() {
        return Err(MemexError::Validation(format!(
            "name '{}' is empty after normalization",
            name
        )));
    }
    Ok(())
}

pub(crate) fn validate_attributes(attributes: &Attributes) -> Result<(), MemexError> {
    if attributes.len() > MAX_ATTRIBUTE_KEYS {
        return Err(MemexError::Validation(format!(
            "{} keys exceeds the limit of {}",
            attributes.len(),
            MAX_ATTRIBUTE_KEYS
        )));
    }
    Ok(())
}

pub(crate) fn validate_evidence(source_id: &str, excerpt: &str) -> Result<(), MemexError> {
    if source_id.trim().is_empty() {
        return Err(MemexError::Validation("source id is empty".into()));
    }
    if source_id.len() > MAX_SOURCE_ID_LENGTH {
        return Err(MemexError::Validation(format!(
            "source id exceeds {} bytes",
            MAX_SOURCE_ID_LENGTH
        )));
    }
    if excerpt.len() > MAX_EXCERPT_LENGTH {
        return Err(MemexError::Validation(format!(
            "excerpt exceeds {} bytes",
            MAX_EXCERPT_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// FACT BATCHES
// =============================================================================

/// An entity mention from the extraction layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityFact {
    pub entity_type: String,
    pub name: String,
    pub attributes: Attributes,
}

/// A provenance item. `label` is local to the batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvidenceFact {
    pub label: String,
    pub source_type: String,
    pub source_id: String,
    pub excerpt: String,
}

/// Reference to an entity by type and raw name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRef {
    pub entity_type: String,
    pub name: String,
}

/// A relationship observation between two referenced entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationshipFact {
    pub from: EntityRef,
    pub to: EntityRef,
    pub rel_type: String,
    /// Unit-interval confidence.
    pub confidence: f64,
    /// Defaults to ACTIVE.
    pub status: Option<String>,
    /// Label of an evidence item in the same batch.
    pub evidence: Option<String>,
    pub properties: Option<Attributes>,
}

/// Facts handed over by the extraction layer in one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FactBatch {
    pub entities: Vec<EntityFact>,
    pub evidence: Vec<EvidenceFact>,
    pub relationships: Vec<RelationshipFact>,
}

impl FactBatch {
    /// Total number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + self.evidence.len() + self.relationships.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What `ingest_batch` did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// One id per entity fact, in batch order.
    pub entity_ids: Vec<EntityId>,
    /// Evidence ids by batch label.
    pub evidence_ids: BTreeMap<String, EvidenceId>,
    /// One id per relationship fact, in batch order.
    pub relationship_ids: Vec<RelationshipId>,
    pub entities_created: usize,
    pub entities_merged: usize,
    pub relationships_created: usize,
    pub relationships_reinforced: usize,
}

struct CheckedEntity<'a> {
    entity_type: EntityType,
    name: &'a str,
    attributes: &'a Attributes,
}

struct CheckedEvidence<'a> {
    label: &'a str,
    source_type: SourceType,
    source_id: &'a str,
    excerpt: &'a str,
}

struct CheckedRelationship<'a> {
    from_key: String,
    to_key: String,
    rel_type: RelType,
    confidence: Confidence,
    status: RelStatus,
    evidence: Option<&'a str>,
    properties: Option<&'a Attributes>,
}

struct CheckedBatch<'a> {
    entities: Vec<CheckedEntity<'a>>,
    evidence: Vec<CheckedEvidence<'a>>,
    relationships: Vec<CheckedRelationship<'a>>,
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Validate a whole batch, then apply it.
    ///
    /// Nothing is written if any fact is invalid. Relationship endpoints
    /// must be entities of the batch or already stored.
    pub fn ingest_batch(&mut self, batch: &FactBatch) -> Result<IngestReport, MemexError> {
        let checked = self.check_batch(batch)?;
        let mut report = IngestReport::default();

        let mut resolved: BTreeMap<String, EntityId> = BTreeMap::new();
        for fact in &checked.entities {
            let upserted =
                self.merge_entity(fact.entity_type, fact.name, fact.attributes.clone())?;
            if upserted.created {
                report.entities_created += 1;
            } else {
                report.entities_merged += 1;
            }
            resolved.insert(upserted.record.canonical_key.clone(), upserted.record.id);
            report.entity_ids.push(upserted.record.id);
        }

        for fact in &checked.evidence {
            let id = self.upsert_evidence(fact.source_type, fact.source_id, fact.excerpt)?;
            report.evidence_ids.insert(fact.label.to_string(), id);
        }

        for fact in &checked.relationships {
            let from = self.resolve_ref(&resolved, &fact.from_key)?;
            let to = self.resolve_ref(&resolved, &fact.to_key)?;
            let mut claim = RelationshipClaim::new(from, to, fact.rel_type, fact.confidence)
                .with_status(fact.status);
            if let Some(id) = fact.evidence.and_then(|l| report.evidence_ids.get(l)) {
                claim = claim.with_evidence(*id);
            }
            if let Some(properties) = fact.properties {
                claim = claim.with_properties(properties.clone());
            }

            let upserted = self.record_claim(claim)?;
            if upserted.created {
                report.relationships_created += 1;
            } else {
                report.relationships_reinforced += 1;
            }
            report.relationship_ids.push(upserted.record.id);
        }

        tracing::info!(
            entities = report.entity_ids.len(),
            evidence = report.evidence_ids.len(),
            relationships = report.relationship_ids.len(),
            "fact batch ingested"
        );
        Ok(report)
    }

    fn resolve_ref(
        &self,
        resolved: &BTreeMap<String, EntityId>,
        key: &str,
    ) -> Result<EntityId, MemexError> {
        if let Some(id) = resolved.get(key) {
            return Ok(*id);
        }
        self.store
            .entity_by_key(key)?
            .map(|e| e.id)
            .ok_or_else(|| MemexError::Validation(format!("unknown entity '{}'", key)))
    }

    fn check_batch<'a>(&self, batch: &'a FactBatch) -> Result<CheckedBatch<'a>, MemexError> {
        if batch.len() > MAX_BATCH_FACTS {
            return Err(MemexError::Validation(format!(
                "batch of {} facts exceeds the limit of {}",
                batch.len(),
                MAX_BATCH_FACTS
            )));
        }

        let mut known_keys: BTreeSet<String> = BTreeSet::new();
        let mut entities = Vec::with_capacity(batch.entities.len());
        for (i, fact) in batch.entities.iter().enumerate() {
            let entity_type: EntityType = fact
                .entity_type
                .parse()
                .map_err(|e| at("entities", i, e))?;
            validate_name(&fact.name).map_err(|e| at("entities", i, e))?;
            validate_attributes(&fact.attributes).map_err(|e| at("entities", i, e))?;
            known_keys.insert(canonical_key(entity_type, &fact.name));
            entities.push(CheckedEntity {
                entity_type,
                name: &fact.name,
                attributes: &fact.attributes,
            });
        }

        let mut labels: BTreeSet<&str> = BTreeSet::new();
        let mut evidence = Vec::with_capacity(batch.evidence.len());
        for (i, fact) in batch.evidence.iter().enumerate() {
            if fact.label.trim().is_empty() {
                return Err(at(
                    "evidence",
                    i,
                    MemexError::Validation("label is empty".into()),
                ));
            }
            if !labels.insert(fact.label.as_str()) {
                return Err(at(
                    "evidence",
                    i,
                    MemexError::Validation(format!("duplicate label '{}'", fact.label)),
                ));
            }
            let source_type: SourceType = fact
                .source_type
                .parse()
                .map_err(|e| at("evidence", i, e))?;
            validate_evidence(&fact.source_id, &fact.excerpt).map_err(|e| at("evidence", i, e))?;
            evidence.push(CheckedEvidence {
                label: &fact.label,
                source_type,
                source_id: &fact.source_id,
                excerpt: &fact.excerpt,
            });
        }

        let mut relationships = Vec::with_capacity(batch.relationships.len());
        for (i, fact) in batch.relationships.iter().enumerate() {
            let from_key = self
                .check_ref(&fact.from, &known_keys)
                .map_err(|e| at("relationships", i, e))?;
            let to_key = self
                .check_ref(&fact.to, &known_keys)
                .map_err(|e| at("relationships", i, e))?;
            let rel_type: RelType = fact
                .rel_type
                .parse()
                .map_err(|e| at("relationships", i, e))?;
            let confidence =
                Confidence::from_unit(fact.confidence).map_err(|e| at("relationships", i, e))?;
            let status = match &fact.status {
                Some(s) => s.parse().map_err(|e| at("relationships", i, e))?,
                None => RelStatus::Active,
            };
            if let Some(label) = &fact.evidence
                && !labels.contains(label.as_str())
            {
                return Err(at(
                    "relationships",
                    i,
                    MemexError::Validation(format!("unknown evidence label '{}'", label)),
                ));
            }
            if let Some(properties) = &fact.properties {
                validate_attributes(properties).map_err(|e| at("relationships", i, e))?;
            }
            relationships.push(CheckedRelationship {
                from_key,
                to_key,
                rel_type,
                confidence,
                status,
                evidence: fact.evidence.as_deref(),
                properties: fact.properties.as_ref(),
            });
        }

        Ok(CheckedBatch {
            entities,
            evidence,
            relationships,
        })
    }

    fn check_ref(
        &self,
        reference: &EntityRef,
        known_keys: &BTreeSet<String>,
    ) -> Result<String, MemexError> {
        let entity_type: EntityType = reference.entity_type.parse()?;
        validate_name(&reference.name)?;
        let key = canonical_key(entity_type, &reference.name);
        if known_keys.contains(&key) || self.store.entity_by_key(&key)?.is_some() {
            Ok(key)
        } else {
            Err(MemexError::Validation(format!("unknown entity '{}'", key)))
        }
    }
}

/// Prefix a validation message with the fact's position.
fn at(section: &str, index: usize, err: MemexError) -> MemexError {
    match err {
        MemexError::Validation(msg) => {
            MemexError::Validation(format!("{}[{}]: {}", section, index, msg))
        }
        other => other,
    }
}
