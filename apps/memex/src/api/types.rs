//! # API Request/Response Types
//!
//! JSON shapes for the HTTP API and the CLI's `--json-mode`. Confidence is
//! a unit float and timestamps are RFC 3339 strings at this boundary only;
//! the engine itself works in basis points and microseconds.

use memex_core::{
    AttrValue, Attributes, Confidence, ContestOutcome, ContestedPair, Entity, EntityFact,
    EntityId, EntityRef, Evidence, EvidenceFact, EvidenceId, FactBatch, GraphStats, IngestReport,
    MemexError, Neighborhood, NeighborhoodQuery, RelStatus, Relationship, RelationshipClaim,
    RelationshipFact,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

// =============================================================================
// ATTRIBUTE VALUES
// =============================================================================

/// Convert a JSON value to an attribute value.
///
/// Integers that fit `i64` stay integers; other numbers become floats.
pub fn attr_from_json(value: Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttrValue::Int(i),
            None => n.as_f64().map(AttrValue::Float).unwrap_or(AttrValue::Null),
        },
        Value::String(s) => AttrValue::Text(s),
        Value::Array(items) => AttrValue::List(items.into_iter().map(attr_from_json).collect()),
        Value::Object(map) => AttrValue::Map(attributes_from_json(map)),
    }
}

/// Convert an attribute value to JSON. Non-finite floats become `null`.
pub fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::Null => Value::Null,
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Int(i) => Value::Number((*i).into()),
        AttrValue::Float(x) => Number::from_f64(*x).map_or(Value::Null, Value::Number),
        AttrValue::Text(s) => Value::String(s.clone()),
        AttrValue::List(items) => Value::Array(items.iter().map(attr_to_json).collect()),
        AttrValue::Map(map) => Value::Object(attributes_to_json(map)),
    }
}

pub fn attributes_from_json(map: Map<String, Value>) -> Attributes {
    map.into_iter()
        .map(|(k, v)| (k, attr_from_json(v)))
        .collect()
}

pub fn attributes_to_json(attributes: &Attributes) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), attr_to_json(v)))
        .collect()
}

// =============================================================================
// HEALTH / ERROR
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Id of a created or resolved record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: u64,
}

// =============================================================================
// RECORDS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityJson {
    pub id: u64,
    pub entity_type: String,
    pub name: String,
    pub normalized_name: String,
    pub canonical_key: String,
    pub attributes: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Entity> for EntityJson {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id.0,
            entity_type: e.entity_type.to_string(),
            name: e.name.clone(),
            normalized_name: e.normalized_name.clone(),
            canonical_key: e.canonical_key.clone(),
            attributes: attributes_to_json(&e.attributes),
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceJson {
    pub id: u64,
    pub source_type: String,
    pub source_id: String,
    pub source_excerpt: String,
    pub created_at: String,
}

impl From<&Evidence> for EvidenceJson {
    fn from(e: &Evidence) -> Self {
        Self {
            id: e.id.0,
            source_type: e.source_type.to_string(),
            source_id: e.source_id.clone(),
            source_excerpt: e.source_excerpt.clone(),
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipJson {
    pub id: u64,
    pub from: u64,
    pub to: u64,
    pub rel_type: String,
    pub confidence: f64,
    pub status: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub evidence_id: Option<u64>,
    pub properties: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Relationship> for RelationshipJson {
    fn from(r: &Relationship) -> Self {
        Self {
            id: r.id.0,
            from: r.from.0,
            to: r.to.0,
            rel_type: r.rel_type.to_string(),
            confidence: r.confidence.as_unit(),
            status: r.status.to_string(),
            first_seen_at: r.first_seen_at.to_rfc3339(),
            last_seen_at: r.last_seen_at.to_rfc3339(),
            evidence_id: r.evidence_id.map(|e| e.0),
            properties: attributes_to_json(&r.properties),
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

// =============================================================================
// WRITE REQUESTS
// =============================================================================

/// `POST /entities`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRequest {
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// `POST /evidence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRequest {
    pub source_type: String,
    pub source_id: String,
    pub excerpt: String,
}

/// `POST /relationships` and the body of `POST /relationships/{id}/contest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRequest {
    pub from: u64,
    pub to: u64,
    pub rel_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub evidence_id: Option<u64>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl RelationshipRequest {
    /// Parse enum spellings and the confidence into an engine claim.
    pub fn to_claim(&self) -> Result<RelationshipClaim, MemexError> {
        let mut claim = RelationshipClaim::new(
            EntityId(self.from),
            EntityId(self.to),
            self.rel_type.parse()?,
            Confidence::from_unit(self.confidence)?,
        );
        if let Some(status) = &self.status {
            claim = claim.with_status(status.parse()?);
        }
        if let Some(evidence) = self.evidence_id {
            claim = claim.with_evidence(EvidenceId(evidence));
        }
        if let Some(properties) = &self.properties {
            claim = claim.with_properties(attributes_from_json(properties.clone()));
        }
        Ok(claim)
    }
}

/// `POST /relationships/{id}/contest`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContestResponse {
    pub contested_id: u64,
    pub new_id: u64,
}

impl From<ContestOutcome> for ContestResponse {
    fn from(o: ContestOutcome) -> Self {
        Self {
            contested_id: o.contested_id.0,
            new_id: o.new_id.0,
        }
    }
}

/// One prior/current belief group from `GET /relationships/contested`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestedPairJson {
    pub from: u64,
    pub to: u64,
    pub rel_type: String,
    pub contested: Vec<RelationshipJson>,
    pub active: Option<RelationshipJson>,
}

impl From<&ContestedPair> for ContestedPairJson {
    fn from(p: &ContestedPair) -> Self {
        Self {
            from: p.from.0,
            to: p.to.0,
            rel_type: p.rel_type.to_string(),
            contested: p.contested.iter().map(RelationshipJson::from).collect(),
            active: p.active.as_ref().map(RelationshipJson::from),
        }
    }
}

// =============================================================================
// SEARCH / NEIGHBORHOOD
// =============================================================================

/// `GET /entities?q=&limit=`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_depth() -> usize {
    1
}

/// `POST /neighborhood`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodRequest {
    pub center: u64,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl NeighborhoodRequest {
    pub fn to_query(&self) -> Result<NeighborhoodQuery, MemexError> {
        let mut query = NeighborhoodQuery::new(EntityId(self.center), self.depth);
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if let Some(min) = self.min_confidence {
            query = query.with_min_confidence(Confidence::from_unit(min)?);
        }
        if let Some(status) = &self.status {
            query = query.with_status(status.parse::<RelStatus>()?);
        }
        Ok(query)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborJson {
    pub entity: EntityJson,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NeighborhoodStatsJson {
    pub center: u64,
    pub node_count: usize,
    pub relationship_count: usize,
    pub evidence_count: usize,
    /// Requested depth bound.
    pub max_depth: usize,
    pub effective_depth: usize,
    pub depth_reached: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodResponse {
    pub center: EntityJson,
    pub nodes: Vec<NeighborJson>,
    pub relationships: Vec<RelationshipJson>,
    /// Keyed by evidence id.
    pub evidence: BTreeMap<u64, EvidenceJson>,
    pub stats: NeighborhoodStatsJson,
}

impl From<&Neighborhood> for NeighborhoodResponse {
    fn from(n: &Neighborhood) -> Self {
        Self {
            center: EntityJson::from(&n.center),
            nodes: n
                .nodes
                .iter()
                .map(|node| NeighborJson {
                    entity: EntityJson::from(&node.entity),
                    depth: node.depth,
                })
                .collect(),
            relationships: n.relationships.iter().map(RelationshipJson::from).collect(),
            evidence: n
                .evidence
                .iter()
                .map(|(id, e)| (id.0, EvidenceJson::from(e)))
                .collect(),
            stats: NeighborhoodStatsJson {
                center: n.stats.center.0,
                node_count: n.stats.node_count,
                relationship_count: n.stats.relationship_count,
                evidence_count: n.stats.evidence_count,
                max_depth: n.stats.max_depth,
                effective_depth: n.stats.effective_depth,
                depth_reached: n.stats.depth_reached,
            },
        }
    }
}

// =============================================================================
// STATS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub evidence_count: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_rel_type: BTreeMap<String, usize>,
    pub by_entity_type: BTreeMap<String, usize>,
    pub mean_confidence: Option<f64>,
}

impl From<&GraphStats> for StatsResponse {
    fn from(s: &GraphStats) -> Self {
        Self {
            entity_count: s.entity_count,
            relationship_count: s.relationship_count,
            evidence_count: s.evidence_count,
            by_status: s
                .by_status
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            by_rel_type: s
                .by_rel_type
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            by_entity_type: s
                .by_entity_type
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            mean_confidence: s.mean_confidence.map(Confidence::as_unit),
        }
    }
}

// =============================================================================
// BATCH INGEST
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFactJson {
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceFactJson {
    pub label: String,
    pub source_type: String,
    pub source_id: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRefJson {
    pub entity_type: String,
    pub name: String,
}

impl From<&EntityRefJson> for EntityRef {
    fn from(r: &EntityRefJson) -> Self {
        Self {
            entity_type: r.entity_type.clone(),
            name: r.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipFactJson {
    pub from: EntityRefJson,
    pub to: EntityRefJson,
    pub rel_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub status: Option<String>,
    /// Label of an evidence item in the same batch.
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// `POST /ingest` and the file format of `memex ingest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub entities: Vec<EntityFactJson>,
    #[serde(default)]
    pub evidence: Vec<EvidenceFactJson>,
    #[serde(default)]
    pub relationships: Vec<RelationshipFactJson>,
}

impl IngestRequest {
    /// The engine-side batch. Validation happens in `ingest_batch`.
    pub fn to_batch(&self) -> FactBatch {
        FactBatch {
            entities: self
                .entities
                .iter()
                .map(|e| EntityFact {
                    entity_type: e.entity_type.clone(),
                    name: e.name.clone(),
                    attributes: attributes_from_json(e.attributes.clone()),
                })
                .collect(),
            evidence: self
                .evidence
                .iter()
                .map(|e| EvidenceFact {
                    label: e.label.clone(),
                    source_type: e.source_type.clone(),
                    source_id: e.source_id.clone(),
                    excerpt: e.excerpt.clone(),
                })
                .collect(),
            relationships: self
                .relationships
                .iter()
                .map(|r| RelationshipFact {
                    from: EntityRef::from(&r.from),
                    to: EntityRef::from(&r.to),
                    rel_type: r.rel_type.clone(),
                    confidence: r.confidence,
                    status: r.status.clone(),
                    evidence: r.evidence.clone(),
                    properties: r.properties.clone().map(attributes_from_json),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub entity_ids: Vec<u64>,
    pub evidence_ids: BTreeMap<String, u64>,
    pub relationship_ids: Vec<u64>,
    pub entities_created: usize,
    pub entities_merged: usize,
    pub relationships_created: usize,
    pub relationships_reinforced: usize,
}

impl From<&IngestReport> for IngestResponse {
    fn from(r: &IngestReport) -> Self {
        Self {
            entity_ids: r.entity_ids.iter().map(|id| id.0).collect(),
            evidence_ids: r
                .evidence_ids
                .iter()
                .map(|(label, id)| (label.clone(), id.0))
                .collect(),
            relationship_ids: r.relationship_ids.iter().map(|id| id.0).collect(),
            entities_created: r.entities_created,
            entities_merged: r.entities_merged,
            relationships_created: r.relationships_created,
            relationships_reinforced: r.relationships_reinforced,
        }
    }
}
