//! # Statistics
//!
//! Descriptive counts for observability. Pure aggregation over the store.

use crate::clock::Clock;
use crate::engine::KnowledgeGraph;
use crate::primitives::CONFIDENCE_SCALE;
use crate::store::GraphStore;
use crate::{Confidence, EntityType, MemexError, RelStatus, RelType};
use std::collections::BTreeMap;

/// Counts and breakdowns over the whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub evidence_count: usize,
    /// Relationship rows per status. Every status is present.
    pub by_status: BTreeMap<RelStatus, usize>,
    /// Relationship rows per type. Only types in use appear.
    pub by_rel_type: BTreeMap<RelType, usize>,
    /// Entity rows per type. Only types in use appear.
    pub by_entity_type: BTreeMap<EntityType, usize>,
    /// Mean relationship confidence, rounded to the nearest basis point.
    /// `None` when there are no relationships.
    pub mean_confidence: Option<Confidence>,
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Aggregate counts over every row.
    pub fn stats(&self) -> Result<GraphStats, MemexError> {
        let mut stats = GraphStats {
            entity_count: self.store.entity_count()?,
            relationship_count: self.store.relationship_count()?,
            evidence_count: self.store.evidence_count()?,
            by_status: RelStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            ..GraphStats::default()
        };

        for entity in self.store.entities()? {
            *stats.by_entity_type.entry(entity.entity_type).or_insert(0) += 1;
        }

        let mut total_bp: u64 = 0;
        let mut rows: u64 = 0;
        for rel in self.store.relationships()? {
            *stats.by_status.entry(rel.status).or_insert(0) += 1;
            *stats.by_rel_type.entry(rel.rel_type).or_insert(0) += 1;
            total_bp += u64::from(rel.confidence.basis_points());
            rows += 1;
        }

        if rows > 0 {
            let mean = (total_bp + rows / 2) / rows;
            let mean = u16::try_from(mean).unwrap_or(CONFIDENCE_SCALE);
            stats.mean_confidence = Some(Confidence::from_basis_points(mean)?);
        }

        Ok(stats)
    }
}
