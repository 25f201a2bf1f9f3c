//! # Evidence Store
//!
//! Append-only provenance log. Every call writes a new row.

use crate::clock::Clock;
use crate::engine::KnowledgeGraph;
use crate::ingestor::validate_evidence;
use crate::store::GraphStore;
use crate::{Evidence, EvidenceId, MemexError, SourceType};

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Record a provenance entry. Never deduplicated.
    pub fn upsert_evidence(
        &mut self,
        source_type: SourceType,
        source_id: &str,
        excerpt: &str,
    ) -> Result<EvidenceId, MemexError> {
        validate_evidence(source_id, excerpt)?;

        let now = self.now();
        let evidence = self.store.insert_evidence(|id| Evidence {
            id,
            source_type,
            source_id: source_id.to_string(),
            source_excerpt: excerpt.to_string(),
            created_at: now,
        })?;

        tracing::debug!(
            evidence_id = evidence.id.0,
            source_type = %source_type,
            "evidence recorded"
        );
        Ok(evidence.id)
    }

    /// Lookup by id. Absence is `Ok(None)`.
    pub fn evidence(&self, id: EvidenceId) -> Result<Option<Evidence>, MemexError> {
        self.store.evidence(id)
    }
}
