//! # Relationship Store
//!
//! Idempotent upsert keyed by `(from, to, rel_type, status)`.
//!
//! - First observation inserts the row with the caller's confidence
//! - Each repeat adds `CONFIDENCE_STEP`, capped at `1.0`, and moves
//!   `last_seen_at` strictly forward
//! - Status is part of the key, so an accepted claim and a disputed
//!   alternative for the same pair coexist as separate rows

use crate::clock::Clock;
use crate::engine::{KnowledgeGraph, Upserted};
use crate::ingestor::validate_attributes;
use crate::store::{EdgeFilter, GraphStore};
use crate::{
    Attributes, Confidence, EntityId, EvidenceId, MemexError, RelStatus, RelType, Relationship,
    RelationshipId,
};
use std::collections::BTreeMap;

/// One observation of a directed, typed claim.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipClaim {
    pub from: EntityId,
    pub to: EntityId,
    pub rel_type: RelType,
    /// Initial confidence. Ignored when the claim reinforces an existing row.
    pub confidence: Confidence,
    pub status: RelStatus,
    /// Replaces the row's evidence pointer when present.
    pub evidence_id: Option<EvidenceId>,
    /// Replaces the row's properties wholesale when present.
    pub properties: Option<Attributes>,
}

impl RelationshipClaim {
    /// An ACTIVE claim with no evidence or properties.
    #[must_use]
    pub fn new(from: EntityId, to: EntityId, rel_type: RelType, confidence: Confidence) -> Self {
        Self {
            from,
            to,
            rel_type,
            confidence,
            status: RelStatus::Active,
            evidence_id: None,
            properties: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: RelStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence_id: EvidenceId) -> Self {
        self.evidence_id = Some(evidence_id);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Attributes) -> Self {
        self.properties = Some(properties);
        self
    }
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Record an observation, returning the id of the row it landed on.
    ///
    /// Both endpoints must exist.
    pub fn upsert_relationship(
        &mut self,
        claim: RelationshipClaim,
    ) -> Result<RelationshipId, MemexError> {
        self.record_claim(claim).map(|u| u.record.id)
    }

    /// Lookup by id. Absence is `Ok(None)`.
    pub fn relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, MemexError> {
        self.store.relationship(id)
    }

    /// Every relationship touching `entity` in either direction, in id
    /// order.
    pub fn relationships_for_entity(
        &self,
        entity: EntityId,
        filter: &EdgeFilter,
    ) -> Result<Vec<Relationship>, MemexError> {
        let mut by_id = BTreeMap::new();
        for rel in self
            .store
            .outgoing(entity, filter)?
            .into_iter()
            .chain(self.store.incoming(entity, filter)?)
        {
            by_id.entry(rel.id).or_insert(rel);
        }
        Ok(by_id.into_values().collect())
    }

    pub(crate) fn record_claim(
        &mut self,
        claim: RelationshipClaim,
    ) -> Result<Upserted<Relationship>, MemexError> {
        self.check_claim(&claim)?;

        let key = crate::RelationshipKey {
            from: claim.from,
            to: claim.to,
            rel_type: claim.rel_type,
            status: claim.status,
        };
        if let Some(existing) = self.store.relationship_by_key(&key)? {
            return self.reinforce(existing, claim).map(Upserted::merged);
        }

        let now = self.now();
        let inserted = self.store.insert_relationship(|id| Relationship {
            id,
            from: claim.from,
            to: claim.to,
            rel_type: claim.rel_type,
            confidence: claim.confidence,
            status: claim.status,
            first_seen_at: now,
            last_seen_at: now,
            evidence_id: claim.evidence_id,
            properties: claim.properties.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        });

        match inserted {
            Ok(rel) => {
                tracing::info!(
                    relationship_id = rel.id.0,
                    from = rel.from.0,
                    to = rel.to.0,
                    rel_type = %rel.rel_type,
                    status = %rel.status,
                    "relationship created"
                );
                Ok(Upserted::created(rel))
            }
            Err(MemexError::Conflict(_)) => {
                // Another writer inserted the same tuple; count as a repeat.
                let existing = self.store.relationship_by_key(&key)?.ok_or_else(|| {
                    MemexError::Conflict(format!("relationship {} is contended", key))
                })?;
                self.reinforce(existing, claim).map(Upserted::merged)
            }
            Err(e) => Err(e),
        }
    }

    /// Endpoints exist and properties are within limits.
    pub(crate) fn check_claim(&self, claim: &RelationshipClaim) -> Result<(), MemexError> {
        if let Some(properties) = &claim.properties {
            validate_attributes(properties)?;
        }
        for endpoint in [claim.from, claim.to] {
            if self.store.entity(endpoint)?.is_none() {
                return Err(MemexError::entity_not_found(endpoint));
            }
        }
        Ok(())
    }

    fn reinforce(
        &mut self,
        mut rel: Relationship,
        claim: RelationshipClaim,
    ) -> Result<Relationship, MemexError> {
        rel.confidence = rel.confidence.reinforce();
        rel.last_seen_at = self.now_after(rel.last_seen_at);
        rel.updated_at = rel.last_seen_at.max(self.now_after(rel.updated_at));
        if claim.evidence_id.is_some() {
            rel.evidence_id = claim.evidence_id;
        }
        if let Some(properties) = claim.properties {
            rel.properties = properties;
        }
        self.store.update_relationship(&rel)?;

        tracing::debug!(
            relationship_id = rel.id.0,
            confidence = %rel.confidence,
            status = %rel.status,
            "relationship reinforced"
        );
        Ok(rel)
    }

    /// Move `rel` to `status`.
    ///
    /// If another row already holds the target `(from, to, type, status)`
    /// slot, `rel` is folded into that occupant and removed; the returned
    /// row is the occupant.
    pub(crate) fn move_to_status(
        &mut self,
        mut rel: Relationship,
        status: RelStatus,
    ) -> Result<Relationship, MemexError> {
        if rel.status == status {
            return Ok(rel);
        }

        let target = rel.key().with_status(status);
        if let Some(occupant) = self.store.relationship_by_key(&target)? {
            return self.fold_into(rel, occupant);
        }

        let previous = rel.status;
        rel.status = status;
        rel.updated_at = self.now_after(rel.updated_at);
        match self.store.update_relationship(&rel) {
            Ok(()) => {
                tracing::info!(
                    relationship_id = rel.id.0,
                    from_status = %previous,
                    status = %status,
                    "relationship status changed"
                );
                Ok(rel)
            }
            Err(MemexError::Conflict(msg)) => {
                let occupant = self
                    .store
                    .relationship_by_key(&target)?
                    .ok_or(MemexError::Conflict(msg))?;
                rel.status = previous;
                self.fold_into(rel, occupant)
            }
            Err(e) => Err(e),
        }
    }

    fn fold_into(
        &mut self,
        mover: Relationship,
        mut occupant: Relationship,
    ) -> Result<Relationship, MemexError> {
        let now = self.now();
        occupant.confidence = occupant.confidence.max(mover.confidence);
        occupant.first_seen_at = occupant.first_seen_at.min(mover.first_seen_at);
        occupant.last_seen_at = now.max(occupant.last_seen_at).max(mover.last_seen_at);
        occupant.updated_at = occupant
            .last_seen_at
            .max(self.now_after(occupant.updated_at));
        if mover.evidence_id.is_some() {
            occupant.evidence_id = mover.evidence_id;
        }
        if !mover.properties.is_empty() {
            occupant.properties = mover.properties;
        }

        self.store.update_relationship(&occupant)?;
        self.store.remove_relationship(mover.id)?;

        tracing::info!(
            relationship_id = occupant.id.0,
            folded_id = mover.id.0,
            status = %occupant.status,
            "relationship folded into existing row"
        );
        Ok(occupant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use crate::{AttrValue, EntityType, Timestamp};

    fn bp(n: u16) -> Confidence {
        Confidence::from_basis_points(n).expect("valid")
    }

    fn setup() -> (KnowledgeGraph<MemoryStore, ManualClock>, EntityId, EntityId) {
        let mut g = KnowledgeGraph::with_clock(
            MemoryStore::new(),
            ManualClock::starting_at(Timestamp::from_micros(5_000)),
        );
        let a = g
            .upsert_entity(EntityType::Person, "Alice", Attributes::new())
            .expect("upsert");
        let b = g
            .upsert_entity(EntityType::Person, "Bob", Attributes::new())
            .expect("upsert");
        (g, a, b)
    }

    #[test]
    fn repeat_observation_reinforces_same_row() {
        let (mut g, a, b) = setup();
        let claim = RelationshipClaim::new(a, b, RelType::Likes, bp(7_500));

        let first = g.upsert_relationship(claim.clone()).expect("upsert");
        let before = g.relationship(first).expect("read").expect("present");
        assert_eq!(before.first_seen_at, before.last_seen_at);

        let second = g.upsert_relationship(claim).expect("upsert");
        assert_eq!(first, second);

        let after = g.relationship(first).expect("read").expect("present");
        assert_eq!(after.confidence, bp(8_000));
        assert!(after.last_seen_at > before.last_seen_at);
        assert_eq!(after.first_seen_at, before.first_seen_at);
    }

    #[test]
    fn twenty_repeats_saturate_at_one() {
        let (mut g, a, b) = setup();
        let claim = RelationshipClaim::new(a, b, RelType::Knows, bp(1_000));
        let id = g.upsert_relationship(claim.clone()).expect("upsert");
        for _ in 0..20 {
            g.upsert_relationship(claim.clone()).expect("upsert");
        }
        let rel = g.relationship(id).expect("read").expect("present");
        assert_eq!(rel.confidence, Confidence::MAX);
    }

    #[test]
    fn direction_matters() {
        let (mut g, a, b) = setup();
        let ab = g
            .upsert_relationship(RelationshipClaim::new(a, b, RelType::Knows, bp(5_000)))
            .expect("upsert");
        let ba = g
            .upsert_relationship(RelationshipClaim::new(b, a, RelType::Knows, bp(5_000)))
            .expect("upsert");
        assert_ne!(ab, ba);
    }

    #[test]
    fn status_separates_rows() {
        let (mut g, a, b) = setup();
        let active = g
            .upsert_relationship(RelationshipClaim::new(a, b, RelType::Manages, bp(9_000)))
            .expect("upsert");
        let contested = g
            .upsert_relationship(
                RelationshipClaim::new(a, b, RelType::Manages, bp(7_000))
                    .with_status(RelStatus::Contested),
            )
            .expect("upsert");
        assert_ne!(active, contested);
        assert_eq!(
            g.relationship(active).expect("read").map(|r| r.confidence),
            Some(bp(9_000))
        );
        assert_eq!(
            g.relationship(contested).expect("read").map(|r| r.confidence),
            Some(bp(7_000))
        );
    }

    #[test]
    fn evidence_is_last_writer_wins_and_properties_replace() {
        let (mut g, a, b) = setup();
        let e1 = g
            .upsert_evidence(crate::SourceType::Sms, "s1", "first")
            .expect("evidence");
        let mut props = Attributes::new();
        props.insert("since".into(), AttrValue::Int(2019));

        let id = g
            .upsert_relationship(
                RelationshipClaim::new(a, b, RelType::WorksAt, bp(6_000))
                    .with_evidence(e1)
                    .with_properties(props),
            )
            .expect("upsert");

        // No evidence, no properties: both kept.
        g.upsert_relationship(RelationshipClaim::new(a, b, RelType::WorksAt, bp(6_000)))
            .expect("upsert");
        let rel = g.relationship(id).expect("read").expect("present");
        assert_eq!(rel.evidence_id, Some(e1));
        assert_eq!(rel.properties.get("since"), Some(&AttrValue::Int(2019)));

        // New evidence and properties replace.
        let e2 = g
            .upsert_evidence(crate::SourceType::Sms, "s2", "second")
            .expect("evidence");
        let mut replaced = Attributes::new();
        replaced.insert("title".into(), "cfo".into());
        g.upsert_relationship(
            RelationshipClaim::new(a, b, RelType::WorksAt, bp(6_000))
                .with_evidence(e2)
                .with_properties(replaced),
        )
        .expect("upsert");
        let rel = g.relationship(id).expect("read").expect("present");
        assert_eq!(rel.evidence_id, Some(e2));
        assert!(rel.properties.get("since").is_none());
        assert_eq!(rel.properties.len(), 1);
    }

    #[test]
    fn unknown_endpoint_is_not_found() {
        let (mut g, a, _) = setup();
        let err = g
            .upsert_relationship(RelationshipClaim::new(
                a,
                EntityId(999),
                RelType::Knows,
                bp(5_000),
            ))
            .expect_err("missing endpoint");
        assert!(matches!(err, MemexError::NotFound { .. }));
    }

    #[test]
    fn relationships_for_entity_covers_both_directions() {
        let (mut g, a, b) = setup();
        let ab = g
            .upsert_relationship(RelationshipClaim::new(a, b, RelType::Knows, bp(5_000)))
            .expect("upsert");
        let ba = g
            .upsert_relationship(RelationshipClaim::new(b, a, RelType::Likes, bp(5_000)))
            .expect("upsert");
        let aa = g
            .upsert_relationship(RelationshipClaim::new(a, a, RelType::RelatedTo, bp(5_000)))
            .expect("upsert");

        let ids: Vec<_> = g
            .relationships_for_entity(a, &EdgeFilter::any())
            .expect("read")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![ab, ba, aa]);
    }

    #[test]
    fn moving_onto_occupied_slot_folds() {
        let (mut g, a, b) = setup();
        let old = g
            .upsert_relationship(
                RelationshipClaim::new(a, b, RelType::Owns, bp(4_000))
                    .with_status(RelStatus::Retracted),
            )
            .expect("upsert");
        g.clock().advance(100);
        let live = g
            .upsert_relationship(RelationshipClaim::new(a, b, RelType::Owns, bp(9_000)))
            .expect("upsert");

        let rel = g.relationship(live).expect("read").expect("present");
        let survivor = g
            .move_to_status(rel, RelStatus::Retracted)
            .expect("move");

        assert_eq!(survivor.id, old);
        assert_eq!(survivor.confidence, bp(9_000));
        assert_eq!(survivor.status, RelStatus::Retracted);
        assert_eq!(g.relationship(live).expect("read"), None);
        assert_eq!(g.store().relationship_count().expect("count"), 1);
    }
}
