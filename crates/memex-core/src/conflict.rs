//! # Conflict Resolver
//!
//! Demotes a superseded claim to CONTESTED while admitting the new one as
//! ACTIVE, retracts claims, and pairs prior with current beliefs for
//! review. Rows are never deleted here except when a status change folds
//! a row into the one already holding its target slot.

use crate::clock::Clock;
use crate::engine::KnowledgeGraph;
use crate::relationships::RelationshipClaim;
use crate::store::GraphStore;
use crate::{EntityId, MemexError, RelStatus, RelType, Relationship, RelationshipId};
use std::collections::BTreeMap;

/// Ids produced by a contest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContestOutcome {
    /// The demoted row. Differs from the requested id only when the demotion
    /// folded it into an existing CONTESTED row.
    pub contested_id: RelationshipId,
    /// The ACTIVE row carrying the superseding claim.
    pub new_id: RelationshipId,
}

/// Prior and current beliefs for one `(from, to, rel_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestedPair {
    pub from: EntityId,
    pub to: EntityId,
    pub rel_type: RelType,
    /// CONTESTED rows of the group, in id order.
    pub contested: Vec<Relationship>,
    /// The group's ACTIVE row, if any.
    pub active: Option<Relationship>,
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Demote `existing_id` to CONTESTED and record `new_claim` as ACTIVE.
    ///
    /// The new claim is checked before anything is written, so a rejected
    /// claim leaves the existing row untouched.
    pub fn contest_relationship(
        &mut self,
        existing_id: RelationshipId,
        new_claim: RelationshipClaim,
    ) -> Result<ContestOutcome, MemexError> {
        let existing = self
            .store
            .relationship(existing_id)?
            .ok_or_else(|| MemexError::relationship_not_found(existing_id))?;
        self.ensure_transition_allowed(&existing, RelStatus::Contested)?;

        let new_claim = new_claim.with_status(RelStatus::Active);
        self.check_claim(&new_claim)?;

        let contested = self.move_to_status(existing, RelStatus::Contested)?;
        let admitted = self.record_claim(new_claim)?;

        tracing::info!(
            contested_id = contested.id.0,
            new_id = admitted.record.id.0,
            "relationship contested"
        );
        Ok(ContestOutcome {
            contested_id: contested.id,
            new_id: admitted.record.id,
        })
    }

    /// Mark a relationship RETRACTED. Returns the id of the row that ends up
    /// RETRACTED.
    pub fn retract_relationship(
        &mut self,
        id: RelationshipId,
    ) -> Result<RelationshipId, MemexError> {
        let existing = self
            .store
            .relationship(id)?
            .ok_or_else(|| MemexError::relationship_not_found(id))?;
        self.ensure_transition_allowed(&existing, RelStatus::Retracted)?;

        let retracted = self.move_to_status(existing, RelStatus::Retracted)?;
        tracing::info!(
            relationship_id = retracted.id.0,
            requested_id = id.0,
            "relationship retracted"
        );
        Ok(retracted.id)
    }

    /// Group CONTESTED rows by `(from, to, rel_type)` and pair each group
    /// with its ACTIVE row.
    pub fn contested_relationships(&self) -> Result<Vec<ContestedPair>, MemexError> {
        let mut groups: BTreeMap<(EntityId, EntityId, RelType), ContestedPair> = BTreeMap::new();
        for rel in self.store.relationships_with_status(RelStatus::Contested)? {
            groups
                .entry((rel.from, rel.to, rel.rel_type))
                .or_insert_with(|| ContestedPair {
                    from: rel.from,
                    to: rel.to,
                    rel_type: rel.rel_type,
                    contested: Vec::new(),
                    active: None,
                })
                .contested
                .push(rel);
        }

        for pair in groups.values_mut() {
            let key = crate::RelationshipKey {
                from: pair.from,
                to: pair.to,
                rel_type: pair.rel_type,
                status: RelStatus::Active,
            };
            pair.active = self.store.relationship_by_key(&key)?;
        }

        Ok(groups.into_values().collect())
    }

    fn ensure_transition_allowed(
        &self,
        rel: &Relationship,
        target: RelStatus,
    ) -> Result<(), MemexError> {
        if self.config.enforce_terminal_states && rel.status != RelStatus::Active {
            return Err(MemexError::Validation(format!(
                "relationship {} is {} and cannot become {}",
                rel.id, rel.status, target
            )));
        }
        Ok(())
    }
}
