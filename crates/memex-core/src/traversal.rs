//! # Neighborhood Traversal
//!
//! Bounded breadth-first expansion around a center entity.
//!
//! The frontier is expanded one level at a time with a single
//! `incident_batch` call per level. Within a level entities are expanded in
//! discovery order, so the result matches a FIFO walk:
//!
//! - a node's recorded depth is the depth at which it was first discovered
//! - `limit` bounds distinct visited entities (the center included); the
//!   relationship list may be longer
//! - depth 0 yields the center alone
//!
//! The limit is checked per neighbor, not per expanded node. A neighbor
//! found after the cap is reached is not recorded, and neither is the
//! relationship leading to it, so the result never names an entity that is
//! missing from `nodes`.

use crate::clock::Clock;
use crate::engine::KnowledgeGraph;
use crate::store::{EdgeFilter, GraphStore};
use crate::{
    Confidence, Entity, EntityId, Evidence, EvidenceId, MemexError, RelStatus, Relationship,
    RelationshipId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Parameters of a neighborhood query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborhoodQuery {
    pub center: EntityId,
    pub depth: usize,
    /// Visited-entity bound. `None` uses the configured default.
    pub limit: Option<usize>,
    pub min_confidence: Option<Confidence>,
    /// Exact status filter. `None` admits every status.
    pub status: Option<RelStatus>,
}

impl NeighborhoodQuery {
    #[must_use]
    pub fn new(center: EntityId, depth: usize) -> Self {
        Self {
            center,
            depth,
            limit: None,
            min_confidence: None,
            status: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_min_confidence(mut self, min: Confidence) -> Self {
        self.min_confidence = Some(min);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: RelStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn filter(&self) -> EdgeFilter {
        EdgeFilter {
            status: self.status,
            min_confidence: self.min_confidence,
        }
    }
}

/// An entity reached by the traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborNode {
    pub entity: Entity,
    /// Depth of first discovery. The center is at 0.
    pub depth: usize,
}

/// Summary counts of a neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborhoodStats {
    pub center: EntityId,
    pub node_count: usize,
    pub relationship_count: usize,
    pub evidence_count: usize,
    /// The depth bound as requested.
    pub max_depth: usize,
    /// The depth bound the traversal ran with, after clamping.
    pub effective_depth: usize,
    /// The deepest recorded node.
    pub depth_reached: usize,
}

/// Result of a neighborhood query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighborhood {
    pub center: Entity,
    /// Visited entities in discovery order, center first.
    pub nodes: Vec<NeighborNode>,
    /// Relationships walked, in the order they were first seen.
    pub relationships: Vec<Relationship>,
    /// Evidence referenced by `relationships` that still resolves.
    pub evidence: BTreeMap<EvidenceId, Evidence>,
    pub stats: NeighborhoodStats,
}

impl Neighborhood {
    /// Whether `entity` was visited.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.iter().any(|n| n.entity.id == entity)
    }

    /// Recorded depth of `entity`, if visited.
    #[must_use]
    pub fn depth_of(&self, entity: EntityId) -> Option<usize> {
        self.nodes
            .iter()
            .find(|n| n.entity.id == entity)
            .map(|n| n.depth)
    }
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Expand around `query.center`.
    ///
    /// Fails with `NotFound` before any traversal if the center does not
    /// resolve.
    pub fn neighborhood(&self, query: &NeighborhoodQuery) -> Result<Neighborhood, MemexError> {
        let center = self
            .store
            .entity(query.center)?
            .ok_or_else(|| MemexError::entity_not_found(query.center))?;

        let effective_depth = self.config.clamp_depth(query.depth);
        let limit = query
            .limit
            .unwrap_or(self.config.default_neighborhood_limit)
            .max(1);
        let filter = query.filter();

        let mut depths: BTreeMap<EntityId, usize> = BTreeMap::new();
        let mut order: Vec<EntityId> = vec![center.id];
        depths.insert(center.id, 0);

        let mut seen_rels: BTreeSet<RelationshipId> = BTreeSet::new();
        let mut relationships: Vec<Relationship> = Vec::new();

        let mut frontier = vec![center.id];
        let mut level = 0;
        'levels: while !frontier.is_empty() && level < effective_depth {
            let incident = self.store.incident_batch(&frontier, &filter)?;
            let mut next = Vec::new();

            for entity in &frontier {
                if depths.len() >= limit {
                    break 'levels;
                }
                let Some(edges) = incident.get(entity) else {
                    continue;
                };
                for rel in edges.outgoing.iter().chain(&edges.incoming) {
                    let neighbor = rel.other_end(*entity);
                    if !depths.contains_key(&neighbor) {
                        if depths.len() >= limit {
                            continue;
                        }
                        depths.insert(neighbor, level + 1);
                        order.push(neighbor);
                        next.push(neighbor);
                    }
                    if seen_rels.insert(rel.id) {
                        relationships.push(rel.clone());
                    }
                }
            }

            frontier = next;
            level += 1;
        }

        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            let depth = depths.get(&id).copied().unwrap_or_default();
            let entity = if id == center.id {
                Some(center.clone())
            } else {
                self.store.entity(id)?
            };
            if let Some(entity) = entity {
                nodes.push(NeighborNode { entity, depth });
            }
        }

        let mut evidence = BTreeMap::new();
        for evidence_id in relationships.iter().filter_map(|r| r.evidence_id) {
            if evidence.contains_key(&evidence_id) {
                continue;
            }
            if let Some(row) = self.store.evidence(evidence_id)? {
                evidence.insert(evidence_id, row);
            }
        }

        let stats = NeighborhoodStats {
            center: center.id,
            node_count: nodes.len(),
            relationship_count: relationships.len(),
            evidence_count: evidence.len(),
            max_depth: query.depth,
            effective_depth,
            depth_reached: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
        };

        tracing::debug!(
            center = center.id.0,
            nodes = stats.node_count,
            relationships = stats.relationship_count,
            depth_reached = stats.depth_reached,
            "neighborhood expanded"
        );

        Ok(Neighborhood {
            center,
            nodes,
            relationships,
            evidence,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use crate::relationships::RelationshipClaim;
    use crate::{Attributes, EntityType, RelType, SourceType, Timestamp};

    fn bp(n: u16) -> Confidence {
        Confidence::from_basis_points(n).expect("valid")
    }

    fn graph() -> KnowledgeGraph<MemoryStore, ManualClock> {
        KnowledgeGraph::with_clock(
            MemoryStore::new(),
            ManualClock::starting_at(Timestamp::from_micros(1)),
        )
    }

    fn person(g: &mut KnowledgeGraph<MemoryStore, ManualClock>, name: &str) -> EntityId {
        g.upsert_entity(EntityType::Person, name, Attributes::new())
            .expect("upsert")
    }

    fn link(
        g: &mut KnowledgeGraph<MemoryStore, ManualClock>,
        from: EntityId,
        to: EntityId,
        confidence: u16,
    ) -> RelationshipId {
        g.upsert_relationship(RelationshipClaim::new(from, to, RelType::Knows, bp(confidence)))
            .expect("upsert")
    }

    #[test]
    fn chain_expands_one_level_per_depth() {
        let mut g = graph();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        let c = person(&mut g, "C");
        link(&mut g, a, b, 5_000);
        link(&mut g, b, c, 5_000);

        let one = g.neighborhood(&NeighborhoodQuery::new(a, 1)).expect("query");
        assert!(one.contains(b));
        assert!(!one.contains(c));

        let two = g.neighborhood(&NeighborhoodQuery::new(a, 2)).expect("query");
        assert!(two.contains(b) && two.contains(c));
        assert!(one.nodes.len() <= two.nodes.len());
        assert_eq!(two.depth_of(c), Some(2));
        assert_eq!(two.stats.depth_reached, 2);
    }

    #[test]
    fn depth_zero_is_center_only() {
        let mut g = graph();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        link(&mut g, a, b, 5_000);

        let n = g.neighborhood(&NeighborhoodQuery::new(a, 0)).expect("query");
        assert_eq!(n.nodes.len(), 1);
        assert_eq!(n.nodes[0].depth, 0);
        assert!(n.relationships.is_empty());
        assert_eq!(n.stats.max_depth, 0);
    }

    #[test]
    fn incoming_edges_are_followed() {
        let mut g = graph();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        link(&mut g, b, a, 5_000);

        let n = g.neighborhood(&NeighborhoodQuery::new(a, 1)).expect("query");
        assert!(n.contains(b));
        assert_eq!(n.relationships.len(), 1);
    }

    #[test]
    fn first_discovery_depth_wins() {
        // a - b - c and a - c: c is first found at depth 1.
        let mut g = graph();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        let c = person(&mut g, "C");
        link(&mut g, a, b, 5_000);
        link(&mut g, b, c, 5_000);
        link(&mut g, a, c, 5_000);

        let n = g.neighborhood(&NeighborhoodQuery::new(a, 3)).expect("query");
        assert_eq!(n.depth_of(c), Some(1));
        assert_eq!(n.depth_of(a), Some(0));
        // b-c is still recorded, once.
        assert_eq!(n.relationships.len(), 3);
    }

    #[test]
    fn limit_bounds_visited_entities_not_relationships() {
        let mut g = graph();
        let hub = person(&mut g, "Hub");
        let x = person(&mut g, "X");
        let y = person(&mut g, "Y");
        let z = person(&mut g, "Z");
        link(&mut g, hub, x, 5_000);
        link(&mut g, hub, y, 5_000);
        link(&mut g, hub, z, 5_000);
        // Two parallel claims between hub and x.
        g.upsert_relationship(RelationshipClaim::new(hub, x, RelType::Likes, bp(5_000)))
            .expect("upsert");

        let n = g
            .neighborhood(&NeighborhoodQuery::new(hub, 1).with_limit(2))
            .expect("query");
        assert_eq!(n.nodes.len(), 2);
        assert!(n.contains(x));
        assert!(!n.contains(y));
        assert_eq!(n.relationships.len(), 2);
    }

    #[test]
    fn neighbors_past_the_cap_drop_their_relationships() {
        let mut g = graph();
        let hub = person(&mut g, "Hub");
        let x = person(&mut g, "X");
        let y = person(&mut g, "Y");
        let z = person(&mut g, "Z");
        let kept = link(&mut g, hub, x, 5_000);
        link(&mut g, hub, y, 5_000);
        link(&mut g, hub, z, 5_000);

        let n = g
            .neighborhood(&NeighborhoodQuery::new(hub, 1).with_limit(2))
            .expect("query");
        assert_eq!(n.stats.node_count, 2);
        let ids: Vec<_> = n.relationships.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![kept]);
        for rel in &n.relationships {
            assert!(n.contains(rel.from) && n.contains(rel.to));
        }
    }

    #[test]
    fn min_confidence_filters_relationships() {
        let mut g = graph();
        let x = person(&mut g, "X");
        let y = person(&mut g, "Y");
        link(&mut g, x, y, 9_500);

        let kept = g
            .neighborhood(&NeighborhoodQuery::new(x, 1).with_min_confidence(bp(9_000)))
            .expect("query");
        assert_eq!(kept.relationships.len(), 1);

        let dropped = g
            .neighborhood(&NeighborhoodQuery::new(x, 1).with_min_confidence(bp(9_800)))
            .expect("query");
        assert!(dropped.relationships.is_empty());
    }

    #[test]
    fn status_filter_is_exact_and_absent_filter_admits_all() {
        let mut g = graph();
        let x = person(&mut g, "X");
        let y = person(&mut g, "Y");
        let active = link(&mut g, x, y, 5_000);
        let contested = g
            .upsert_relationship(
                RelationshipClaim::new(x, y, RelType::Knows, bp(5_000))
                    .with_status(RelStatus::Contested),
            )
            .expect("upsert");

        let only_active = g
            .neighborhood(&NeighborhoodQuery::new(x, 1).with_status(RelStatus::Active))
            .expect("query");
        let ids: Vec<_> = only_active.relationships.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![active]);

        let only_contested = g
            .neighborhood(&NeighborhoodQuery::new(x, 1).with_status(RelStatus::Contested))
            .expect("query");
        let ids: Vec<_> = only_contested.relationships.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![contested]);

        let all = g.neighborhood(&NeighborhoodQuery::new(x, 1)).expect("query");
        assert_eq!(all.relationships.len(), 2);
    }

    #[test]
    fn evidence_is_resolved_by_id() {
        let mut g = graph();
        let nate = person(&mut g, "Nate");
        let bros = g
            .upsert_entity(EntityType::Org, "Johnson Bros", Attributes::new())
            .expect("upsert");
        let e = g
            .upsert_evidence(SourceType::ChatMessage, "m1", "Nate owns Johnson Bros")
            .expect("evidence");
        g.upsert_relationship(
            RelationshipClaim::new(nate, bros, RelType::Owns, bp(8_000)).with_evidence(e),
        )
        .expect("upsert");

        let n = g.neighborhood(&NeighborhoodQuery::new(nate, 1)).expect("query");
        assert_eq!(
            n.evidence.get(&e).map(|ev| ev.source_excerpt.as_str()),
            Some("Nate owns Johnson Bros")
        );
        assert_eq!(n.stats.evidence_count, 1);
    }

    #[test]
    fn dangling_evidence_is_skipped() {
        let mut g = graph();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        g.upsert_relationship(
            RelationshipClaim::new(a, b, RelType::Knows, bp(5_000)).with_evidence(EvidenceId(99)),
        )
        .expect("upsert");
        let n = g.neighborhood(&NeighborhoodQuery::new(a, 1)).expect("query");
        assert_eq!(n.relationships.len(), 1);
        assert!(n.evidence.is_empty());
    }

    #[test]
    fn unknown_center_fails_fast() {
        let g = graph();
        assert!(matches!(
            g.neighborhood(&NeighborhoodQuery::new(EntityId(1), 2)),
            Err(MemexError::NotFound { .. })
        ));
    }

    #[test]
    fn requested_depth_is_echoed_and_walk_is_clamped() {
        let mut g = graph();
        let a = person(&mut g, "A");
        let n = g.neighborhood(&NeighborhoodQuery::new(a, 25)).expect("query");
        assert_eq!(n.stats.max_depth, 25);
        assert_eq!(n.stats.effective_depth, g.config().max_traversal_depth);
        assert_eq!(n.stats.depth_reached, 0);
    }

    #[test]
    fn clamped_walk_stops_at_configured_depth() {
        let mut g = graph();
        let mut prev = person(&mut g, "N0");
        let first = prev;
        for i in 1..=12 {
            let next = person(&mut g, &format!("N{i}"));
            link(&mut g, prev, next, 5_000);
            prev = next;
        }
        let n = g
            .neighborhood(&NeighborhoodQuery::new(first, 50))
            .expect("query");
        assert_eq!(n.stats.max_depth, 50);
        assert_eq!(n.stats.depth_reached, g.config().max_traversal_depth);
        assert!(!n.contains(prev));
    }
}
