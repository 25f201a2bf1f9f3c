//! # memex-core
//!
//! The knowledge-graph engine behind Memex.
//!
//! It ingests facts observed elsewhere and keeps a durable graph of
//! entities and typed relationships with provenance, confidence and a
//! conflict workflow:
//!
//! - Identity resolution: spellings that normalize identically collapse to
//!   one entity (`canonical`)
//! - Idempotent accumulation: repeating a claim strengthens it instead of
//!   duplicating it (`relationships`)
//! - Temporal bookkeeping: first/last seen on every claim
//! - Conflict handling: a superseding claim demotes the earlier one to
//!   CONTESTED without destroying it (`conflict`)
//!
//! ## Architecture
//!
//! `KnowledgeGraph` is the facade. It is handed a `GraphStore` (in-memory
//! `MemoryStore` or disk-backed `RedbStore`, or `StorageBackend` to pick at
//! runtime) and a `Clock`. The crate is synchronous and has no network
//! dependencies; the `memex` app wraps it in a CLI and an HTTP server.

// =============================================================================
// MODULES
// =============================================================================

pub mod canonical;
pub mod clock;
pub mod conflict;
pub mod engine;
pub mod entities;
pub mod evidence;
pub mod ingestor;
pub mod memory;
pub mod primitives;
pub mod relationships;
pub mod stats;
pub mod storage;
pub mod store;
pub mod traversal;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AttrValue, Attributes, Confidence, Entity, EntityId, EntityType, Evidence, EvidenceId,
    MemexError, RecordKind, RelStatus, RelType, Relationship, RelationshipId, RelationshipKey,
    SourceType, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use canonical::{canonical_key, normalize};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{ContestOutcome, ContestedPair};
pub use engine::{EngineConfig, KnowledgeGraph};
pub use ingestor::{
    EntityFact, EntityRef, EvidenceFact, FactBatch, IngestReport, RelationshipFact,
};
pub use relationships::RelationshipClaim;
pub use stats::GraphStats;
pub use traversal::{Neighborhood, NeighborhoodQuery, NeighborhoodStats, NeighborNode};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use memory::MemoryStore;
pub use storage::{RedbStore, StorageBackend};
pub use store::{EdgeFilter, GraphStore, Incident};
