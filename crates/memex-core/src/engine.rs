//! # Engine Facade
//!
//! `KnowledgeGraph` owns the injected store, the clock and the runtime
//! configuration. Operations are implemented in their own modules
//! (`entities`, `evidence`, `relationships`, `conflict`, `traversal`,
//! `stats`, `ingestor`) as further `impl` blocks on this type.

use crate::clock::{Clock, SystemClock};
use crate::memory::MemoryStore;
use crate::primitives::{DEFAULT_NEIGHBORHOOD_LIMIT, MAX_TRAVERSAL_DEPTH};
use crate::store::GraphStore;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Runtime tuning for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Visited-entity bound used when a neighborhood query gives none.
    pub default_neighborhood_limit: usize,
    /// Requested traversal depths are clamped to this.
    pub max_traversal_depth: usize,
    /// Upper bound on entity search results.
    pub max_search_limit: usize,
    /// Reject contest/retract of rows that are not ACTIVE.
    pub enforce_terminal_states: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_neighborhood_limit: DEFAULT_NEIGHBORHOOD_LIMIT,
            max_traversal_depth: 10,
            max_search_limit: 100,
            enforce_terminal_states: false,
        }
    }
}

impl EngineConfig {
    /// Effective traversal depth for a request.
    #[must_use]
    pub fn clamp_depth(&self, requested: usize) -> usize {
        requested.min(self.max_traversal_depth.min(MAX_TRAVERSAL_DEPTH))
    }
}

/// A record produced by an upsert, tagged with whether it was created.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Upserted<T> {
    pub(crate) record: T,
    pub(crate) created: bool,
}

impl<T> Upserted<T> {
    pub(crate) fn created(record: T) -> Self {
        Self {
            record,
            created: true,
        }
    }

    pub(crate) fn merged(record: T) -> Self {
        Self {
            record,
            created: false,
        }
    }
}

/// The knowledge-graph engine.
///
/// Generic over the storage backend and the clock so tests can run against
/// `MemoryStore` with a `ManualClock`.
#[derive(Debug)]
pub struct KnowledgeGraph<S, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
}

impl KnowledgeGraph<MemoryStore> {
    /// An empty in-memory graph on the system clock.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: GraphStore> KnowledgeGraph<S> {
    /// Wrap a store, reading time from the system clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: GraphStore, C: Clock> KnowledgeGraph<S, C> {
    /// Wrap a store with an explicit clock.
    #[must_use]
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Unwrap into the store.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Current instant.
    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Current instant, forced strictly after `prev`.
    pub(crate) fn now_after(&self, prev: Timestamp) -> Timestamp {
        self.clock.now().max(prev.next_tick())
    }
}
