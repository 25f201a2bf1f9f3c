//! # Engine Primitives
//!
//! Hardcoded constants for the Memex engine. These are compiled into the
//! binary; runtime tuning goes through `EngineConfig`.

/// Basis points in a confidence of 1.0.
pub const CONFIDENCE_SCALE: u16 = 10_000;

/// Confidence added by each repeated observation of an identical claim
/// (0.05).
pub const CONFIDENCE_STEP: u16 = 500;

/// Separator between entity type and normalized name in a canonical key.
pub const CANONICAL_KEY_SEPARATOR: char = ':';

/// Default bound on distinct entities visited by a neighborhood query.
pub const DEFAULT_NEIGHBORHOOD_LIMIT: usize = 100;

/// Hard ceiling on traversal depth regardless of configuration.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Default cap on entity search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for entity names, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length for evidence source ids, in bytes.
pub const MAX_SOURCE_ID_LENGTH: usize = 256;

/// Maximum length for evidence excerpts (64KB).
pub const MAX_EXCERPT_LENGTH: usize = 65536;

/// Maximum number of attribute or property keys on one record.
pub const MAX_ATTRIBUTE_KEYS: usize = 128;

/// Maximum number of facts (entities + evidence + relationships) in one
/// ingestion batch.
pub const MAX_BATCH_FACTS: usize = 10000;
