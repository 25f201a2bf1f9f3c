//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every layer of the engine:
//! - Record identifiers (`EntityId`, `RelationshipId`, `EvidenceId`)
//! - Closed enumerations (`EntityType`, `RelType`, `RelStatus`, `SourceType`)
//! - Fixed-point `Confidence` and microsecond `Timestamp`
//! - Open attribute values (`AttrValue`, `Attributes`)
//! - Error types (`MemexError`)
//!
//! ## Determinism Guarantees
//!
//! - Confidence is integer basis points; accumulation never touches floats
//! - Timestamps are integer microseconds since the Unix epoch
//! - Every key type implements `Ord` for deterministic `BTreeMap` ordering

mod records;

pub use records::{Entity, Evidence, Relationship, RelationshipKey};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::primitives::{CONFIDENCE_SCALE, CONFIDENCE_STEP};

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

/// Identifier of an entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Identifier of a relationship row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

/// Identifier of an evidence row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CLOSED ENUMERATIONS
// =============================================================================

/// Declares a closed enumeration with a fixed wire spelling.
///
/// Parsing is case-insensitive and trims surrounding whitespace; anything
/// outside the set is a `MemexError::Validation`.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The canonical wire spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MemexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $( $text => Ok(Self::$variant), )+
                    _ => Err(MemexError::Validation(format!(
                        "unknown {} '{}'",
                        $label, s
                    ))),
                }
            }
        }
    };
}

closed_enum! {
    /// Kind of real-world thing an entity stands for.
    EntityType, "entity type" {
        Person => "PERSON",
        Org => "ORG",
        Place => "PLACE",
        Event => "EVENT",
        Product => "PRODUCT",
        Topic => "TOPIC",
        Asset => "ASSET",
        Other => "OTHER",
    }
}

closed_enum! {
    /// Kind of claim a relationship makes. Direction is significant.
    RelType, "relationship type" {
        Knows => "KNOWS",
        WorksAt => "WORKS_AT",
        Manages => "MANAGES",
        Owns => "OWNS",
        Likes => "LIKES",
        Dislikes => "DISLIKES",
        LivesIn => "LIVES_IN",
        MemberOf => "MEMBER_OF",
        RelatedTo => "RELATED_TO",
        MentionedWith => "MENTIONED_WITH",
        ParentOf => "PARENT_OF",
        SpouseOf => "SPOUSE_OF",
        InvestsIn => "INVESTS_IN",
    }
}

closed_enum! {
    /// Lifecycle state of a relationship claim.
    #[derive(Default)]
    RelStatus, "relationship status" {
        /// The currently accepted belief.
        #[default]
        Active => "ACTIVE",
        /// Superseded by a competing claim; kept for review.
        Contested => "CONTESTED",
        /// Withdrawn.
        Retracted => "RETRACTED",
    }
}

closed_enum! {
    /// Where a piece of evidence was observed.
    SourceType, "source type" {
        ChatMessage => "CHAT_MESSAGE",
        Sms => "SMS",
        ExternalDoc => "EXTERNAL_DOC",
        MarketSignal => "MARKET_SIGNAL",
        UserInput => "USER_INPUT",
        System => "SYSTEM",
    }
}

// =============================================================================
// CONFIDENCE
// =============================================================================

/// Belief strength of a relationship claim, in basis points.
///
/// `10_000` basis points is a confidence of 1.0. Integer storage keeps
/// repeated reinforcement exact: `0.75` reinforced once is exactly `0.80`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Confidence(u16);

impl Confidence {
    /// No belief.
    pub const ZERO: Self = Self(0);

    /// Certainty. Reinforcement never exceeds this.
    pub const MAX: Self = Self(CONFIDENCE_SCALE);

    /// Build from basis points, rejecting values above `10_000`.
    pub fn from_basis_points(bp: u16) -> Result<Self, MemexError> {
        if bp > CONFIDENCE_SCALE {
            return Err(MemexError::Validation(format!(
                "confidence {} bp exceeds {}",
                bp, CONFIDENCE_SCALE
            )));
        }
        Ok(Self(bp))
    }

    /// Build from a unit-interval float (`0.0..=1.0`), rounding to the
    /// nearest basis point.
    #[allow(clippy::float_arithmetic)]
    pub fn from_unit(value: f64) -> Result<Self, MemexError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(MemexError::Validation(format!(
                "confidence {} is outside [0, 1]",
                value
            )));
        }
        Ok(Self((value * f64::from(CONFIDENCE_SCALE)).round() as u16))
    }

    /// The value as a unit-interval float, for presentation.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn as_unit(self) -> f64 {
        f64::from(self.0) / f64::from(CONFIDENCE_SCALE)
    }

    /// Raw basis points.
    #[must_use]
    pub const fn basis_points(self) -> u16 {
        self.0
    }

    /// One corroborating observation: `+0.05`, capped at `1.0`.
    #[must_use]
    pub const fn reinforce(self) -> Self {
        let raised = self.0.saturating_add(CONFIDENCE_STEP);
        if raised > CONFIDENCE_SCALE {
            Self::MAX
        } else {
            Self(raised)
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:04}",
            self.0 / CONFIDENCE_SCALE,
            self.0 % CONFIDENCE_SCALE
        )
    }
}

// =============================================================================
// TIMESTAMP
// =============================================================================

/// A UTC instant with microsecond resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wrap microseconds since the Unix epoch.
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the Unix epoch.
    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// The wall-clock instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    /// The smallest instant strictly after this one.
    #[must_use]
    pub const fn next_tick(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Convert to a chrono `DateTime`, if representable.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }

    /// ISO-8601 / RFC 3339 rendering with microsecond precision.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.to_datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

// =============================================================================
// OPEN ATTRIBUTE VALUES
// =============================================================================

/// A schemaless value stored in entity attributes and relationship
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

/// Open key → value map. Keys are kept sorted.
pub type Attributes = BTreeMap<String, AttrValue>;

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl AttrValue {
    /// The text payload, if this is a `Text` value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Which table a missing record was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Entity,
    Relationship,
    Evidence,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Entity => "Entity",
            Self::Relationship => "Relationship",
            Self::Evidence => "Evidence",
        })
    }
}

/// Errors that can occur in the Memex engine.
///
/// Lookups of single records report absence as `Ok(None)`; only the
/// operations that require a record to exist use `NotFound`.
#[derive(Debug, Error)]
pub enum MemexError {
    /// Input rejected at the ingestion boundary.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A record required by the operation does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: u64 },

    /// A unique index already holds the key being written.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// The backing store failed or rejected the operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error outside the store.
    #[error("I/O error: {0}")]
    Io(String),
}

impl MemexError {
    /// Shorthand for a missing entity.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::NotFound {
            kind: RecordKind::Entity,
            id: id.0,
        }
    }

    /// Shorthand for missing evidence.
    #[must_use]
    pub fn evidence_not_found(id: EvidenceId) -> Self {
        Self::NotFound {
            kind: RecordKind::Evidence,
            id: id.0,
        }
    }

    /// Shorthand for a missing relationship.
    #[must_use]
    pub fn relationship_not_found(id: RelationshipId) -> Self {
        Self::NotFound {
            kind: RecordKind::Relationship,
            id: id.0,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
