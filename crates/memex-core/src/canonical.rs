//! # Canonicalizer
//!
//! Maps `(entity type, raw name)` to the canonical key that decides entity
//! identity. This is the only conflation mechanism: two spellings are the
//! same entity exactly when they normalize to the same string.

use crate::EntityType;
use crate::primitives::CANONICAL_KEY_SEPARATOR;

/// Normalize a raw name.
///
/// Lowercases, turns hyphens into spaces, drops ASCII punctuation, and
/// collapses runs of whitespace to a single space with no leading or
/// trailing whitespace. Non-ASCII letters are kept as-is (after
/// lowercasing).
///
/// Punctuation is removed before whitespace is collapsed, so `"A . B"`
/// becomes `"a b"` rather than keeping a double space. `_` counts as
/// punctuation and is dropped, not turned into a space.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            '-' => Some(' '),
            c if c.is_ascii_punctuation() => None,
            c => Some(c),
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical key: `TYPE:normalized name`.
#[must_use]
pub fn canonical_key(entity_type: EntityType, raw: &str) -> String {
    format!(
        "{}{}{}",
        entity_type.as_str(),
        CANONICAL_KEY_SEPARATOR,
        normalize(raw)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spelling_variants_collapse() {
        assert_eq!(normalize("Nate Johnson"), "nate johnson");
        assert_eq!(normalize("  NATE  johnson "), "nate johnson");
        assert_eq!(normalize("Nate-Johnson"), "nate johnson");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(normalize("Johnson Bros."), "johnson bros");
        assert_eq!(normalize("O'Brien & Sons, Inc."), "obrien sons inc");
    }

    #[test]
    fn hyphen_runs_become_one_space() {
        assert_eq!(normalize("Jean--Luc"), "jean luc");
        assert_eq!(normalize("- leading"), "leading");
    }

    #[test]
    fn stripped_punctuation_leaves_no_double_space() {
        assert_eq!(normalize("Smith . Jones"), "smith jones");
        assert_eq!(normalize("A & B"), "a b");
    }

    #[test]
    fn underscore_is_dropped() {
        assert_eq!(normalize("nate_johnson"), "natejohnson");
    }

    #[test]
    fn tabs_and_newlines_collapse() {
        assert_eq!(normalize("Acme\t\nCorp"), "acme corp");
    }

    #[test]
    fn non_ascii_letters_survive() {
        assert_eq!(normalize("Café Müller"), "café müller");
    }

    #[test]
    fn empty_and_punctuation_only_normalize_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" ... "), "");
    }

    #[test]
    fn canonical_key_prefixes_type() {
        assert_eq!(
            canonical_key(EntityType::Person, "Nate-Johnson"),
            "PERSON:nate johnson"
        );
        assert_ne!(
            canonical_key(EntityType::Person, "Mercury"),
            canonical_key(EntityType::Place, "Mercury")
        );
    }
}
