//! Cache key composition.
//!
//! # Responsibility
//! - Build per-entity and per-dataset cache keys from a type prefix.
//!
//! # Invariants
//! - An empty identifier token never produces a key, so it can never hit.
//! - The dataset key of a type cannot collide with any entity key.

use crate::model::entity::EntityId;

const DATASET_SUFFIX: &str = "__dataset";

/// Key for one entity under a per-type prefix.
///
/// Returns `None` when the identifier token is empty.
pub fn entity_key<I: EntityId>(prefix: &str, id: &I) -> Option<String> {
    let token = id.cache_token();
    if token.is_empty() {
        return None;
    }
    Some(format!("{prefix}{token}"))
}

/// Key holding the full-dataset entry of a type.
pub fn dataset_key(prefix: &str) -> String {
    format!("{prefix}{DATASET_SUFFIX}")
}
