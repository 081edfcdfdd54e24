//! Caching layer: stores, unit-of-work scopes and cache policies.
//!
//! # Responsibility
//! - Own the in-memory cache stores and their scope-local shadows.
//! - Define the policy strategies repositories consult on every operation.
//!
//! # Invariants
//! - Cache state mirrors confirmed store writes only; a failed write leaves
//!   the cache as it was.
//! - Scoped writes become globally visible on commit and never on rollback.

pub mod key;
pub mod policy;
pub mod scope;
pub mod store;
