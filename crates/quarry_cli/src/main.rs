//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `quarry_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("quarry_core ping={}", quarry_core::ping());
    println!("quarry_core version={}", quarry_core::core_version());
}
