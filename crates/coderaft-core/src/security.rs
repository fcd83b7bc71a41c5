//! Capability name normalization
//!
//! Normalizes the project configuration's `capabilities` list into the
//! uppercase, deduplicated form the engine's `CapAdd` expects.

use std::collections::BTreeSet;

/// Normalize a single capability name (trim, uppercase).
pub fn normalize_capability(cap: &str) -> String {
    cap.trim().to_uppercase()
}

/// Normalize and deduplicate a list of capability names, dropping blanks.
/// Deduplication also sorts the result, which keeps it deterministic for
/// fingerprinting and for tests.
pub fn normalize_capabilities(caps: &[String]) -> Vec<String> {
    let normalized: BTreeSet<String> = caps
        .iter()
        .map(|c| normalize_capability(c))
        .filter(|c| !c.is_empty())
        .collect();
    normalized.into_iter().collect()
}
