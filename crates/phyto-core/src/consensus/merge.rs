//! Stateless candidate merging and ranking.
//!
//! Kept separate from the engine so the merge/rank rules can be exercised
//! without any collaborator wiring. Candidate sets are single digits wide
//! in practice, so the linear duplicate scan is fine.

use std::cmp::Ordering;

use super::types::DiseaseCandidate;

/// Merges incoming candidates into the accumulated set, keyed by the
/// lower-cased trimmed name. Collisions take the max probability and keep
/// the first-written descriptive fields.
pub fn merge_into(accumulated: &mut Vec<DiseaseCandidate>, incoming: Vec<DiseaseCandidate>) {
    for candidate in incoming {
        let key = candidate.merge_key();
        match accumulated.iter_mut().find(|existing| existing.merge_key() == key) {
            Some(existing) => existing.absorb(candidate),
            None => accumulated.push(candidate),
        }
    }
}

/// Sorts candidates descending by probability (missing = 0), preserving
/// first-seen order on ties.
pub fn rank(candidates: &mut [DiseaseCandidate]) {
    // sort_by is stable, which is what gives ties their first-seen order
    candidates.sort_by(|a, b| {
        b.rank_probability().partial_cmp(&a.rank_probability()).unwrap_or(Ordering::Equal)
    });
}
