use std::cmp::Ordering;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

/// Ranks `candidates` against `query` and returns the indices of the ones
/// that match, best first. Equal scores keep their input order.
pub fn rank<S: AsRef<str>>(matcher: &SkimMatcherV2, query: &str, candidates: &[S]) -> Vec<usize> {
    let normalized = query.trim().to_lowercase();
    if normalized.is_empty() {
        return (0..candidates.len()).collect();
    }

    let mut scored: Vec<(usize, i64)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let haystack = candidate.as_ref().to_lowercase();
            matcher
                .fuzzy_match(&haystack, &normalized)
                .map(|score| (index, score))
        })
        .collect();

    scored.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    scored.into_iter().map(|(index, _)| index).collect()
}
