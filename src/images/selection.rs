//! Host selection over live candidates.
//!
//! Hosts that already hold the artifact are preferred; among the preferred set
//! (or the whole pool when none qualifies) the choice is uniform random so
//! load spreads across equivalent hosts.

use std::collections::BTreeSet;

/// Live candidates in first-seen order, duplicates removed
pub fn live_candidates(candidates: &[String]) -> Vec<&String> {
    let mut seen = BTreeSet::new();
    candidates
        .iter()
        .filter(|host| !host.is_empty() && seen.insert(host.as_str()))
        .collect()
}

/// Candidates that already hold the artifact, or every candidate when none does
pub fn restrict_candidates<'a>(candidates: &[&'a String], known: &BTreeSet<String>) -> Vec<&'a String> {
    let cached: Vec<&String> = candidates
        .iter()
        .copied()
        .filter(|host| known.contains(host.as_str()))
        .collect();
    if cached.is_empty() {
        candidates.to_vec()
    } else {
        cached
    }
}

pub fn select_host(candidates: &[String], known: &BTreeSet<String>) -> Option<String> {
    select_host_with(&mut fastrand::Rng::new(), candidates, known)
}

pub fn select_host_with(
    rng: &mut fastrand::Rng,
    candidates: &[String],
    known: &BTreeSet<String>,
) -> Option<String> {
    let live = live_candidates(candidates);
    let pool = restrict_candidates(&live, known);
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.usize(..pool.len())].clone())
}

/// Live hosts other than `selected` that do not hold the artifact yet
pub fn seed_targets(candidates: &[String], known: &BTreeSet<String>, selected: &str) -> Vec<String> {
    live_candidates(candidates)
        .into_iter()
        .filter(|host| host.as_str() != selected && !known.contains(host.as_str()))
        .cloned()
        .collect()
}
