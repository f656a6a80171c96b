//! Pure cascade checks over a fetched ancestor path.
//!
//! The manager fetches the path through the store; the checks here are pure
//! over the fetched records so every invariant is unit-testable without a
//! store. Walks are iterative and bounded; the store's ancestor listing
//! already refuses to follow a reference twice, and the duplicate check
//! here catches what slips through.

use std::collections::HashSet;

use procura_core::{DelegationId, PowerDelegation, ProcuraError, Result};

/// Check the structural cascade invariants for `start` with its fetched
/// ancestors (nearest parent first).
///
/// On success returns the hop count from `start` to the root. Fails closed:
/// any inactive ancestor, duplicate id, missing root, or over-deep chain is
/// a `CascadeBroken` denial.
pub fn check_cascade(
    start: &PowerDelegation,
    ancestors: &[PowerDelegation],
    max_depth: u8,
) -> Result<u8> {
    let mut seen: HashSet<DelegationId> = HashSet::with_capacity(ancestors.len() + 1);
    seen.insert(start.id);
    for ancestor in ancestors {
        if !seen.insert(ancestor.id) {
            return Err(ProcuraError::cascade_broken(format!(
                "delegation {} appears twice in its own ancestor chain",
                ancestor.id
            )));
        }
    }

    for record in std::iter::once(start).chain(ancestors.iter()) {
        if !record.status.is_active() {
            return Err(ProcuraError::cascade_broken(format!(
                "delegation {} in cascade is {}",
                record.id, record.status
            )));
        }
    }

    let root = ancestors.last().unwrap_or(start);
    if !root.is_root() {
        // The walk stopped before reaching a parentless record: a parent
        // reference points at a missing delegation, or the chain is deeper
        // than the walk limit allows.
        return Err(ProcuraError::cascade_broken(format!(
            "cascade from {} does not reach a root delegation",
            start.id
        )));
    }

    let depth = ancestors.len();
    if depth > usize::from(max_depth) {
        return Err(ProcuraError::cascade_broken(format!(
            "cascade from {} is {depth} hops deep, max {max_depth}",
            start.id
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(depth as u8)
}
