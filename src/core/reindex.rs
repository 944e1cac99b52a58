//! Position bookkeeping for annotations
//!
//! ufw renumbers rules densely after every delete, so an annotation keyed by
//! position drifts onto the wrong rule unless the mapping is shifted the same
//! way. These functions are pure: they take a mapping and return the mapping
//! that matches the firewall after the change.

use crate::core::metadata::Annotations;

/// Mapping after the rule at `deleted` was removed.
///
/// The entry at `deleted` is dropped, every entry above it moves down by one,
/// entries below it are unchanged.
pub fn reindex_after_delete(annotations: &Annotations, deleted: u32) -> Annotations {
    let mut next = annotations.clone();
    next.remove(deleted);
    next.shift_down(deleted);
    next
}

/// Mapping with every entry above `rule_count` removed.
///
/// Used when the firewall holds fewer rules than the mapping references,
/// e.g. after rules were deleted outside this tool.
pub fn prune_orphans(annotations: &Annotations, rule_count: usize) -> Annotations {
    let mut next = annotations.clone();
    next.truncate(rule_count);
    next
}
