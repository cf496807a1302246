//! Entity prioritization — priority subset first, order preserved, deduped.

use crate::record::Entity;
use std::collections::HashSet;

/// Build the per-run entity sequence.
///
/// The priority subset is emitted first *in the order given* (not re-sorted),
/// followed by the remaining universe entities in their original order.
/// Duplicates collapse into the priority pass. A priority code missing from
/// the universe is still emitted — rankings may reference entities the
/// listing does not yet know about, and that is accepted rather than an
/// error. Output length is |universe ∪ priority|.
pub fn prioritize(universe: &[String], priority: &[String]) -> Vec<Entity> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(priority.len());
    let mut out = Vec::with_capacity(universe.len() + priority.len());

    for code in priority {
        if seen.insert(code.as_str()) {
            out.push(Entity::new(code.clone(), true));
        }
    }
    for code in universe {
        if seen.insert(code.as_str()) {
            out.push(Entity::new(code.clone(), false));
        }
    }
    out
}
