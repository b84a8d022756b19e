// src/diff.rs
//! New-item detection. Pure: no I/O, no clock.

use std::collections::HashSet;

use crate::item::Item;
use crate::tracker::SeenIds;

/// Result of comparing a fresh fetch against the previous seen set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<'a> {
    /// Items of the fresh window not seen before, in fetched order.
    pub new_items: Vec<&'a Item>,
    /// Exactly the ids of the fresh window.
    pub seen: SeenIds,
}

/// `fresh` must already be truncated to the poll window.
///
/// An empty `fresh` yields no new items and an empty seen set; callers must
/// not store that seen set (a transient empty page is not "everything sold").
pub fn diff<'a>(previous: &SeenIds, fresh: &'a [Item]) -> Diff<'a> {
    let mut emitted: HashSet<&str> = HashSet::new();
    let new_items = fresh
        .iter()
        .filter(|it| !previous.contains(&it.id) && emitted.insert(it.id.as_str()))
        .collect();

    Diff {
        new_items,
        seen: SeenIds::from_items(fresh),
    }
}
