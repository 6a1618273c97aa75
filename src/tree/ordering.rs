//! # Ordering Engine
//!
//! Pure sibling-list and depth algorithms. Nothing here knows about books,
//! persistence or locking: callers hand in ordered id lists and lookups, and
//! get back positions and `(id, value)` assignments to write.
//!
//! A sibling list is a `Vec<ChapterId>` whose index *is* the `order` value,
//! so keeping the list compact keeps orders contiguous from zero.

use crate::models::ChapterId;

/// Clamp a requested position into `[0, len]`.
pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len)
}

/// Remove `id` from `siblings`, closing the gap. Returns its former index.
pub fn detach(siblings: &mut Vec<ChapterId>, id: ChapterId) -> Option<usize> {
    let position = siblings.iter().position(|sibling| *sibling == id)?;
    siblings.remove(position);
    Some(position)
}

/// Insert `id` at `index` (clamped), shifting later siblings up by one.
/// Returns the position actually used.
pub fn attach(siblings: &mut Vec<ChapterId>, id: ChapterId, index: usize) -> usize {
    let position = clamp_index(index, siblings.len());
    siblings.insert(position, id);
    position
}

/// Insert `replacement` at `position` (clamped), keeping its relative order.
pub fn splice_at(siblings: &mut Vec<ChapterId>, position: usize, replacement: &[ChapterId]) {
    let position = clamp_index(position, siblings.len());
    siblings.splice(position..position, replacement.iter().copied());
}

/// `order` assignment for every member of a sibling list.
pub fn renumber(siblings: &[ChapterId]) -> impl Iterator<Item = (ChapterId, u32)> + '_ {
    siblings
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index as u32))
}

/// Depth-first `level` assignment for the subtree rooted at `root`, where
/// every child sits one level below its parent.
pub fn subtree_levels<'a, F>(
    root: ChapterId,
    root_level: u32,
    children_of: F,
) -> Vec<(ChapterId, u32)>
where
    F: Fn(ChapterId) -> &'a [ChapterId],
{
    let mut assignments = Vec::new();
    let mut stack = vec![(root, root_level)];

    while let Some((id, level)) = stack.pop() {
        assignments.push((id, level));
        for child in children_of(id).iter().rev() {
            stack.push((*child, level + 1));
        }
    }

    assignments
}

/// Height of the subtree rooted at `root`; a leaf has height 0.
pub fn subtree_height<'a, F>(root: ChapterId, children_of: F) -> u32
where
    F: Fn(ChapterId) -> &'a [ChapterId],
{
    subtree_levels(root, 0, children_of)
        .into_iter()
        .map(|(_, depth)| depth)
        .max()
        .unwrap_or(0)
}

/// Whether re-parenting `moving` under `new_parent` would close a loop.
///
/// Walks the ancestors of `new_parent` to the root and reports a cycle if
/// `moving` is encountered. `max_steps` bounds the walk so corrupted parent
/// links cannot spin forever; exceeding it is reported as a cycle.
pub fn would_create_cycle<F>(
    moving: ChapterId,
    new_parent: Option<ChapterId>,
    max_steps: usize,
    parent_of: F,
) -> bool
where
    F: Fn(ChapterId) -> Option<ChapterId>,
{
    let mut cursor = new_parent;
    let mut steps = 0;

    while let Some(ancestor) = cursor {
        if ancestor == moving || steps > max_steps {
            return true;
        }
        cursor = parent_of(ancestor);
        steps += 1;
    }

    false
}
