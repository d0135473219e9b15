//! Waypoint: arena record of the position tree
//!
//! A waypoint owns the contiguous run of values one replica inserted in one
//! operation, plus any values that replica later appended at its tail.
//! Values are never removed; deletion clears the slot's bit in `present`.

use super::position::{Side, WaypointId};
use bitvec::prelude::*;
use std::collections::BTreeMap;

/// Index of a waypoint in the position source's arena
pub(crate) type WaypointIdx = usize;

/// Arena index of the synthetic root waypoint
pub(crate) const ROOT: WaypointIdx = 0;

/// Attachment of a waypoint to the slot it was created next to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Parent {
    pub idx: WaypointIdx,
    pub offset: usize,
    pub side: Side,
}

/// Tree node of the position source
///
/// # Traversal order
///
/// For a waypoint with `n` slots the document order of its subtree is
///
/// ```text
/// L(0) v(0) L(1) v(1) ... L(n-1) v(n-1) R(n-1) ... R(1) R(0)
/// ```
///
/// where `L(k)`/`R(k)` are the left/right child waypoints attached at slot
/// `k`, each list sorted by `WaypointId`. Slot `k + 1` therefore behaves as
/// the first right child of slot `k`, ahead of every other right child.
#[derive(Debug, Clone)]
pub(crate) struct Waypoint<T> {
    pub(crate) id: WaypointId,

    /// None only for the root
    pub(crate) parent: Option<Parent>,

    pub(crate) values: Vec<T>,

    /// Tombstone bits, one per slot (`true` = present)
    pub(crate) present: BitVec<u8, Lsb0>,

    /// Left children by parent slot
    pub(crate) left: BTreeMap<usize, Vec<WaypointIdx>>,

    /// Right children by parent slot
    pub(crate) right: BTreeMap<usize, Vec<WaypointIdx>>,

    /// Present values in this waypoint and all of its descendants
    pub(crate) total: usize,
}

impl<T> Waypoint<T> {
    pub(crate) fn new(id: WaypointId, parent: Parent) -> Self {
        Self {
            id,
            parent: Some(parent),
            values: Vec::new(),
            present: BitVec::new(),
            left: BTreeMap::new(),
            right: BTreeMap::new(),
            total: 0,
        }
    }

    /// The synthetic root: one permanently deleted slot whose right children
    /// are the waypoints inserted into an empty document.
    pub(crate) fn root() -> Self {
        Self {
            id: WaypointId::new(String::new(), 0),
            parent: None,
            values: Vec::new(),
            present: bitvec![u8, Lsb0; 0; 1],
            left: BTreeMap::new(),
            right: BTreeMap::new(),
            total: 0,
        }
    }

    /// Number of slots, deleted ones included
    pub(crate) fn len(&self) -> usize {
        self.present.len()
    }

    pub(crate) fn is_present(&self, offset: usize) -> bool {
        self.present.get(offset).map(|bit| *bit).unwrap_or(false)
    }

    /// Present slots in `[0, offset)`
    pub(crate) fn present_before(&self, offset: usize) -> usize {
        self.present[..offset.min(self.len())].count_ones()
    }

    /// Present slots in `[start, end)`
    pub(crate) fn present_between(&self, start: usize, end: usize) -> usize {
        self.present[start..end].count_ones()
    }

    /// First present run inside `[start, end)`, as a slot range
    pub(crate) fn next_run(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let run_start = start + self.present[start..end].first_one()?;
        let run_end = self.present[run_start..end]
            .first_zero()
            .map(|i| run_start + i)
            .unwrap_or(end);
        Some((run_start, run_end))
    }

    /// Offset of the `nth` present slot in `[start, end)`
    pub(crate) fn nth_present(&self, start: usize, end: usize, nth: usize) -> Option<usize> {
        self.present[start..end]
            .iter_ones()
            .nth(nth)
            .map(|i| start + i)
    }

    /// Append values at the tail, returns how many were added
    pub(crate) fn append(&mut self, values: impl IntoIterator<Item = T>) -> usize {
        let before = self.values.len();
        self.values.extend(values);
        let added = self.values.len() - before;
        self.present.resize(self.present.len() + added, true);
        added
    }

    /// Clear the slot's bit, returning its value if it was present
    pub(crate) fn tombstone(&mut self, offset: usize) -> Option<&T> {
        if !self.is_present(offset) {
            return None;
        }
        self.present.set(offset, false);
        self.values.get(offset)
    }

    pub(crate) fn children(&self, side: Side, offset: usize) -> &[WaypointIdx] {
        let map = match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        };
        map.get(&offset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn children_mut(&mut self, side: Side, offset: usize) -> &mut Vec<WaypointIdx> {
        let map = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        map.entry(offset).or_default()
    }
}
