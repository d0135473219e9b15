//! PositionSource: tree-based position allocator and index
//!
//! Owns the causal tree of waypoints, derives the total order from it and
//! maps between logical indices (present values only) and positions.
//!
//! # Algorithm
//!
//! A new run of values is attached next to the position `a` it was typed
//! after:
//!
//! 1. If `a` is the tail of a waypoint this replica created, the run
//!    extends that waypoint.
//! 2. If `a` has no right children (no later slot in its waypoint and no
//!    right child waypoints), the run becomes a right child of `a`.
//! 3. Otherwise the run becomes a left child of `b`, the position that
//!    currently follows `a` in the total order (tombstones included).
//!
//! Because a whole run lives in one waypoint, the traversal always visits
//! it as one block, so concurrent runs never interleave.
//!
//! # Complexity
//!
//! Every waypoint caches the number of present values in its subtree, so
//! index lookups skip whole subtrees. `len` is O(1).

use super::position::{Position, Side, WaypointId};
use super::waypoint::{Parent, Waypoint, WaypointIdx, ROOT};
use crate::error::{Result, TextError};
use crate::protocol::serialize::{decode_message, decode_metadata, encode_message, encode_metadata};
use crate::protocol::{PositionSourceSave, WaypointSave};
use crate::ReplicaId;
use bitvec::prelude::*;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Result of `create_positions`: everything a replica needs to place the
/// new run in its own tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Counter of the new or extended waypoint
    pub counter: u64,

    /// Offset of the first new value within the waypoint
    pub start_offset: usize,

    /// Encoded parent attachment, None for extensions and root children
    pub metadata: Option<Vec<u8>>,
}

/// Tree-based position source over values of type `T`
///
/// # Example
///
/// ```rust
/// use tree_fugue_core::crdt::tree_fugue::{Position, PositionSource};
///
/// let mut source = PositionSource::new("alice".to_string());
/// let alloc = source.create_positions(None).unwrap();
/// let start = Position::new("alice".to_string(), alloc.counter, alloc.start_offset);
/// source
///     .receive_and_add_positions(&start, "hi".chars(), alloc.metadata.as_deref())
///     .unwrap();
///
/// assert_eq!(source.len(), 2);
/// assert_eq!(source.find_position(&start).unwrap(), (0, true));
/// ```
#[derive(Debug, Clone)]
pub struct PositionSource<T> {
    replica_id: ReplicaId,

    /// Arena; parents always precede their children
    waypoints: Vec<Waypoint<T>>,

    /// (creator, counter) -> arena index
    by_id: HashMap<ReplicaId, HashMap<u64, WaypointIdx>>,

    /// Next counter for a waypoint created by this replica
    next_counter: u64,

    /// Present values in the whole tree
    length: usize,
}

impl<T: Clone> PositionSource<T> {
    /// Create an empty position source for the given replica
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            waypoints: vec![Waypoint::root()],
            by_id: HashMap::new(),
            next_counter: 0,
            length: 0,
        }
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Number of present (non-deleted) values
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of waypoints, excluding the root
    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Allocate positions for a run inserted right after `prev`
    /// (None = at the start)
    ///
    /// Only the local counter changes here; the tree itself is updated when
    /// the resulting operation is applied through
    /// `receive_and_add_positions`, which is also what remote replicas do.
    ///
    /// # Errors
    ///
    /// Returns `TextError::UnknownPosition` if `prev` is not in the tree.
    pub fn create_positions(&mut self, prev: Option<&Position>) -> Result<Allocation> {
        let first_root_child = self.waypoints[ROOT].children(Side::Right, 0).first().copied();
        let (anchor, side) = match prev {
            None => match first_root_child {
                Some(first) => (self.leftmost_slot(first, 0), Side::Left),
                None => {
                    let counter = self.allocate_counter();
                    tracing::debug!(counter, "New waypoint under root");
                    return Ok(Allocation {
                        counter,
                        start_offset: 0,
                        metadata: None,
                    });
                }
            },
            Some(pos) => {
                let (idx, offset) = self.resolve(pos)?;
                let waypoint = &self.waypoints[idx];

                if offset + 1 == waypoint.len() && waypoint.id.creator == self.replica_id {
                    // Fast path: grow our own waypoint at its tail
                    tracing::debug!(counter = waypoint.id.counter, "Extending waypoint");
                    return Ok(Allocation {
                        counter: waypoint.id.counter,
                        start_offset: waypoint.len(),
                        metadata: None,
                    });
                }

                if offset + 1 < waypoint.len() {
                    (self.leftmost_slot(idx, offset + 1), Side::Left)
                } else if let Some(&first) = waypoint.children(Side::Right, offset).first() {
                    (self.leftmost_slot(first, 0), Side::Left)
                } else {
                    ((idx, offset), Side::Right)
                }
            }
        };

        let parent = self.waypoints[anchor.0].id.position(anchor.1);
        let counter = self.allocate_counter();
        tracing::debug!(counter, %parent, ?side, "New waypoint");

        Ok(Allocation {
            counter,
            start_offset: 0,
            metadata: Some(encode_metadata(&parent, side)),
        })
    }

    /// Apply an insertion of `values` starting at `pos`
    ///
    /// Creates the waypoint `(pos.creator, pos.counter)` under the parent
    /// described by `metadata`, or appends to it if it already exists.
    ///
    /// # Errors
    ///
    /// - `TextError::MissingParent` if the parent position is unknown
    /// - `TextError::NonContiguousInsert` if `pos.offset` is not the tail of
    ///   the waypoint (out-of-order or duplicate delivery)
    ///
    /// The tree is unchanged when an error is returned.
    pub fn receive_and_add_positions(
        &mut self,
        pos: &Position,
        values: impl IntoIterator<Item = T>,
        metadata: Option<&[u8]>,
    ) -> Result<()> {
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return Ok(());
        }

        if let Some(idx) = self.lookup(&pos.creator, pos.counter) {
            let expected = self.waypoints[idx].len();
            if pos.offset != expected {
                return Err(TextError::NonContiguousInsert {
                    creator: pos.creator.clone(),
                    counter: pos.counter,
                    offset: pos.offset,
                    expected,
                });
            }
            let added = self.waypoints[idx].append(values);
            self.add_present(idx, added);
            tracing::trace!(%pos, added, "Extended waypoint");
            return Ok(());
        }

        if pos.offset != 0 {
            return Err(TextError::NonContiguousInsert {
                creator: pos.creator.clone(),
                counter: pos.counter,
                offset: pos.offset,
                expected: 0,
            });
        }

        let parent = match metadata {
            None => Parent {
                idx: ROOT,
                offset: 0,
                side: Side::Right,
            },
            Some(bytes) => {
                let (parent_pos, side) = decode_metadata(bytes)?;
                let (idx, offset) =
                    self.resolve(&parent_pos)
                        .map_err(|_| TextError::MissingParent {
                            creator: pos.creator.clone(),
                            counter: pos.counter,
                            parent: parent_pos.clone(),
                        })?;
                Parent { idx, offset, side }
            }
        };

        let id = pos.waypoint();
        let mut waypoint = Waypoint::new(id.clone(), parent);
        let added = waypoint.append(values);
        let idx = self.waypoints.len();
        self.waypoints.push(waypoint);
        self.attach(idx, parent);
        self.register(id, idx);
        self.add_present(idx, added);

        tracing::trace!(%pos, added, "Added waypoint");
        Ok(())
    }

    /// Position of the present value at `index`
    ///
    /// # Errors
    ///
    /// Returns `TextError::IndexOutOfBounds` if `index >= len()`.
    pub fn get_position(&self, index: usize) -> Result<Position> {
        let (idx, offset) = self.locate(index).ok_or(TextError::IndexOutOfBounds {
            index,
            length: self.length,
        })?;
        Ok(self.waypoints[idx].id.position(offset))
    }

    /// Present value at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        let (idx, offset) = self.locate(index)?;
        self.waypoints[idx].values.get(offset)
    }

    /// Locate `pos` in the logical index space
    ///
    /// Returns the number of present values before `pos` (the smallest index
    /// `>=` its rank) and whether `pos` itself is present. For a deleted
    /// position this is the index its value would have if it were restored.
    ///
    /// # Errors
    ///
    /// Returns `TextError::UnknownPosition` if `pos` is not in the tree.
    pub fn find_position(&self, pos: &Position) -> Result<(usize, bool)> {
        let (idx, offset) = self.resolve(pos)?;
        Ok((self.rank(idx, offset), self.waypoints[idx].is_present(offset)))
    }

    /// Tombstone the value at `pos`
    ///
    /// Returns the value if it was present. Deleting an already-deleted or
    /// unknown position is a no-op returning None.
    pub fn delete(&mut self, pos: &Position) -> Option<T> {
        let Some(idx) = self.lookup(&pos.creator, pos.counter) else {
            tracing::warn!(%pos, "Delete of unknown waypoint ignored");
            return None;
        };
        if pos.offset >= self.waypoints[idx].len() {
            tracing::warn!(%pos, "Delete past waypoint tail ignored");
            return None;
        }

        let value = self.waypoints[idx].tombstone(pos.offset).cloned();
        if value.is_some() {
            self.remove_present(idx, 1);
        }
        value
    }

    /// Contiguous runs of present values in document order
    ///
    /// Each call starts a fresh traversal.
    pub fn items(&self) -> Items<'_, T> {
        Items {
            runs: SlotRuns::new(self, false),
        }
    }

    /// Structural save: waypoint ids, attachments, slot counts and tombstone
    /// bitmaps, without values
    ///
    /// Values are produced separately by `saved_values`, in document order,
    /// and handed back to `load` through its supplier.
    pub fn save(&self) -> Result<Bytes> {
        let waypoints = self.waypoints[1..]
            .iter()
            .map(|w| {
                // Arena index == 1 + save index, root stays 0
                let parent = w.parent.unwrap_or(Parent {
                    idx: ROOT,
                    offset: 0,
                    side: Side::Right,
                });
                WaypointSave {
                    creator: w.id.creator.clone(),
                    counter: w.id.counter,
                    parent: parent.idx as u64,
                    parent_offset: parent.offset as u64,
                    left: parent.side == Side::Left,
                    length: w.len() as u64,
                    present: w.present.as_raw_slice().to_vec(),
                }
            })
            .collect();

        let bytes = encode_message(&PositionSourceSave { waypoints })?;
        tracing::debug!(
            waypoints = self.waypoint_count(),
            bytes = bytes.len(),
            "Saved position source"
        );
        Ok(bytes)
    }

    /// Every value slot, deleted ones included, as runs in document order
    pub fn saved_values(&self) -> impl Iterator<Item = &[T]> + '_ {
        SlotRuns::new(self, true).map(move |(idx, range)| &self.waypoints[idx].values[range])
    }

    /// Replace this source's state with a save produced by `save`
    ///
    /// `next_values(count)` is called once per run of `saved_values`, in
    /// document order, and must return exactly `count` values.
    ///
    /// # Errors
    ///
    /// Returns `TextError::InvalidSave` if the blob is malformed or the
    /// supplier runs short. The source is unchanged on error.
    pub fn load(
        &mut self,
        data: &[u8],
        mut next_values: impl FnMut(usize) -> Vec<T>,
    ) -> Result<()> {
        let save: PositionSourceSave =
            decode_message(data).map_err(|e| TextError::InvalidSave(e.to_string()))?;

        let mut fresh = Self::new(self.replica_id.clone());
        for saved in save.waypoints {
            let idx = fresh.waypoints.len();
            let parent_idx = saved.parent as usize;
            if parent_idx >= idx {
                return Err(TextError::InvalidSave(format!(
                    "waypoint {} has parent {} saved after it",
                    idx, parent_idx
                )));
            }
            let offset = saved.parent_offset as usize;
            if offset >= fresh.waypoints[parent_idx].len() {
                return Err(TextError::InvalidSave(format!(
                    "parent offset {} out of range for waypoint {}",
                    offset, idx
                )));
            }
            let parent = Parent {
                idx: parent_idx,
                offset,
                side: if saved.left { Side::Left } else { Side::Right },
            };

            let length = saved.length as usize;
            let mut present = BitVec::<u8, Lsb0>::from_vec(saved.present);
            if present.len() < length {
                return Err(TextError::InvalidSave(format!(
                    "tombstone bitmap too short for waypoint {}",
                    idx
                )));
            }
            present.truncate(length);

            let id = WaypointId::new(saved.creator, saved.counter);
            if fresh.lookup(&id.creator, id.counter).is_some() {
                return Err(TextError::InvalidSave(format!("duplicate waypoint {}", id)));
            }

            let mut waypoint = Waypoint::new(id.clone(), parent);
            waypoint.present = present;
            fresh.waypoints.push(waypoint);
            fresh.attach(idx, parent);
            fresh.register(id, idx);
        }

        // Children come after parents, so one reverse pass sums subtrees
        for idx in (0..fresh.waypoints.len()).rev() {
            let waypoint = &mut fresh.waypoints[idx];
            waypoint.total += waypoint.present.count_ones();
            let total = waypoint.total;
            if let Some(parent) = waypoint.parent {
                fresh.waypoints[parent.idx].total += total;
            }
        }
        fresh.length = fresh.waypoints[ROOT].total;

        // A waypoint's slots come up in ascending order, so appending fills it
        let runs: Vec<(WaypointIdx, Range<usize>)> = SlotRuns::new(&fresh, true).collect();
        for (idx, range) in runs {
            let count = range.len();
            let values = next_values(count);
            if values.len() != count {
                return Err(TextError::InvalidSave(format!(
                    "expected {} values for waypoint {}, got {}",
                    count,
                    idx,
                    values.len()
                )));
            }
            fresh.waypoints[idx].values.extend(values);
        }
        fresh.next_counter = fresh.next_counter.max(self.next_counter);

        tracing::debug!(
            waypoints = fresh.waypoint_count(),
            length = fresh.length,
            "Loaded position source"
        );
        *self = fresh;
        Ok(())
    }

    fn allocate_counter(&mut self) -> u64 {
        let counter = self.next_counter;
        self.next_counter += 1;
        counter
    }

    fn lookup(&self, creator: &str, counter: u64) -> Option<WaypointIdx> {
        self.by_id.get(creator)?.get(&counter).copied()
    }

    fn resolve(&self, pos: &Position) -> Result<(WaypointIdx, usize)> {
        match self.lookup(&pos.creator, pos.counter) {
            Some(idx) if pos.offset < self.waypoints[idx].len() => Ok((idx, pos.offset)),
            _ => Err(TextError::UnknownPosition(pos.clone())),
        }
    }

    fn register(&mut self, id: WaypointId, idx: WaypointIdx) {
        if id.creator == self.replica_id {
            self.next_counter = self.next_counter.max(id.counter + 1);
        }
        self.by_id
            .entry(id.creator)
            .or_default()
            .insert(id.counter, idx);
    }

    /// Insert `idx` into its parent's child list, keeping siblings sorted by id
    fn attach(&mut self, idx: WaypointIdx, parent: Parent) {
        let at = {
            let id = &self.waypoints[idx].id;
            self.waypoints[parent.idx]
                .children(parent.side, parent.offset)
                .partition_point(|&sibling| self.waypoints[sibling].id < *id)
        };
        self.waypoints[parent.idx]
            .children_mut(parent.side, parent.offset)
            .insert(at, idx);
    }

    fn add_present(&mut self, idx: WaypointIdx, count: usize) {
        let mut current = Some(idx);
        while let Some(i) = current {
            self.waypoints[i].total += count;
            current = self.waypoints[i].parent.map(|p| p.idx);
        }
        self.length += count;
    }

    fn remove_present(&mut self, idx: WaypointIdx, count: usize) {
        let mut current = Some(idx);
        while let Some(i) = current {
            self.waypoints[i].total -= count;
            current = self.waypoints[i].parent.map(|p| p.idx);
        }
        self.length -= count;
    }

    /// First slot visited in the subtree starting at `(idx, offset)`
    fn leftmost_slot(&self, mut idx: WaypointIdx, mut offset: usize) -> (WaypointIdx, usize) {
        while let Some(&first) = self.waypoints[idx].children(Side::Left, offset).first() {
            idx = first;
            offset = 0;
        }
        (idx, offset)
    }

    fn subtree_totals<'a>(
        &self,
        lists: impl Iterator<Item = (&'a usize, &'a Vec<WaypointIdx>)>,
    ) -> usize {
        lists
            .flat_map(|(_, children)| children)
            .map(|&child| self.waypoints[child].total)
            .sum()
    }

    /// Present values strictly before slot `(idx, offset)`
    fn rank(&self, idx: WaypointIdx, offset: usize) -> usize {
        let waypoint = &self.waypoints[idx];
        let mut before =
            waypoint.present_before(offset) + self.subtree_totals(waypoint.left.range(..=offset));

        let mut child = idx;
        while let Some(parent) = self.waypoints[child].parent {
            let p = &self.waypoints[parent.idx];
            before += p
                .children(parent.side, parent.offset)
                .iter()
                .take_while(|&&sibling| sibling != child)
                .map(|&sibling| self.waypoints[sibling].total)
                .sum::<usize>();

            before += match parent.side {
                Side::Left => {
                    p.present_before(parent.offset)
                        + self.subtree_totals(p.left.range(..parent.offset))
                }
                Side::Right => {
                    p.present_before(p.len())
                        + self.subtree_totals(p.left.iter())
                        + self.subtree_totals(p.right.range(parent.offset + 1..))
                }
            };
            child = parent.idx;
        }
        before
    }

    /// Slot of the present value at `index`
    fn locate(&self, index: usize) -> Option<(WaypointIdx, usize)> {
        if index >= self.length {
            return None;
        }
        let mut remaining = index;
        let mut idx = ROOT;

        'descend: loop {
            let waypoint = &self.waypoints[idx];

            // L(k) v(k) for ascending k
            let mut slot = 0;
            for (&offset, children) in &waypoint.left {
                let count = waypoint.present_between(slot, offset);
                if remaining < count {
                    return waypoint
                        .nth_present(slot, offset, remaining)
                        .map(|o| (idx, o));
                }
                remaining -= count;
                for &child in children {
                    let total = self.waypoints[child].total;
                    if remaining < total {
                        idx = child;
                        continue 'descend;
                    }
                    remaining -= total;
                }
                slot = offset;
            }
            let count = waypoint.present_between(slot, waypoint.len());
            if remaining < count {
                return waypoint
                    .nth_present(slot, waypoint.len(), remaining)
                    .map(|o| (idx, o));
            }
            remaining -= count;

            // R(k) for descending k
            for children in waypoint.right.values().rev() {
                for &child in children {
                    let total = self.waypoints[child].total;
                    if remaining < total {
                        idx = child;
                        continue 'descend;
                    }
                    remaining -= total;
                }
            }

            tracing::error!(index, "Subtree totals out of sync with tree");
            return None;
        }
    }
}

/// Traversal state of one waypoint in `Items`
#[derive(Debug, Clone, Copy)]
enum Step {
    /// Emit present runs in `[slot, end)`; `end` is the next slot with left
    /// children, or the waypoint length
    Values { slot: usize, end: usize },
    /// Visit child `next` of the list at `(side, offset)`
    Children {
        side: Side,
        offset: usize,
        next: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    idx: WaypointIdx,
    step: Step,
}

impl Frame {
    fn enter<T>(waypoint: &Waypoint<T>, idx: WaypointIdx) -> Self {
        Self {
            idx,
            step: Step::Values {
                slot: 0,
                end: next_left_slot(waypoint, 0),
            },
        }
    }
}

/// First slot `>= from` that has left children
fn next_left_slot<T>(waypoint: &Waypoint<T>, from: usize) -> usize {
    waypoint
        .left
        .range(from..)
        .next()
        .map(|(&offset, _)| offset)
        .unwrap_or(waypoint.len())
}

/// Highest slot `< below` that has right children
fn prev_right_slot(right: &BTreeMap<usize, Vec<WaypointIdx>>, below: usize) -> Option<usize> {
    right.range(..below).next_back().map(|(&offset, _)| offset)
}

/// Depth-first walk yielding slot ranges of one waypoint at a time, in
/// document order
#[derive(Debug, Clone)]
struct SlotRuns<'a, T> {
    source: &'a PositionSource<T>,
    stack: Vec<Frame>,

    /// Yield tombstoned slots too (the root's slot never)
    with_deleted: bool,
}

impl<'a, T> SlotRuns<'a, T> {
    fn new(source: &'a PositionSource<T>, with_deleted: bool) -> Self {
        Self {
            source,
            stack: vec![Frame::enter(&source.waypoints[ROOT], ROOT)],
            with_deleted,
        }
    }
}

impl<'a, T> Iterator for SlotRuns<'a, T> {
    type Item = (WaypointIdx, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source;
        loop {
            let frame = self.stack.last_mut()?;
            let idx = frame.idx;
            let waypoint = &source.waypoints[idx];

            match frame.step {
                Step::Values { slot, end } => {
                    let run = if self.with_deleted && idx != ROOT {
                        (slot < end).then_some((slot, end))
                    } else {
                        waypoint.next_run(slot, end)
                    };
                    match run {
                        Some((start, stop)) => {
                            frame.step = Step::Values { slot: stop, end };
                            return Some((idx, start..stop));
                        }
                        None if end < waypoint.len() => {
                            frame.step = Step::Children {
                                side: Side::Left,
                                offset: end,
                                next: 0,
                            };
                        }
                        None => match prev_right_slot(&waypoint.right, waypoint.len()) {
                            Some(offset) => {
                                frame.step = Step::Children {
                                    side: Side::Right,
                                    offset,
                                    next: 0,
                                };
                            }
                            None => {
                                self.stack.pop();
                            }
                        },
                    }
                }
                Step::Children { side, offset, next } => {
                    if let Some(&child) = waypoint.children(side, offset).get(next) {
                        frame.step = Step::Children {
                            side,
                            offset,
                            next: next + 1,
                        };
                        self.stack
                            .push(Frame::enter(&source.waypoints[child], child));
                        continue;
                    }
                    match side {
                        Side::Left => {
                            frame.step = Step::Values {
                                slot: offset,
                                end: next_left_slot(waypoint, offset + 1),
                            };
                        }
                        Side::Right => match prev_right_slot(&waypoint.right, offset) {
                            Some(prev) => {
                                frame.step = Step::Children {
                                    side: Side::Right,
                                    offset: prev,
                                    next: 0,
                                };
                            }
                            None => {
                                self.stack.pop();
                            }
                        },
                    }
                }
            }
        }
    }
}

/// Lazy iterator over runs of present values, see `PositionSource::items`
#[derive(Debug, Clone)]
pub struct Items<'a, T> {
    runs: SlotRuns<'a, T>,
}

impl<'a, T> Iterator for Items<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.runs.source;
        let (idx, range) = self.runs.next()?;
        Some(&source.waypoints[idx].values[range])
    }
}
