//! Position and waypoint identifiers
//!
//! A `WaypointId` names one allocation event of one replica. A `Position`
//! names one value slot inside that waypoint. Neither is ever reused.

use crate::ReplicaId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Globally unique id of a waypoint: `(creator, counter)`
///
/// # Ordering
///
/// Waypoints are ordered by creator first, then by counter. This order is
/// only used to break ties between sibling waypoints attached to the same
/// parent slot on the same side; the document order comes from the tree.
///
/// # Example
///
/// ```rust
/// use tree_fugue_core::crdt::tree_fugue::WaypointId;
///
/// let a = WaypointId::new("alice".to_string(), 7);
/// let b = WaypointId::new("bob".to_string(), 0);
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaypointId {
    /// Replica that allocated the waypoint
    pub creator: ReplicaId,

    /// Per-replica allocation counter
    pub counter: u64,
}

impl WaypointId {
    pub fn new(creator: ReplicaId, counter: u64) -> Self {
        Self { creator, counter }
    }

    /// Position of the slot at `offset` within this waypoint
    pub fn position(&self, offset: usize) -> Position {
        Position::new(self.creator.clone(), self.counter, offset)
    }
}

impl Ord for WaypointId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.creator.cmp(&other.creator) {
            Ordering::Equal => self.counter.cmp(&other.counter),
            other => other,
        }
    }
}

impl PartialOrd for WaypointId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for WaypointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.creator, self.counter)
    }
}

/// Immutable identifier of one element slot: `(creator, counter, offset)`
///
/// Every inserted element owns exactly one position for its whole lifetime,
/// including after it is deleted.
///
/// The textual form used for cross-replica anchors is JSON:
///
/// ```rust
/// use tree_fugue_core::crdt::tree_fugue::Position;
///
/// let pos = Position::new("alice".to_string(), 3, 1);
/// let json = pos.to_json();
/// assert_eq!(json, r#"{"creator":"alice","counter":3,"offset":1}"#);
/// assert_eq!(Position::from_json(&json).unwrap(), pos);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Replica that created the waypoint
    pub creator: ReplicaId,

    /// Waypoint counter
    pub counter: u64,

    /// Slot within the waypoint's values
    pub offset: usize,
}

impl Position {
    pub fn new(creator: ReplicaId, counter: u64, offset: usize) -> Self {
        Self {
            creator,
            counter,
            offset,
        }
    }

    /// Id of the waypoint this position lives in
    pub fn waypoint(&self) -> WaypointId {
        WaypointId::new(self.creator.clone(), self.counter)
    }

    /// Serialize to the textual anchor form
    pub fn to_json(&self) -> String {
        // A struct of a string and two integers always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the textual anchor form
    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s).map_err(|e| crate::TextError::InvalidPosition(e.to_string()))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.creator, self.counter, self.offset)
    }
}

/// Side of a parent slot a child waypoint attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}
