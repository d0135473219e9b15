//! Tree Fugue: collaborative text with maximal non-interleaving
//!
//! This module implements the tree-based variant of the Fugue algorithm.
//! Concurrent insertions at the same place never interleave character by
//! character, whether they run forward or backward.
//!
//! # Architecture
//!
//! - **Position**: `(creator, counter, offset)` identifier of one value slot
//! - **Waypoint**: contiguous run of values from one insert, plus tombstone bits
//! - **PositionSource**: arena-backed tree of waypoints with subtree counts
//! - **TreeFugueText**: index-based editing, wire messages and events
//!
//! Sequential typing by one replica extends a single waypoint, so typing a
//! sentence allocates one waypoint instead of one node per character.
//!
//! # Example
//!
//! ```rust
//! use tree_fugue_core::crdt::tree_fugue::{MessageMeta, TreeFugueText};
//!
//! let mut text1 = TreeFugueText::new("client1".to_string());
//! let mut text2 = TreeFugueText::new("client2".to_string());
//!
//! // Concurrent inserts at the same place
//! text1.insert(0, "Hello").unwrap();
//! text2.insert(0, "World").unwrap();
//!
//! // Exchange
//! for m in text1.take_outbox() {
//!     text2.receive(&m, MessageMeta::remote("client1".to_string())).unwrap();
//! }
//! for m in text2.take_outbox() {
//!     text1.receive(&m, MessageMeta::remote("client2".to_string())).unwrap();
//! }
//!
//! // Both replicas converge, without interleaving
//! assert_eq!(text1.to_string(), "HelloWorld");
//! assert_eq!(text1.to_string(), text2.to_string());
//! ```
//!
//! # References
//!
//! - **Paper**: "The Art of the Fugue: Minimizing Interleaving in
//!   Collaborative Text Editing" (arXiv:2305.00583)

mod position;
mod source;
mod waypoint;

#[cfg(feature = "text")]
mod text;

pub use position::{Position, Side, WaypointId};
pub use source::{Allocation, Items, PositionSource};

#[cfg(feature = "text")]
pub use text::{MessageMeta, TextEvent, TreeFugueText};
