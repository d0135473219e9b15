//! CRDT (Conflict-free Replicated Data Types) implementations
//!
//! # CRDTs Implemented
//!
//! - **Tree Fugue:** sequence CRDT for collaborative text editing
//!
//! # References
//!
//! - "A comprehensive study of CRDTs" by Marc Shapiro et al.
//! - "The Art of the Fugue" by Matthew Weidner and Martin Kleppmann

pub mod tree_fugue;

use crate::Result;

/// A list whose elements can be referenced by stable, serialized positions
///
/// A position taken from one replica resolves on any replica that has
/// received the element's insert, even after the element is deleted.
pub trait PositionedList {
    /// Number of present elements
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized position of the element at `index`
    fn get_position(&self, index: usize) -> Result<String>;

    /// Current index of a serialized position, and whether it is present
    ///
    /// For a deleted element the index is where it would be if it were
    /// still present.
    fn find_position(&self, position: &str) -> Result<(usize, bool)>;
}
