//! Error types for the tree-fugue core

use crate::crdt::tree_fugue::Position;
use thiserror::Error;

/// Errors surfaced by the position source and the text document.
///
/// Bounds and protocol errors are programmer errors and are reported
/// synchronously; nothing in the core retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// Index past the end of the logical sequence
    #[error("Index {index} out of bounds (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    /// Delete range past the end of the logical sequence
    #[error("(start + count) out of bounds: {start} + {count} (length: {length})")]
    RangeOutOfBounds {
        start: usize,
        count: usize,
        length: usize,
    },

    /// Position never seen by this replica
    #[error("Unknown position: {0}")]
    UnknownPosition(Position),

    /// Insert whose parent position is not in the tree yet
    #[error("Parent {parent} of waypoint {creator}@{counter} is not known")]
    MissingParent {
        creator: String,
        counter: u64,
        parent: Position,
    },

    /// Insert that does not start at the waypoint's current tail
    #[error("Insert into {creator}@{counter} at offset {offset}, expected {expected}")]
    NonContiguousInsert {
        creator: String,
        counter: u64,
        offset: usize,
        expected: usize,
    },

    /// Malformed or unrecognized operation message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialized position that does not parse
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Malformed save data
    #[error("Invalid save data: {0}")]
    InvalidSave(String),

    /// Operation this document type does not implement
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Result type alias for tree-fugue operations
pub type Result<T> = std::result::Result<T, TextError>;
