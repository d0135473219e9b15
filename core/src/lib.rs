//! Tree Fugue Core - Collaborative text CRDT
//!
//! A replica-local sequence CRDT for plain text, based on the tree variant
//! of Fugue. It implements:
//! - Position allocation and ordering (`PositionSource`)
//! - Index-based text editing with change events (`TreeFugueText`)
//! - Binary protocol encoding/decoding for operations and saves
//!
//! Delivery is the host's job: operations must reach every replica in
//! causal order, each insert exactly once.
//!
//! # Examples
//!
//! ```rust
//! use tree_fugue_core::{random_replica_id, TreeFugueText};
//!
//! let mut text = TreeFugueText::new(random_replica_id());
//! text.insert(0, "Hello World").unwrap();
//! text.delete(5, 6).unwrap();
//! assert_eq!(text.to_string(), "Hello");
//!
//! // Operations for the other replicas
//! assert_eq!(text.take_outbox().len(), 7);
//! ```

pub mod crdt;
pub mod error;
pub mod protocol;

// Re-exports for convenience
pub use crdt::tree_fugue::{Position, PositionSource};
pub use crdt::PositionedList;
pub use error::{Result, TextError};

#[cfg(feature = "text")]
pub use crdt::tree_fugue::{MessageMeta, TextEvent, TreeFugueText};

/// Replica identifier type
pub type ReplicaId = String;

/// Fresh random replica id
pub fn random_replica_id() -> ReplicaId {
    uuid::Uuid::new_v4().to_string()
}
