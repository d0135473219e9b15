//! Wire and save schemas
//!
//! Hand-written prost messages (no build script). Field numbers are part of
//! the wire contract and must not be renumbered.

/// One operation sent per local edit
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextMessage {
    #[prost(oneof = "text_message::Op", tags = "1, 2")]
    pub op: ::core::option::Option<text_message::Op>,
}

pub mod text_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Op {
        #[prost(message, tag = "1")]
        Insert(super::InsertOp),
        #[prost(message, tag = "2")]
        Delete(super::DeleteOp),
    }
}

/// Insert of a contiguous run of values
///
/// The creator is the message sender. `metadata` is absent when the run
/// extends an existing waypoint or attaches to the root.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertOp {
    #[prost(uint64, tag = "1")]
    pub counter: u64,
    #[prost(uint64, tag = "2")]
    pub start_offset: u64,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub metadata: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(string, tag = "4")]
    pub values: ::prost::alloc::string::String,
}

/// Delete of a single position
///
/// `sender` is absent when the position's creator is the message sender.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteOp {
    #[prost(string, optional, tag = "1")]
    pub sender: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(uint64, tag = "2")]
    pub counter: u64,
    #[prost(uint64, tag = "3")]
    pub value_offset: u64,
}

/// Parent attachment of a new waypoint, carried opaquely in `InsertOp::metadata`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaypointMetadata {
    #[prost(string, tag = "1")]
    pub parent_creator: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub parent_counter: u64,
    #[prost(uint64, tag = "3")]
    pub parent_offset: u64,
    #[prost(bool, tag = "4")]
    pub left: bool,
}

/// Saved state of a whole document
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextSave {
    #[prost(bytes = "vec", tag = "1")]
    pub position_source_save: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub values_save: ::prost::alloc::string::String,
}

/// Structural save of the position tree, parents before children
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PositionSourceSave {
    #[prost(message, repeated, tag = "1")]
    pub waypoints: ::prost::alloc::vec::Vec<WaypointSave>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaypointSave {
    #[prost(string, tag = "1")]
    pub creator: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub counter: u64,
    /// 0 for the root, otherwise 1 + index of the parent in `waypoints`
    #[prost(uint64, tag = "3")]
    pub parent: u64,
    #[prost(uint64, tag = "4")]
    pub parent_offset: u64,
    #[prost(bool, tag = "5")]
    pub left: bool,
    /// Slot count, deleted slots included
    #[prost(uint64, tag = "6")]
    pub length: u64,
    /// Packed presence bits, least significant bit first
    #[prost(bytes = "vec", tag = "7")]
    pub present: ::prost::alloc::vec::Vec<u8>,
}
