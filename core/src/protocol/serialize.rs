//! Serialization layer - Convert operations to/from Protocol Buffers
//!
//! This module converts between the position source's native types and the
//! prost messages that go over the wire.

use crate::crdt::tree_fugue::{Position, Side};
use crate::error::{Result, TextError};
use crate::protocol::{text_message, DeleteOp, InsertOp, TextMessage, WaypointMetadata};
use bytes::{Bytes, BytesMut};
use prost::Message;

/// Serialize any protocol message to bytes
pub fn encode_message<M: Message>(msg: &M) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)
        .map_err(|e| TextError::Protocol(format!("Failed to encode message: {}", e)))?;
    Ok(buf.freeze())
}

/// Deserialize a protocol message from bytes
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    M::decode(bytes).map_err(|e| TextError::Protocol(format!("Failed to decode message: {}", e)))
}

/// Build an insert operation message
pub fn insert_message(
    counter: u64,
    start_offset: usize,
    metadata: Option<Vec<u8>>,
    values: &str,
) -> TextMessage {
    TextMessage {
        op: Some(text_message::Op::Insert(InsertOp {
            counter,
            start_offset: start_offset as u64,
            metadata,
            values: values.to_string(),
        })),
    }
}

/// Build a delete operation message for `pos`, sent by `local_replica`
///
/// The sender field is left out when the sender created the position.
pub fn delete_message(pos: &Position, local_replica: &str) -> TextMessage {
    let sender = if pos.creator == local_replica {
        None
    } else {
        Some(pos.creator.clone())
    };
    TextMessage {
        op: Some(text_message::Op::Delete(DeleteOp {
            sender,
            counter: pos.counter,
            value_offset: pos.offset as u64,
        })),
    }
}

/// Encode the parent attachment of a new waypoint
pub fn encode_metadata(parent: &Position, side: Side) -> Vec<u8> {
    WaypointMetadata {
        parent_creator: parent.creator.clone(),
        parent_counter: parent.counter,
        parent_offset: parent.offset as u64,
        left: side == Side::Left,
    }
    .encode_to_vec()
}

/// Decode the parent attachment of a new waypoint
pub fn decode_metadata(bytes: &[u8]) -> Result<(Position, Side)> {
    let meta: WaypointMetadata = decode_message(bytes)?;
    let parent = Position::new(
        meta.parent_creator,
        meta.parent_counter,
        meta.parent_offset as usize,
    );
    let side = if meta.left { Side::Left } else { Side::Right };
    Ok((parent, side))
}
