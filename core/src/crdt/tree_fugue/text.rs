//! TreeFugueText: collaborative text on top of the position source
//!
//! Turns index-based edits into position-based operations, encodes them for
//! the transport, applies operations from any replica and reports each
//! change as an index-range event.

use super::position::Position;
use super::source::PositionSource;
use crate::crdt::PositionedList;
use crate::error::{Result, TextError};
use crate::protocol::serialize::{delete_message, insert_message};
use crate::protocol::{decode_message, encode_message, text_message, TextMessage, TextSave};
use crate::ReplicaId;
use bytes::Bytes;

/// Delivery metadata supplied by the transport with every message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    /// Replica that sent the message
    pub sender: ReplicaId,

    /// True when this is the sender's own message coming back to it
    pub is_local_echo: bool,
}

impl MessageMeta {
    /// Meta for a message from another replica
    pub fn remote(sender: ReplicaId) -> Self {
        Self {
            sender,
            is_local_echo: false,
        }
    }

    /// Meta for this replica's own message
    pub fn local_echo(sender: ReplicaId) -> Self {
        Self {
            sender,
            is_local_echo: true,
        }
    }
}

/// Change to the logical text caused by one applied operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEvent {
    /// `count` contiguous characters now start at `start_index`
    Insert {
        start_index: usize,
        count: usize,
        meta: MessageMeta,
    },

    /// The character that was at `start_index` is gone
    Delete {
        start_index: usize,
        count: usize,
        deleted_values: String,
        meta: MessageMeta,
    },
}

type Listener = Box<dyn FnMut(&TextEvent)>;

/// Tree-based Fugue text CRDT
///
/// Local edits are applied immediately (as a local echo) and the encoded
/// operation is queued for the transport, see `take_outbox`. Operations
/// from other replicas go through `receive`.
///
/// Calls must be serialized by the host; there is no internal locking.
///
/// # Example
///
/// ```rust
/// use tree_fugue_core::crdt::tree_fugue::{MessageMeta, TreeFugueText};
///
/// let mut alice = TreeFugueText::new("alice".to_string());
/// let mut bob = TreeFugueText::new("bob".to_string());
///
/// alice.insert(0, "Hello").unwrap();
/// for message in alice.take_outbox() {
///     bob.receive(&message, MessageMeta::remote("alice".to_string())).unwrap();
/// }
///
/// assert_eq!(bob.to_string(), "Hello");
/// ```
pub struct TreeFugueText {
    replica_id: ReplicaId,

    source: PositionSource<char>,

    /// Index of the local operation in flight, so its echo skips the
    /// lookup. Cleared by every non-echo message.
    index_hint: Option<usize>,

    /// Encoded operations not yet taken by the transport
    outbox: Vec<Bytes>,

    listeners: Vec<Listener>,
}

impl TreeFugueText {
    /// Create an empty text for the given replica
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            source: PositionSource::new(replica_id.clone()),
            replica_id,
            index_hint: None,
            outbox: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Register a callback invoked for every emitted event
    pub fn on_event(&mut self, listener: impl FnMut(&TextEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Encoded operations produced by local edits since the last call
    pub fn take_outbox(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outbox)
    }

    /// Insert `text` so that its first character ends up at `index`
    ///
    /// Existing characters at `>= index` shift right. Empty text is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TextError::IndexOutOfBounds` if `index > len()`.
    pub fn insert(&mut self, index: usize, text: &str) -> Result<Vec<TextEvent>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        if index > self.len() {
            return Err(TextError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }

        self.index_hint = Some(index);
        let prev = match index {
            0 => None,
            _ => Some(self.source.get_position(index - 1)?),
        };
        let alloc = self.source.create_positions(prev.as_ref())?;

        let message = insert_message(alloc.counter, alloc.start_offset, alloc.metadata, text);
        self.send(&message)
    }

    /// Delete `count` characters starting at `start_index`
    ///
    /// Characters are deleted back to front, one operation each.
    ///
    /// # Errors
    ///
    /// Returns `TextError::RangeOutOfBounds` if `start_index + count > len()`;
    /// nothing is deleted in that case.
    pub fn delete(&mut self, start_index: usize, count: usize) -> Result<Vec<TextEvent>> {
        let length = self.len();
        match start_index.checked_add(count) {
            Some(end) if end <= length => {}
            _ => {
                return Err(TextError::RangeOutOfBounds {
                    start: start_index,
                    count,
                    length,
                })
            }
        }

        let mut events = Vec::with_capacity(count);
        for index in (start_index..start_index + count).rev() {
            self.index_hint = Some(index);
            let pos = self.source.get_position(index)?;
            let message = delete_message(&pos, &self.replica_id);
            events.extend(self.send(&message)?);
        }
        Ok(events)
    }

    /// Delete the whole text
    pub fn clear(&mut self) -> Result<Vec<TextEvent>> {
        self.delete(0, self.len())
    }

    /// Element-array inserts are not part of a text document
    pub fn insert_array(&mut self, _index: usize, _values: &[serde_json::Value]) -> Result<()> {
        Err(TextError::Unsupported("insert of non-character elements"))
    }

    /// Element-array deletes are not part of a text document
    pub fn delete_array(&mut self, _start_index: usize, _count: usize) -> Result<()> {
        Err(TextError::Unsupported("delete of non-character elements"))
    }

    /// Apply an operation delivered by the transport
    ///
    /// Returns the emitted event, or None for a delete of an
    /// already-deleted position.
    ///
    /// # Errors
    ///
    /// - `TextError::Protocol` for undecodable messages or unknown ops
    /// - `TextError::MissingParent` / `TextError::NonContiguousInsert` for
    ///   inserts delivered out of causal order
    pub fn receive(&mut self, message: &[u8], meta: MessageMeta) -> Result<Option<TextEvent>> {
        if !meta.is_local_echo {
            self.index_hint = None;
        }

        let decoded: TextMessage = decode_message(message)?;
        let event = match decoded.op {
            Some(text_message::Op::Insert(op)) => {
                let pos = Position::new(meta.sender.clone(), op.counter, op.start_offset as usize);
                let count = op.values.chars().count();
                self.source
                    .receive_and_add_positions(&pos, op.values.chars(), op.metadata.as_deref())?;
                tracing::trace!(%pos, count, echo = meta.is_local_echo, "Applied insert");

                if count == 0 {
                    None
                } else {
                    // The run is contiguous, so its first position locates all of it
                    let start_index = match self.index_hint {
                        Some(hint) => hint,
                        None => self.source.find_position(&pos)?.0,
                    };
                    Some(TextEvent::Insert {
                        start_index,
                        count,
                        meta,
                    })
                }
            }
            Some(text_message::Op::Delete(op)) => {
                let sender = op.sender.unwrap_or_else(|| meta.sender.clone());
                let pos = Position::new(sender, op.counter, op.value_offset as usize);
                match self.source.delete(&pos) {
                    Some(deleted) => {
                        tracing::trace!(%pos, echo = meta.is_local_echo, "Applied delete");
                        let start_index = match self.index_hint {
                            Some(hint) => hint,
                            None => self.source.find_position(&pos)?.0,
                        };
                        Some(TextEvent::Delete {
                            start_index,
                            count: 1,
                            deleted_values: deleted.to_string(),
                            meta,
                        })
                    }
                    None => None,
                }
            }
            None => {
                return Err(TextError::Protocol(
                    "Unrecognized operation in text message".to_string(),
                ))
            }
        };

        if let Some(event) = &event {
            for listener in &mut self.listeners {
                listener(event);
            }
        }
        Ok(event)
    }

    /// Number of characters
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Character at `index`
    pub fn char_at(&self, index: usize) -> Result<char> {
        self.source
            .get(index)
            .copied()
            .ok_or(TextError::IndexOutOfBounds {
                index,
                length: self.len(),
            })
    }

    /// All characters in order
    pub fn values(&self) -> impl Iterator<Item = char> + '_ {
        self.source.items().flat_map(|run| run.iter().copied())
    }

    /// Stable anchor of the character at `index`, as text
    pub fn get_position(&self, index: usize) -> Result<String> {
        Ok(self.source.get_position(index)?.to_json())
    }

    /// Current index of an anchor from `get_position`, and whether its
    /// character is still present
    pub fn find_position(&self, position: &str) -> Result<(usize, bool)> {
        let pos = Position::from_json(position)?;
        self.source.find_position(&pos)
    }

    /// Save the whole document
    ///
    /// The values blob holds every character ever inserted, deleted ones
    /// included, in document order.
    pub fn save(&self) -> Result<Bytes> {
        let save = TextSave {
            position_source_save: self.source.save()?.to_vec(),
            values_save: self
                .source
                .saved_values()
                .flat_map(|run| run.iter())
                .collect(),
        };
        encode_message(&save)
    }

    /// Replace this document's state with a save produced by `save`
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let save: TextSave =
            decode_message(data).map_err(|e| TextError::InvalidSave(e.to_string()))?;
        let mut values = save.values_save.chars();
        self.source.load(&save.position_source_save, |count| {
            values.by_ref().take(count).collect()
        })?;
        self.index_hint = None;
        Ok(())
    }

    /// Tombstones are never collected
    pub fn can_gc(&self) -> bool {
        false
    }

    /// Apply a local operation as its own echo, then queue it
    fn send(&mut self, message: &TextMessage) -> Result<Vec<TextEvent>> {
        let bytes = encode_message(message)?;
        let event = self.receive(&bytes, MessageMeta::local_echo(self.replica_id.clone()))?;
        self.outbox.push(bytes);
        Ok(event.into_iter().collect())
    }
}

impl PositionedList for TreeFugueText {
    fn len(&self) -> usize {
        TreeFugueText::len(self)
    }

    fn get_position(&self, index: usize) -> Result<String> {
        TreeFugueText::get_position(self, index)
    }

    fn find_position(&self, position: &str) -> Result<(usize, bool)> {
        TreeFugueText::find_position(self, position)
    }
}

impl std::fmt::Display for TreeFugueText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for run in self.source.items() {
            for c in run {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TreeFugueText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFugueText")
            .field("replica_id", &self.replica_id)
            .field("len", &self.len())
            .field("index_hint", &self.index_hint)
            .field("pending", &self.outbox.len())
            .finish()
    }
}
