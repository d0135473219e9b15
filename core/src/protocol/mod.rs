//! Binary protocol for operations and saves
//!
//! Operations travel as `TextMessage`; saves as `TextSave` wrapping a
//! `PositionSourceSave` blob and the concatenated values.

mod messages;
pub mod serialize;

pub use messages::*;
pub use serialize::{decode_message, encode_message};
