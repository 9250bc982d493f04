//! Length-prefixed message framing for msgpipe.
//!
//! Every message is framed as:
//! - A 4-byte big-endian body length
//! - A 4-byte big-endian signed message type
//! - The payload bytes
//!
//! When a session cipher is installed, the message type and payload are
//! sealed as one unit and the length prefix counts the sealed body as it
//! appears on the wire. No partial reads, no buffer management in user
//! code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, LEN_PREFIX_SIZE,
    MIN_MAX_PAYLOAD, TYPE_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
