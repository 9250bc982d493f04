use bytes::Bytes;

use crate::error::PeerError;
use crate::status::Status;

/// Reserved message type for in-band protocol control frames.
/// Never surfaced to the user; rejected by `send`.
pub const CONTROL_TYPE: i32 = 0;

/// Message type of lifecycle notices delivered through `recv`.
pub const LIFECYCLE_TYPE: i32 = -1;

/// Message type associated with the terminal error notice.
pub const ERROR_TYPE: i32 = -2;

/// Conventional tags for user payloads. Not enforced anywhere — any
/// positive message type is valid.
pub mod tags {
    pub const STRING: i32 = 1;
    pub const INT: i32 = 2;
    pub const FLOAT: i32 = 3;
    pub const STRUCT: i32 = 4;
    pub const CUSTOM: i32 = 5;
}

/// A message received from the peer.
///
/// Application messages have `msg_type > 0` and carry the payload.
/// Lifecycle notices have `msg_type == LIFECYCLE_TYPE`, an empty payload,
/// and the new connection status in `status`.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: i32,
    pub payload: Bytes,
    pub status: Option<Status>,
}

impl Message {
    pub(crate) fn application(msg_type: i32, payload: Bytes) -> Self {
        Self {
            msg_type,
            payload,
            status: None,
        }
    }

    pub(crate) fn lifecycle(status: Status) -> Self {
        Self {
            msg_type: LIFECYCLE_TYPE,
            payload: Bytes::new(),
            status: Some(status),
        }
    }

    /// True if this is a lifecycle notice rather than application data.
    pub fn is_lifecycle(&self) -> bool {
        self.msg_type == LIFECYCLE_TYPE
    }
}

/// Item carried on the inbound channel. `recv` unwraps this back into
/// the flat [`Message`] shape (or an error) at the API boundary.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Message),
    Lifecycle(Status),
    Terminated(PeerError),
}

/// Item carried on the outbound channel.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub msg_type: i32,
    pub payload: Bytes,
}
