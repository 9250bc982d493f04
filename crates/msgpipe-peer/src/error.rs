use crate::status::Status;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (validation, bind, connect, accept).
    #[error("transport error: {0}")]
    Transport(#[from] msgpipe_transport::TransportError),

    /// Frame-level error (malformed length, short body, oversize frame).
    #[error("frame error: {0}")]
    Frame(#[from] msgpipe_frame::FrameError),

    /// Key agreement or message sealing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] msgpipe_crypto::CryptoError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection deadline elapsed while dialing.
    #[error("timed out trying to connect")]
    ConnectTimeout,

    /// The message type is reserved for protocol use.
    #[error("message type {0} is reserved")]
    ReservedType(i32),

    /// The payload exceeds the negotiated maximum message size.
    #[error("message exceeds maximum message length ({size} > {max} bytes)")]
    Oversize { size: usize, max: usize },

    /// A send was attempted while the peer was not connected.
    /// Carries the status the peer was in, which is the whole message.
    #[error("{0}")]
    NotConnected(Status),

    /// The inbound channel has been closed.
    #[error("the inbound channel has been closed")]
    ChannelClosed,

    /// The connection has been closed.
    #[error("{0}")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
