/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The wire length prefix exceeds the allowed body size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload exceeds the configured maximum message size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The (decrypted) body is shorter than the message-type header.
    #[error("frame body shorter than message-type header ({0} bytes)")]
    ShortBody(usize),

    /// Sealing or opening the frame body failed.
    #[error(transparent)]
    Crypto(#[from] msgpipe_crypto::CryptoError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
