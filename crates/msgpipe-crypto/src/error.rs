/// Errors that can occur in key agreement or message sealing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// Decryption failed: auth tag mismatch or malformed ciphertext.
    #[error("decryption failed (auth tag mismatch or malformed ciphertext)")]
    Decrypt,

    /// Sealed message shorter than nonce + tag.
    #[error("sealed message too short ({0} bytes)")]
    ShortCiphertext(usize),

    /// The peer sent a public key of the wrong length.
    #[error("peer public key has invalid length {0} (expected 32)")]
    InvalidPublicKey(usize),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
