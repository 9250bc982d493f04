//! Session encryption for msgpipe.
//!
//! Each connection that negotiates encryption derives a fresh symmetric
//! key from an ephemeral X25519 key agreement ([`exchange`]) and seals
//! every frame body with AES-256-GCM ([`cipher`]). Keys live only as
//! long as the connection; a reconnect performs a new agreement.

pub mod cipher;
pub mod error;
pub mod exchange;

pub use cipher::{SessionCipher, NONCE_SIZE, SEAL_OVERHEAD, TAG_SIZE};
pub use error::{CryptoError, Result};
pub use exchange::{EphemeralKey, SessionKey, PUBLIC_KEY_SIZE};
