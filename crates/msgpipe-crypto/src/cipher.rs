use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::exchange::SessionKey;

/// GCM nonce length: the cipher default.
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag length.
pub const TAG_SIZE: usize = 16;

/// Bytes added to a plaintext by [`SessionCipher::seal`]:
/// the prepended nonce plus the appended tag.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// AES-256-GCM session cipher.
///
/// Installed once at handshake and read-only afterwards; `seal` and
/// `open` take `&self` and may be called concurrently from the reader
/// and writer threads, each call drawing its own nonce.
pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl SessionCipher {
    /// Build the cipher from a derived session key.
    pub fn new(key: &SessionKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypt a frame body: `nonce_12 || ciphertext || tag_16`.
    ///
    /// A fresh random nonce is drawn per message and carried on the wire.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a sealed frame body, verifying the auth tag.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CryptoError::ShortCiphertext(sealed.len()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}
