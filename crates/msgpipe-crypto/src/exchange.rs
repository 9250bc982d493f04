use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{CryptoError, Result};

/// Length of an X25519 public key on the wire.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// The 32-byte symmetric session key derived from key agreement.
///
/// Both peers hash the raw Diffie-Hellman shared secret with SHA-256;
/// the digest is used directly as the AES-256 key.
pub struct SessionKey([u8; 32]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("0", &"<redacted>").finish()
    }
}

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// An ephemeral X25519 keypair, generated per connection.
///
/// The secret half is consumed by [`agree`](Self::agree) so it cannot be
/// reused across connections.
pub struct EphemeralKey {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKey {
    /// Generate a fresh keypair from OS randomness.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public key bytes to send to the peer.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Perform the key agreement against the peer's public key and
    /// derive the session key. Consumes the secret.
    pub fn agree(self, peer_public: &[u8]) -> Result<SessionKey> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = peer_public
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(peer_public.len()))?;
        let peer = PublicKey::from(bytes);
        let shared = self.secret.diffie_hellman(&peer);

        let digest = Sha256::digest(shared.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(SessionKey(key))
    }
}
