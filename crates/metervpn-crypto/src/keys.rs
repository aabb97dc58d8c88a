//! Tunnel key pair management.
//!
//! WireGuard peers authenticate with Curve25519 key pairs. A fresh pair is
//! generated for every config bundle; only the public half ever leaves the
//! machine, the private half goes straight into the config document.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// Size in bytes of both halves of an X25519 key pair.
pub const KEY_SIZE: usize = 32;

/// An X25519 key pair for one tunnel interface.
pub struct TunnelKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for TunnelKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelKeyPair")
            .field("public", &self.public_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TunnelKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        let secret = StaticSecret::from(arr);
        let public = PublicKey::from(&secret);
        arr.zeroize();
        Ok(Self { secret, public })
    }

    /// Get the public key as raw bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Public key in standard base64, as registered with the server.
    pub fn public_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Private key in standard base64, as written to `PrivateKey =`.
    ///
    /// The returned string is wiped on drop.
    pub fn secret_base64(&self) -> Zeroizing<String> {
        let mut bytes = self.secret.to_bytes();
        let encoded = Zeroizing::new(STANDARD.encode(bytes));
        bytes.zeroize();
        encoded
    }
}

/// Decode a base64 WireGuard public key, checking its length.
pub fn decode_public_key(encoded: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: bytes.len(),
    })
}
