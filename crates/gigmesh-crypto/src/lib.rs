//! gigmesh-crypto
//!
//! Crypto primitives for the mesh: SHA-256 hashing, Ed25519 signing over
//! canonical object bytes, X25519 ECIES for the onion reply path, and
//! ChaCha20-Poly1305 symmetric encryption.

pub mod aead;
pub mod ecies;
pub mod hash;
pub mod keys;
pub mod sign;

use thiserror::Error;

pub use aead::{generate_symmetric_key, symmetric_decrypt, symmetric_encrypt};
pub use ecies::{asymmetric_decrypt, asymmetric_encrypt};
pub use hash::{payment_hash, sha256, sha256_parts};
pub use keys::KeyPair;
pub use sign::{canonical_bytes, sign_object, verify_object};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("shared-key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("ciphertext too short")]
    Truncated,
}

impl From<CryptoError> for gigmesh_core::GigmeshError {
    fn from(e: CryptoError) -> Self {
        gigmesh_core::GigmeshError::Crypto(e.to_string())
    }
}
