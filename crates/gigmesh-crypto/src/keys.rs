use ed25519_dalek::{SigningKey, VerifyingKey};
use gigmesh_core::types::PublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::CryptoError;

/// A mesh keypair: Ed25519 secret + derived public key.
///
/// The secret bytes are wiped on drop. The same key signs certificates and
/// (via its clamped scalar) derives X25519 shared secrets for the onion
/// reply path.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: PublicKey,
    secret_key: [u8; 32],
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let sk = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(sk)
    }

    /// Restore a keypair from raw secret bytes (e.g. loaded from a wallet
    /// file). The public key is rederived.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&secret))
    }

    fn from_signing_key(sk: SigningKey) -> Self {
        let public_key = PublicKey(sk.verifying_key().to_bytes());
        Self {
            public_key,
            secret_key: sk.to_bytes(),
        }
    }

    /// Return a read-only view of the secret key bytes.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_key
    }

    pub(crate) fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_key)
    }

    /// Clamped X25519 scalar of this key, for Diffie–Hellman derivation.
    pub(crate) fn dh_scalar(&self) -> [u8; 32] {
        self.signing_key().to_scalar_bytes()
    }
}

/// Montgomery-form bytes of an Ed25519 public key, for X25519.
pub(crate) fn montgomery_bytes(pk: &PublicKey) -> Result<[u8; 32], CryptoError> {
    let vk = VerifyingKey::from_bytes(pk.as_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(vk.to_montgomery().to_bytes())
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            public_key: self.public_key,
            secret_key: self.secret_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ public_key: {:?} }}", self.public_key)
    }
}
