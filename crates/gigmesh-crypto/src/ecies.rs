//! X25519 ECIES over the mesh identity keys.
//!
//! The shared secret is an X25519 Diffie–Hellman between the recipient's
//! key (Montgomery form of their Ed25519 identity) and either the sender's
//! static key or a fresh ephemeral one. In ephemeral mode the ephemeral
//! public key is prefixed to the ciphertext; in static mode the recipient
//! must already know the sender's public key.

use gigmesh_core::types::PublicKey;
use x25519_dalek::x25519;

use crate::aead::{symmetric_decrypt, symmetric_encrypt};
use crate::hash::sha256_parts;
use crate::keys::{montgomery_bytes, KeyPair};
use crate::CryptoError;

const KDF_CONTEXT: &[u8] = b"gigmesh/ecies/v1";

fn derive_key(shared: &[u8; 32]) -> [u8; 32] {
    sha256_parts(&[shared, KDF_CONTEXT])
}

/// Encrypt `plaintext` so only the holder of `their_pub`'s secret can read
/// it. With `sender: None` a fresh ephemeral key is generated and its
/// public key (32 bytes) is prefixed to the output.
pub fn asymmetric_encrypt(
    their_pub: &PublicKey,
    sender: Option<&KeyPair>,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let their_mont = montgomery_bytes(their_pub)?;

    match sender {
        Some(kp) => {
            let shared = x25519(kp.dh_scalar(), their_mont);
            symmetric_encrypt(&derive_key(&shared), plaintext)
        }
        None => {
            let ephemeral = KeyPair::generate();
            let shared = x25519(ephemeral.dh_scalar(), their_mont);
            let sealed = symmetric_encrypt(&derive_key(&shared), plaintext)?;

            let mut out = Vec::with_capacity(32 + sealed.len());
            out.extend_from_slice(ephemeral.public_key.as_bytes());
            out.extend_from_slice(&sealed);
            Ok(out)
        }
    }
}

/// Inverse of `asymmetric_encrypt`. Pass `sender: Some(pk)` iff the message
/// was encrypted with the sender's static key; otherwise the ephemeral
/// public key is read from the 32-byte prefix. A wrong private key fails
/// closed with `CryptoError::Decrypt`.
pub fn asymmetric_decrypt(
    my_keypair: &KeyPair,
    sender: Option<&PublicKey>,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (counterpart, ciphertext) = match sender {
        Some(pk) => (*pk, data),
        None => {
            if data.len() < 32 {
                return Err(CryptoError::Truncated);
            }
            let mut eph = [0u8; 32];
            eph.copy_from_slice(&data[..32]);
            (PublicKey(eph), &data[32..])
        }
    };

    let their_mont = montgomery_bytes(&counterpart)?;
    let shared = x25519(my_keypair.dh_scalar(), their_mont);
    symmetric_decrypt(&derive_key(&shared), ciphertext)
}
