use ed25519_dalek::{Signature, Signer, VerifyingKey};
use gigmesh_core::types::{PublicKey, SchnorrSignature};
use serde::Serialize;

use crate::hash::sha256;
use crate::keys::KeyPair;

/// Canonical serialization used for signing and hashing (bincode).
///
/// Map-valued fields in signed objects use `BTreeMap` so field order is
/// deterministic across hosts.
pub fn canonical_bytes<T: Serialize>(obj: &T) -> Vec<u8> {
    bincode::serialize(obj).expect("canonical serialization is infallible")
}

/// Sign an object: canonical bytes → SHA-256 → Ed25519 over the digest.
pub fn sign_object<T: Serialize>(obj: &T, keypair: &KeyPair) -> SchnorrSignature {
    sign_digest(&sha256(&canonical_bytes(obj)), keypair)
}

/// Sign a precomputed 32-byte digest.
pub fn sign_digest(digest: &[u8; 32], keypair: &KeyPair) -> SchnorrSignature {
    let sig = keypair.signing_key().sign(digest);
    SchnorrSignature(sig.to_bytes().to_vec())
}

/// Verify an object signature. Returns `false` on any failure (malformed
/// key or signature bytes, digest mismatch) and never errors.
pub fn verify_object<T: Serialize>(
    obj: &T,
    signature: &SchnorrSignature,
    public_key: &PublicKey,
) -> bool {
    verify_digest(&sha256(&canonical_bytes(obj)), signature, public_key)
}

/// Verify a signature over a precomputed digest. Same failure contract as
/// `verify_object`.
pub fn verify_digest(
    digest: &[u8; 32],
    signature: &SchnorrSignature,
    public_key: &PublicKey,
) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&signature.0) else {
        return false;
    };
    vk.verify_strict(digest, &sig).is_ok()
}
