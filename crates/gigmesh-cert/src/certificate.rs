use std::collections::BTreeMap;

use gigmesh_core::types::{CertificateId, CertificateKind, PublicKey, SchnorrSignature, Timestamp};
use gigmesh_crypto::sign::{canonical_bytes, verify_object};
use serde::{Deserialize, Serialize};

use crate::accessor::CaAccessor;

/// A CA-issued credential binding a property set to a subject for a time
/// window.
///
/// The signature covers the bincode serialization of every other field
/// with `signature` cleared. The property map is a `BTreeMap` so the
/// signable bytes are deterministic. `value` is opaque serialized payload
/// interpreted by the consumer; `id` is immutable once issued and is
/// stored big-endian on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub signature: SchnorrSignature,
    pub authority_uri: String,
    pub kind: CertificateKind,
    pub id: CertificateId,
    pub properties: BTreeMap<String, Vec<u8>>,
    pub not_valid_before: Timestamp,
    pub not_valid_after: Timestamp,
    pub value: Vec<u8>,
}

impl Certificate {
    /// The bytes the authority signs: this certificate with the signature
    /// field cleared.
    pub fn signable(&self) -> Certificate {
        let mut copy = self.clone();
        copy.signature = SchnorrSignature::empty();
        copy
    }

    pub fn signable_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signable())
    }

    /// Is `now` inside the validity window?
    pub fn in_window(&self, now: Timestamp) -> bool {
        self.not_valid_before <= now && now <= self.not_valid_after
    }

    /// Verify window and signature against a known authority key.
    /// Returns `false` on any failure; never errors.
    pub fn verify(&self, authority_key: &PublicKey, now: Timestamp) -> bool {
        self.in_window(now) && verify_object(&self.signable(), &self.signature, authority_key)
    }

    /// Verify against the issuing authority, resolving its public key via
    /// the accessor. Any accessor failure verifies as `false`.
    ///
    /// Revocation is intentionally NOT checked here: callers query
    /// `CaAccessor::is_revoked` separately.
    pub async fn verify_with<A: CaAccessor + ?Sized>(&self, accessor: &A, now: Timestamp) -> bool {
        match accessor.get_public_key(&self.authority_uri).await {
            Ok(key) => self.verify(&key, now),
            Err(_) => false,
        }
    }
}
