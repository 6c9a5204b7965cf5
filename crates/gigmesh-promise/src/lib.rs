//! gigmesh-promise
//!
//! The Settler's signed commitment that a specific encrypted reply payload
//! will be released once the chained escrow invoices settle. The promise
//! binds the reply to its payment terms: a replier shows it to the
//! requester before the requester pays either leg.

use gigmesh_core::types::{PaymentHash, PublicKey, Sats, SchnorrSignature};
use gigmesh_crypto::hash::sha256;
use gigmesh_crypto::sign::{sign_object, verify_object};
use gigmesh_crypto::KeyPair;
use serde::{Deserialize, Serialize};

/// A CA-signed settlement commitment.
///
/// Verification requires both a valid Settler signature and that the
/// presented encrypted payload hashes to `encrypted_reply_hash`; a
/// promise is meaningless detached from its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementPromise {
    pub signature: SchnorrSignature,
    /// URI of the Settler that signed this promise (the replier's).
    pub settler_uri: String,
    /// URI of the requester's Settler (may equal `settler_uri`).
    pub requester_settler_uri: String,
    /// Payment hash of the network fee escrow leg.
    pub network_payment_hash: PaymentHash,
    /// SHA-256 of the re-encrypted reply payload this promise stands for.
    pub encrypted_reply_hash: [u8; 32],
    /// Amount (sats) of the reply invoice leg.
    pub reply_payment_amount_sat: Sats,
}

impl SettlementPromise {
    /// Sign a promise over the given payload and payment terms.
    pub fn sign(
        settler_key: &KeyPair,
        settler_uri: impl Into<String>,
        requester_settler_uri: impl Into<String>,
        network_payment_hash: PaymentHash,
        encrypted_reply_payload: &[u8],
        reply_payment_amount_sat: Sats,
    ) -> Self {
        let mut promise = SettlementPromise {
            signature: SchnorrSignature::empty(),
            settler_uri: settler_uri.into(),
            requester_settler_uri: requester_settler_uri.into(),
            network_payment_hash,
            encrypted_reply_hash: sha256(encrypted_reply_payload),
            reply_payment_amount_sat,
        };
        promise.signature = sign_object(&promise.signable(), settler_key);
        promise
    }

    fn signable(&self) -> SettlementPromise {
        let mut copy = self.clone();
        copy.signature = SchnorrSignature::empty();
        copy
    }

    /// Verify signature and payload binding. `false` on any mismatch,
    /// never errors.
    pub fn verify(&self, encrypted_reply_payload: &[u8], settler_key: &PublicKey) -> bool {
        sha256(encrypted_reply_payload) == self.encrypted_reply_hash
            && verify_object(&self.signable(), &self.signature, settler_key)
    }
}
