//! gigmesh-core::records
//!
//! Persistent record structs stored by the Settler. One struct per named
//! store tree; all are serde-round-trippable for bincode storage.
//!
//! Mutation discipline:
//! - `GrantedProperty` rows are upserted by re-grants and flagged by
//!   revocation, never deleted (audit trail).
//! - `Gig` rows are mutated only through atomic read-modify-write
//!   transitions (invoice monitor, dispute API, deadline job).
//! - `InvoicePreimage.revealed` flips false→true exactly once.

use serde::{Deserialize, Serialize};

use crate::types::{CertificateId, CertificateKind, PaymentHash, Preimage, PublicKey, Timestamp};

// ── Granted properties ───────────────────────────────────────────────────────

/// One property granted to a subject by the Settler acting as CA.
/// Key: (subject, name). Re-granting overwrites value/secret/expiry and
/// clears `revoked`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrantedProperty {
    pub subject: PublicKey,
    pub name: String,
    /// Value embedded into certificates that request this property.
    pub public_value: Vec<u8>,
    /// Secret retained by the CA, never issued.
    pub private_secret: Vec<u8>,
    pub valid_till: Timestamp,
    pub revoked: bool,
}

impl GrantedProperty {
    /// Usable for certificate issuance right now?
    pub fn is_valid(&self, now: Timestamp) -> bool {
        !self.revoked && now <= self.valid_till
    }
}

// ── Issued certificates ──────────────────────────────────────────────────────

/// Links an issued certificate to its subject and revocation state.
/// Key: certificate_id. The certificate itself is immutable; revocation
/// lives here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserCertificate {
    pub kind: CertificateKind,
    pub certificate_id: CertificateId,
    pub subject: PublicKey,
    pub revoked: bool,
}

/// Audit join row: which granted property backed which certificate.
/// Key: (certificate_id, property_name).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertificateProperty {
    pub certificate_id: CertificateId,
    pub subject: PublicKey,
    pub property_name: String,
}

// ── Gigs ─────────────────────────────────────────────────────────────────────

/// Lifecycle state of a gig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GigStatus {
    Open,
    Accepted,
    Disputed,
    Cancelled,
    Completed,
}

impl GigStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GigStatus::Cancelled | GigStatus::Completed)
    }
}

impl std::fmt::Display for GigStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GigStatus::Open => "Open",
            GigStatus::Accepted => "Accepted",
            GigStatus::Disputed => "Disputed",
            GigStatus::Cancelled => "Cancelled",
            GigStatus::Completed => "Completed",
        };
        write!(f, "{s}")
    }
}

/// Which escrow leg has been accepted so far. Only meaningful while the
/// gig is `Open`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GigSubStatus {
    None,
    AcceptedByNetwork,
    AcceptedByReply,
}

/// Composite key of a gig: the broadcast request payload id paired with
/// the reply certificate issued for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GigKey {
    pub request_id: CertificateId,
    pub replier_certificate_id: CertificateId,
}

impl GigKey {
    pub fn new(request_id: CertificateId, replier_certificate_id: CertificateId) -> Self {
        Self { request_id, replier_certificate_id }
    }

    /// Fixed-width storage key: request id bytes then reply cert id bytes.
    pub fn storage_key(&self) -> [u8; 32] {
        let mut k = [0u8; 32];
        k[..16].copy_from_slice(&self.request_id.0);
        k[16..].copy_from_slice(&self.replier_certificate_id.0);
        k
    }

    pub fn from_storage_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        let mut req = [0u8; 16];
        let mut rep = [0u8; 16];
        req.copy_from_slice(&bytes[..16]);
        rep.copy_from_slice(&bytes[16..]);
        Some(Self {
            request_id: CertificateId(req),
            replier_certificate_id: CertificateId(rep),
        })
    }
}

impl std::fmt::Display for GigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.request_id, self.replier_certificate_id)
    }
}

/// One job-request/reply pairing tracked through its escrow lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Gig {
    pub key: GigKey,
    /// Key the reply message was encrypted with; revealed to the requester
    /// once both escrow legs are accepted.
    pub symmetric_key: [u8; 32],
    /// Payment hash of the reply invoice (replier's earnings leg).
    pub reply_payment_hash: PaymentHash,
    /// Payment hash of the Settler's own network fee leg.
    pub network_payment_hash: PaymentHash,
    pub status: GigStatus,
    pub sub_status: GigSubStatus,
    /// `NO_DEADLINE` until the gig is accepted.
    pub dispute_deadline: Timestamp,
}

// ── Invoice preimages ────────────────────────────────────────────────────────

/// One escrow leg's secret, registered when the leg is opened.
/// Key: payment_hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvoicePreimage {
    pub payment_hash: PaymentHash,
    /// The request broadcast this leg is chained to.
    pub related_request_id: CertificateId,
    pub replier: PublicKey,
    /// Who may learn the preimage once revealed.
    pub subject: PublicKey,
    pub preimage: Preimage,
    pub revealed: bool,
}

// ── Access codes ─────────────────────────────────────────────────────────────

/// Out-of-band bootstrap credential. Validation consumes it: the use count
/// is incremented and single-use codes are revoked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessCode {
    pub code: String,
    pub single_use: bool,
    pub use_count: u32,
    pub valid_till: Timestamp,
    pub revoked: bool,
    pub memo: String,
}

impl AccessCode {
    pub fn is_usable(&self, now: Timestamp) -> bool {
        !self.revoked && now <= self.valid_till
    }
}
