//! External collaborator interfaces: the Lightning-style payment node and
//! the cross-Settler encryption relay. Transport lives elsewhere; the
//! Settler consumes these traits only.

use async_trait::async_trait;
use gigmesh_core::types::{CertificateId, PaymentHash, Preimage, Sats};
use gigmesh_core::GigmeshError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Externally reported state of one invoice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Cancelled,
}

/// Result of decoding a payment request string.
#[derive(Clone, Debug)]
pub struct DecodedInvoice {
    pub payment_hash: PaymentHash,
    pub amount_sat: Sats,
}

/// A freshly opened hold invoice.
#[derive(Clone, Debug)]
pub struct EscrowInvoice {
    pub payment_request: String,
    pub payment_hash: PaymentHash,
    pub amount_sat: Sats,
}

/// One element of the invoice-state subscription stream.
#[derive(Clone, Copy, Debug)]
pub struct InvoiceStateChange {
    pub payment_hash: PaymentHash,
    pub state: InvoiceState,
}

/// The payment node: invoice creation, decoding, settlement, cancellation
/// and state-change notification.
#[async_trait]
pub trait PaymentServiceApi: Send + Sync {
    async fn decode_invoice(&self, payment_request: &str) -> Result<DecodedInvoice, GigmeshError>;

    /// Open a hold invoice locked to `payment_hash`.
    async fn open_escrow_invoice(
        &self,
        amount_sat: Sats,
        payment_hash: PaymentHash,
        memo: &str,
        expiry_secs: u64,
    ) -> Result<EscrowInvoice, GigmeshError>;

    async fn cancel_invoice(&self, payment_hash: PaymentHash) -> Result<(), GigmeshError>;

    async fn settle_invoice(&self, preimage: Preimage) -> Result<(), GigmeshError>;

    async fn get_invoice_state(
        &self,
        payment_hash: PaymentHash,
    ) -> Result<InvoiceState, GigmeshError>;

    /// Open a fresh state-change stream. The monitor calls this again
    /// after the stream drops; buffered notifications may have been lost
    /// in between, which is why every (re)connect is followed by a
    /// reconciliation sweep.
    async fn subscribe_invoice_updates(
        &self,
    ) -> Result<mpsc::Receiver<InvoiceStateChange>, GigmeshError>;
}

/// Another Settler, reachable when the requester's Settler differs from
/// the replier's: re-encrypts data so only the certificate's subject can
/// decrypt it.
#[async_trait]
pub trait CrossSettlerApi: Send + Sync {
    async fn encrypt_for_certificate(
        &self,
        certificate_id: CertificateId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, GigmeshError>;
}
