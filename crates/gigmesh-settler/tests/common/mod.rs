//! Shared fixtures for settler integration tests: an in-memory payment
//! service, a loopback cross-Settler relay, and a wired-up service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gigmesh_core::records::{GigKey, GigStatus};
use gigmesh_core::types::{CertificateId, PaymentHash, Preimage, Sats, Timestamp};
use gigmesh_core::GigmeshError;
use gigmesh_crypto::hash::payment_hash;
use gigmesh_crypto::KeyPair;
use gigmesh_settler::{
    AuthToken, CrossSettlerApi, DecodedInvoice, EscrowInvoice, InvoiceState, InvoiceStateChange,
    PaymentServiceApi, Settler, SettlerConfig,
};
use gigmesh_store::StoreDb;
use tokio::sync::{mpsc, watch};

// ── Fake payment service ─────────────────────────────────────────────────────

#[derive(Default)]
struct PaymentInner {
    invoices: HashMap<String, DecodedInvoice>,
    states: HashMap<PaymentHash, InvoiceState>,
    opened: Vec<PaymentHash>,
    cancelled: Vec<PaymentHash>,
    settled: Vec<Preimage>,
    subscribers: Vec<mpsc::Sender<InvoiceStateChange>>,
}

/// In-memory stand-in for the Lightning-style payment node.
#[derive(Default)]
pub struct FakePaymentService {
    inner: Mutex<PaymentInner>,
}

impl FakePaymentService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an invoice created outside the Settler (the requester's
    /// wallet side of the reply leg).
    pub fn register_invoice(&self, payment_request: &str, hash: PaymentHash, amount_sat: Sats) {
        let mut inner = self.inner.lock().unwrap();
        inner.invoices.insert(
            payment_request.to_string(),
            DecodedInvoice { payment_hash: hash, amount_sat },
        );
        inner.states.insert(hash, InvoiceState::Open);
    }

    /// Simulate the payment node reporting a state change, both to state
    /// queries and to every live subscription stream.
    pub async fn report(&self, hash: PaymentHash, state: InvoiceState) {
        let senders = {
            let mut inner = self.inner.lock().unwrap();
            inner.states.insert(hash, state);
            inner.subscribers.clone()
        };
        for tx in senders {
            let _ = tx.send(InvoiceStateChange { payment_hash: hash, state }).await;
        }
    }

    pub fn opened(&self) -> Vec<PaymentHash> {
        self.inner.lock().unwrap().opened.clone()
    }

    pub fn cancelled(&self) -> Vec<PaymentHash> {
        self.inner.lock().unwrap().cancelled.clone()
    }

    pub fn settled(&self) -> Vec<Preimage> {
        self.inner.lock().unwrap().settled.clone()
    }
}

#[async_trait]
impl PaymentServiceApi for FakePaymentService {
    async fn decode_invoice(&self, payment_request: &str) -> Result<DecodedInvoice, GigmeshError> {
        self.inner
            .lock()
            .unwrap()
            .invoices
            .get(payment_request)
            .cloned()
            .ok_or_else(|| GigmeshError::Payment(format!("unknown invoice {payment_request}")))
    }

    async fn open_escrow_invoice(
        &self,
        amount_sat: Sats,
        hash: PaymentHash,
        _memo: &str,
        _expiry_secs: u64,
    ) -> Result<EscrowInvoice, GigmeshError> {
        let payment_request = format!("fakeln{}", hash.to_hex());
        let mut inner = self.inner.lock().unwrap();
        inner.invoices.insert(
            payment_request.clone(),
            DecodedInvoice { payment_hash: hash, amount_sat },
        );
        inner.states.insert(hash, InvoiceState::Open);
        inner.opened.push(hash);
        Ok(EscrowInvoice { payment_request, payment_hash: hash, amount_sat })
    }

    async fn cancel_invoice(&self, hash: PaymentHash) -> Result<(), GigmeshError> {
        let mut inner = self.inner.lock().unwrap();
        inner.states.insert(hash, InvoiceState::Cancelled);
        inner.cancelled.push(hash);
        Ok(())
    }

    async fn settle_invoice(&self, preimage: Preimage) -> Result<(), GigmeshError> {
        let hash = payment_hash(&preimage);
        let mut inner = self.inner.lock().unwrap();
        inner.states.insert(hash, InvoiceState::Settled);
        inner.settled.push(preimage);
        Ok(())
    }

    async fn get_invoice_state(&self, hash: PaymentHash) -> Result<InvoiceState, GigmeshError> {
        self.inner
            .lock()
            .unwrap()
            .states
            .get(&hash)
            .copied()
            .ok_or_else(|| GigmeshError::Payment(format!("unknown payment hash {hash}")))
    }

    async fn subscribe_invoice_updates(
        &self,
    ) -> Result<mpsc::Receiver<InvoiceStateChange>, GigmeshError> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().unwrap().subscribers.push(tx);
        Ok(rx)
    }
}

// ── Loopback cross-Settler relay ─────────────────────────────────────────────

/// Single-Settler deployments re-encrypt through themselves; the test
/// relay just frames the plaintext so tests can unwrap it.
pub struct LoopbackCrossSettler;

pub const LOOPBACK_PREFIX: &[u8] = b"reenc:";

#[async_trait]
impl CrossSettlerApi for LoopbackCrossSettler {
    async fn encrypt_for_certificate(
        &self,
        _certificate_id: CertificateId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, GigmeshError> {
        let mut out = LOOPBACK_PREFIX.to_vec();
        out.extend_from_slice(plaintext);
        Ok(out)
    }
}

// ── Test bed ─────────────────────────────────────────────────────────────────

pub struct TestBed {
    pub settler: Arc<Settler>,
    pub payments: Arc<FakePaymentService>,
    pub store: Arc<StoreDb>,
    pub admin: KeyPair,
    pub requester: KeyPair,
    pub replier: KeyPair,
    // Held so the background loops keep running for the test's lifetime.
    #[allow(dead_code)]
    pub shutdown: watch::Sender<bool>,
}

impl TestBed {
    pub fn token(&self, kp: &KeyPair) -> AuthToken {
        AuthToken::issue(kp, now())
    }
}

pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Spin up a settler over a fresh temp store.
pub fn testbed(name: &str, tune: impl FnOnce(&mut SettlerConfig)) -> TestBed {
    let dir = std::env::temp_dir().join(format!("gigmesh_settler_test_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    let store = Arc::new(StoreDb::open(&dir).expect("open temp store"));

    let admin = KeyPair::generate();
    let requester = KeyPair::generate();
    let replier = KeyPair::generate();

    let mut config = SettlerConfig::new("https://settler.test").with_admin(admin.public_key);
    config.reconcile_interval_secs = 1;
    tune(&mut config);

    let payments = FakePaymentService::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let settler = Settler::start(
        config,
        KeyPair::generate(),
        Arc::clone(&store),
        payments.clone(),
        Arc::new(LoopbackCrossSettler),
        shutdown_rx,
    );

    TestBed {
        settler,
        payments,
        store,
        admin,
        requester,
        replier,
        shutdown: shutdown_tx,
    }
}

/// Poll until the gig reaches `want` or the timeout elapses.
pub async fn wait_for_status(bed: &TestBed, key: GigKey, want: GigStatus, secs: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    loop {
        let (status, _) = bed.settler.get_gig_status(&key).expect("gig exists");
        if status == want {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "gig {key} stuck in {status}, wanted {want}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Grant the standard test properties and mint the request/cancel pair.
pub fn issue_request(bed: &TestBed) -> gigmesh_cert::Certificate {
    let t = now();
    bed.settler
        .grant_property(
            &bed.token(&bed.admin),
            bed.requester.public_key,
            "age_over_18",
            b"yes".to_vec(),
            vec![],
            t + 86_400,
            t,
        )
        .unwrap();
    bed.settler
        .grant_property(
            &bed.token(&bed.admin),
            bed.replier.public_key,
            "freelancer",
            b"verified".to_vec(),
            vec![],
            t + 86_400,
            t,
        )
        .unwrap();

    let (request, _cancel) = bed
        .settler
        .issue_certificate_pair(
            &bed.token(&bed.requester),
            &["age_over_18".to_string()],
            b"paint my fence".to_vec(),
            t,
        )
        .unwrap();
    request
}

/// Full happy-path setup: properties, request pair, reply escrow leg, and
/// a settlement trust. Returns the gig key, the trust, and the reply leg's
/// payment hash.
pub async fn open_gig(
    bed: &TestBed,
    amount_sat: Sats,
) -> (GigKey, gigmesh_settler::SettlementTrust, PaymentHash) {
    let request = issue_request(bed);
    let t = now();

    let reply_hash = bed
        .settler
        .generate_reply_payment_preimage(
            &bed.token(&bed.requester),
            request.id,
            bed.replier.public_key,
            t,
        )
        .unwrap();
    bed.payments.register_invoice("lnfake_reply", reply_hash, amount_sat);

    let trust = bed
        .settler
        .generate_settlement_trust(
            &bed.token(&bed.replier),
            &["freelancer".to_string()],
            b"fence painted, photos attached",
            "lnfake_reply",
            &request,
            t,
        )
        .await
        .unwrap();

    let key = GigKey::new(request.id, trust.replier_certificate_id);
    (key, trust, reply_hash)
}
