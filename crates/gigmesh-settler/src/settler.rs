use std::sync::Arc;

use gigmesh_cert::{CaAccessor, Certificate, CertificationAuthority};
use gigmesh_core::constants::{ACCESS_CODE_LENGTH, NO_DEADLINE};
use gigmesh_core::records::{
    AccessCode, CertificateProperty, Gig, GigKey, GigStatus, GigSubStatus, GrantedProperty,
    InvoicePreimage, UserCertificate,
};
use gigmesh_core::types::{
    CertificateId, CertificateKind, PaymentHash, Preimage, PublicKey, Timestamp,
};
use gigmesh_core::GigmeshError;
use gigmesh_crypto::aead::{generate_symmetric_key, symmetric_encrypt};
use gigmesh_crypto::hash::payment_hash;
use gigmesh_crypto::sign::canonical_bytes;
use gigmesh_crypto::KeyPair;
use gigmesh_promise::SettlementPromise;
use gigmesh_store::StoreDb;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::auth::AuthToken;
use crate::config::SettlerConfig;
use crate::events::{EventHub, SettlerEvent};
use crate::monitor;
use crate::payment::{CrossSettlerApi, EscrowInvoice, InvoiceState, PaymentServiceApi};
use crate::scheduler::DeadlineScheduler;

// ── Payloads ─────────────────────────────────────────────────────────────────

/// The value carried by a `Reply` certificate: the request it answers, the
/// encrypted reply message, and the payment terms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub request: Certificate,
    pub encrypted_message: Vec<u8>,
    pub reply_invoice: String,
    pub timestamp: Timestamp,
}

/// Everything a replier hands back to the requester after
/// `generate_settlement_trust`.
#[derive(Clone, Debug)]
pub struct SettlementTrust {
    pub settlement_promise: SettlementPromise,
    pub network_invoice: EscrowInvoice,
    /// The reply certificate, re-encrypted so only the requester can read it.
    pub encrypted_reply_payload: Vec<u8>,
    pub replier_certificate_id: CertificateId,
}

fn random_preimage() -> Preimage {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Preimage(bytes)
}

// ── Settler ──────────────────────────────────────────────────────────────────

/// The settlement engine. One instance per deployment, constructed at
/// startup and shared by `Arc` between request handlers, the invoice
/// monitor and the deadline scheduler.
///
/// All state lives in the record store; gig transitions go through atomic
/// row updates so concurrent invocations from the monitor loop, the
/// scheduler and direct API calls cannot interleave on the same key.
pub struct Settler {
    config: SettlerConfig,
    keypair: KeyPair,
    ca: CertificationAuthority,
    store: Arc<StoreDb>,
    payments: Arc<dyn PaymentServiceApi>,
    cross: Arc<dyn CrossSettlerApi>,
    events: EventHub,
    scheduler: DeadlineScheduler,
}

impl Settler {
    /// Construct the service and spawn its background tasks (deadline
    /// coordinator, deadline executor, invoice monitor). Must be called
    /// inside a tokio runtime. `shutdown` flipping to `true` stops every
    /// loop; in-flight settlements run to completion.
    pub fn start(
        config: SettlerConfig,
        keypair: KeyPair,
        store: Arc<StoreDb>,
        payments: Arc<dyn PaymentServiceApi>,
        cross: Arc<dyn CrossSettlerApi>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let ca = CertificationAuthority::new(config.uri.clone(), keypair.clone());
        let events = EventHub::new(config.event_capacity);
        let (scheduler, due_rx) = DeadlineScheduler::spawn(shutdown.clone());

        let settler = Arc::new(Self {
            config,
            keypair,
            ca,
            store,
            payments,
            cross,
            events,
            scheduler,
        });

        tokio::spawn(deadline_loop(Arc::clone(&settler), due_rx, shutdown.clone()));
        tokio::spawn(monitor::run(Arc::clone(&settler), shutdown));
        info!(uri = %settler.config.uri, "settler started");
        settler
    }

    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    pub(crate) fn payments(&self) -> &dyn PaymentServiceApi {
        self.payments.as_ref()
    }

    /// Subscribe to gig-status and preimage-reveal notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SettlerEvent> {
        self.events.subscribe()
    }

    /// The CA public key certificates from this Settler verify against.
    pub fn ca_public_key(&self) -> PublicKey {
        self.ca.public_key()
    }

    // ── Caller authentication ────────────────────────────────────────────────

    fn authenticate(&self, token: &AuthToken, now: Timestamp) -> Result<PublicKey, GigmeshError> {
        token.validate(now, self.config.auth_token_window_secs)
    }

    fn require_admin(&self, caller: &PublicKey) -> Result<(), GigmeshError> {
        if self.config.is_admin(caller) {
            Ok(())
        } else {
            Err(GigmeshError::AccessDenied)
        }
    }

    /// Restricted gig operations are open to admins and the gig's own
    /// parties (subjects of the request/reply certificates, where known).
    fn authorize_gig_party(&self, caller: &PublicKey, key: &GigKey) -> Result<(), GigmeshError> {
        if self.config.is_admin(caller) {
            return Ok(());
        }
        for id in [key.replier_certificate_id, key.request_id] {
            if let Some(cert) = self.store.get_certificate(&id)? {
                if cert.subject == *caller {
                    return Ok(());
                }
            }
        }
        Err(GigmeshError::AccessDenied)
    }

    // ── Properties ───────────────────────────────────────────────────────────

    /// Grant (or re-grant) a property to a subject. Re-granting overwrites
    /// value, secret and expiry and clears any revocation.
    pub fn grant_property(
        &self,
        token: &AuthToken,
        subject: PublicKey,
        name: &str,
        public_value: Vec<u8>,
        private_secret: Vec<u8>,
        valid_till: Timestamp,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.require_admin(&caller)?;

        self.store.put_property(&GrantedProperty {
            subject,
            name: name.to_string(),
            public_value,
            private_secret,
            valid_till,
            revoked: false,
        })?;
        info!(subject = %subject, property = name, valid_till, "property granted");
        Ok(())
    }

    /// Revoke a property. The row is flagged, never deleted, and every
    /// certificate issued against it is revoked with it.
    pub fn revoke_property(
        &self,
        token: &AuthToken,
        subject: PublicKey,
        name: &str,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.require_admin(&caller)?;

        let mut row = self
            .store
            .get_property(&subject, name)?
            .ok_or_else(|| GigmeshError::PropertyNotGranted(name.to_string()))?;
        row.revoked = true;
        self.store.put_property(&row)?;

        for id in self.store.certificates_backed_by(&subject, name)? {
            self.store.set_certificate_revoked(&id)?;
            debug!(certificate = %id, "revoked with its backing property");
        }
        info!(subject = %subject, property = name, "property revoked");
        Ok(())
    }

    // ── Certificates ─────────────────────────────────────────────────────────

    fn record_issued(
        &self,
        cert: &Certificate,
        subject: &PublicKey,
    ) -> Result<(), GigmeshError> {
        self.store.put_certificate(&UserCertificate {
            kind: cert.kind.clone(),
            certificate_id: cert.id,
            subject: *subject,
            revoked: false,
        })?;
        for name in cert.properties.keys() {
            self.store.put_certificate_property(&CertificateProperty {
                certificate_id: cert.id,
                subject: *subject,
                property_name: name.clone(),
            })?;
        }
        Ok(())
    }

    /// Issue the request/cancel certificate pair backing one broadcast.
    /// The cancel certificate's value is the request certificate's id so a
    /// relay can match a cancellation to the broadcast it voids.
    pub fn issue_certificate_pair(
        &self,
        token: &AuthToken,
        property_names: &[String],
        request_value: Vec<u8>,
        now: Timestamp,
    ) -> Result<(Certificate, Certificate), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        let granted = self.store.properties_for_subject(&caller)?;

        let request = self.ca.issue(
            CertificateKind::Request,
            &caller,
            property_names,
            &granted,
            request_value,
            now,
        )?;
        let cancel = self.ca.issue(
            CertificateKind::Cancel,
            &caller,
            property_names,
            &granted,
            request.id.as_bytes().to_vec(),
            now,
        )?;

        self.record_issued(&request, &caller)?;
        self.record_issued(&cancel, &caller)?;
        info!(subject = %caller, request = %request.id, "request/cancel certificates issued");
        Ok((request, cancel))
    }

    pub fn is_certificate_revoked(&self, id: &CertificateId) -> Result<bool, GigmeshError> {
        self.store
            .get_certificate(id)?
            .map(|c| c.revoked)
            .ok_or_else(|| GigmeshError::UnknownCertificate(id.to_hex()))
    }

    // ── Escrow preimages ─────────────────────────────────────────────────────

    /// Register a fresh escrow secret for a reply leg of `request_id`.
    /// The caller becomes its subject; the hash is returned for use in a
    /// hold invoice.
    pub fn generate_reply_payment_preimage(
        &self,
        token: &AuthToken,
        request_id: CertificateId,
        replier: PublicKey,
        now: Timestamp,
    ) -> Result<PaymentHash, GigmeshError> {
        let subject = self.authenticate(token, now)?;
        let preimage = random_preimage();
        let hash = payment_hash(&preimage);
        self.store.put_preimage(&InvoicePreimage {
            payment_hash: hash,
            related_request_id: request_id,
            replier,
            subject,
            preimage,
            revealed: false,
        })?;
        debug!(hash = %hash, request = %request_id, "reply payment preimage registered");
        Ok(hash)
    }

    /// Chain a new escrow secret to the same request as an existing one,
    /// enabling payment relaying along the broadcast path.
    pub fn generate_related_preimage(
        &self,
        token: &AuthToken,
        existing: &PaymentHash,
        now: Timestamp,
    ) -> Result<PaymentHash, GigmeshError> {
        let subject = self.authenticate(token, now)?;
        let row = self
            .store
            .get_preimage(existing)?
            .ok_or_else(|| GigmeshError::UnknownPreimage(existing.to_hex()))?;

        let preimage = random_preimage();
        let hash = payment_hash(&preimage);
        self.store.put_preimage(&InvoicePreimage {
            payment_hash: hash,
            related_request_id: row.related_request_id,
            replier: row.replier,
            subject,
            preimage,
            revealed: false,
        })?;
        Ok(hash)
    }

    /// True iff both hashes trace to the same broadcast request.
    pub fn validate_related_payment_hashes(
        &self,
        a: &PaymentHash,
        b: &PaymentHash,
    ) -> Result<bool, GigmeshError> {
        Ok(match (self.store.get_preimage(a)?, self.store.get_preimage(b)?) {
            (Some(x), Some(y)) => x.related_request_id == y.related_request_id,
            _ => false,
        })
    }

    /// Fetch an escrow secret once its gig has completed. `Ok(None)` while
    /// it is still unrevealed; only the secret's subject (or an admin) may
    /// ask.
    pub fn reveal_preimage(
        &self,
        token: &AuthToken,
        hash: &PaymentHash,
        now: Timestamp,
    ) -> Result<Option<Preimage>, GigmeshError> {
        let caller = self.authenticate(token, now)?;
        let row = self
            .store
            .get_preimage(hash)?
            .ok_or_else(|| GigmeshError::UnknownPreimage(hash.to_hex()))?;
        if row.subject != caller && !self.config.is_admin(&caller) {
            return Err(GigmeshError::AccessDenied);
        }
        Ok(row.revealed.then_some(row.preimage))
    }

    // ── Access codes ─────────────────────────────────────────────────────────

    /// Mint a unique random bootstrap code. Collisions are retried a fixed
    /// number of times before giving up.
    pub fn issue_access_code(
        &self,
        token: &AuthToken,
        single_use: bool,
        valid_till: Timestamp,
        memo: &str,
        now: Timestamp,
    ) -> Result<String, GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.require_admin(&caller)?;

        for _ in 0..self.config.access_code_retry_max {
            let code: String = {
                use rand::distributions::Alphanumeric;
                use rand::Rng;
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(ACCESS_CODE_LENGTH)
                    .map(char::from)
                    .collect()
            };
            let row = AccessCode {
                code: code.clone(),
                single_use,
                use_count: 0,
                valid_till,
                revoked: false,
                memo: memo.to_string(),
            };
            if self.store.insert_access_code_if_absent(&row)? {
                info!(single_use, valid_till, "access code issued");
                return Ok(code);
            }
        }
        Err(GigmeshError::AccessCodeCollision {
            attempts: self.config.access_code_retry_max,
        })
    }

    /// Consume one use of a code: valid codes get their count bumped and
    /// single-use codes are revoked by the validation itself.
    pub fn validate_access_code(&self, code: &str, now: Timestamp) -> Result<bool, GigmeshError> {
        self.store.consume_access_code(code, now)
    }

    pub fn revoke_access_code(
        &self,
        token: &AuthToken,
        code: &str,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.require_admin(&caller)?;
        self.store.revoke_access_code(code)
    }

    // ── Settlement trust ─────────────────────────────────────────────────────

    /// The core of the protocol: bind an encrypted reply to a signed
    /// payment commitment and open the chained escrow.
    ///
    /// Ordering matters: every persistent write happens only after its
    /// prerequisite external call succeeded, so a failure part-way leaves
    /// no promise without matching invoices. In particular an unknown
    /// reply invoice fails before any state exists (no gig row, no escrow
    /// leg).
    pub async fn generate_settlement_trust(
        &self,
        token: &AuthToken,
        replier_properties: &[String],
        message: &[u8],
        reply_invoice: &str,
        signed_request_payload: &Certificate,
        now: Timestamp,
    ) -> Result<SettlementTrust, GigmeshError> {
        let replier = self.authenticate(token, now)?;

        // The reply invoice must be one this Settler pre-registered for
        // this very request.
        let decoded = self.payments.decode_invoice(reply_invoice).await?;
        self.store
            .get_preimage(&decoded.payment_hash)?
            .filter(|row| row.related_request_id == signed_request_payload.id)
            .ok_or_else(|| GigmeshError::UnknownPreimage(decoded.payment_hash.to_hex()))?;

        // Encrypt the reply under a fresh key and certify it against the
        // replier's granted properties.
        let symmetric_key = generate_symmetric_key();
        let encrypted_message = symmetric_encrypt(&symmetric_key, message)?;
        let payload = ReplyPayload {
            request: signed_request_payload.clone(),
            encrypted_message,
            reply_invoice: reply_invoice.to_string(),
            timestamp: now,
        };
        let granted = self.store.properties_for_subject(&replier)?;
        let reply_certificate = self.ca.issue(
            CertificateKind::Reply,
            &replier,
            replier_properties,
            &granted,
            canonical_bytes(&payload),
            now,
        )?;
        self.record_issued(&reply_certificate, &replier)?;

        // Open the Settler's own fee leg, chained to the same request.
        let network_preimage = random_preimage();
        let network_hash = payment_hash(&network_preimage);
        let network_invoice = self
            .payments
            .open_escrow_invoice(
                self.config.settlement_fee_sat,
                network_hash,
                &format!("gig network fee {}", signed_request_payload.id),
                self.config.invoice_expiry_secs,
            )
            .await?;
        self.store.put_preimage(&InvoicePreimage {
            payment_hash: network_hash,
            related_request_id: signed_request_payload.id,
            replier,
            subject: self.keypair.public_key,
            preimage: network_preimage,
            revealed: false,
        })?;

        let key = GigKey::new(signed_request_payload.id, reply_certificate.id);
        self.store.put_gig(&Gig {
            key,
            symmetric_key,
            reply_payment_hash: decoded.payment_hash,
            network_payment_hash: network_hash,
            status: GigStatus::Open,
            sub_status: GigSubStatus::None,
            dispute_deadline: NO_DEADLINE,
        })?;

        // Re-encrypt the reply certificate so only the requester (subject
        // of the request certificate) can read it, then promise its hash.
        let encrypted_reply_payload = self
            .cross
            .encrypt_for_certificate(
                signed_request_payload.id,
                &canonical_bytes(&reply_certificate),
            )
            .await?;
        let settlement_promise = SettlementPromise::sign(
            &self.keypair,
            self.config.uri.clone(),
            signed_request_payload.authority_uri.clone(),
            network_hash,
            &encrypted_reply_payload,
            decoded.amount_sat,
        );

        // Both legs are now watched: pull their current states so one that
        // was already accepted is picked up without waiting for the stream.
        for hash in [network_hash, decoded.payment_hash] {
            match self.payments.get_invoice_state(hash).await {
                Ok(state) => self.on_invoice_state(hash, state, now).await?,
                Err(e) => debug!(hash = %hash, error = %e, "initial state query failed"),
            }
        }

        info!(gig = %key, amount_sat = decoded.amount_sat, "settlement trust issued");
        Ok(SettlementTrust {
            settlement_promise,
            network_invoice,
            encrypted_reply_payload,
            replier_certificate_id: reply_certificate.id,
        })
    }

    // ── Gig state machine ────────────────────────────────────────────────────

    /// Apply one externally reported invoice state change. Driven by the
    /// monitor loop; safe to call repeatedly with the same report.
    pub async fn on_invoice_state(
        &self,
        hash: PaymentHash,
        state: InvoiceState,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        match state {
            InvoiceState::Accepted => {
                for gig in self.store.gigs_for_payment_hash(&hash)? {
                    self.on_leg_accepted(gig.key, hash, now).await?;
                }
            }
            InvoiceState::Cancelled => {
                for gig in self.store.gigs_for_payment_hash(&hash)? {
                    self.on_leg_cancelled(gig.key, hash).await?;
                }
            }
            // Settled legs are the tail end of our own settlement; Open is
            // the initial state. Neither moves a gig.
            InvoiceState::Open | InvoiceState::Settled => {}
        }
        Ok(())
    }

    async fn on_leg_accepted(
        &self,
        key: GigKey,
        hash: PaymentHash,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let dispute_timeout = self.config.dispute_timeout_secs;
        let Some(transition) = self.store.update_gig(&key, |gig| {
            if gig.status != GigStatus::Open {
                return None; // repeated "Accepted" for a settled gig: no-op
            }
            let leg = if hash == gig.network_payment_hash {
                GigSubStatus::AcceptedByNetwork
            } else {
                GigSubStatus::AcceptedByReply
            };
            let mut next = gig.clone();
            if gig.sub_status == GigSubStatus::None {
                next.sub_status = leg;
                Some(next)
            } else if gig.sub_status == leg {
                None // same leg reported twice before the other arrived
            } else {
                // The opposite leg was already in: both are accepted.
                next.status = GigStatus::Accepted;
                next.dispute_deadline = now + dispute_timeout;
                Some(next)
            }
        })?
        else {
            return Ok(());
        };

        if transition.before.status == GigStatus::Open
            && transition.after.status == GigStatus::Accepted
        {
            info!(
                gig = %key,
                deadline = transition.after.dispute_deadline,
                "both escrow legs accepted"
            );
            self.scheduler.schedule(key, transition.after.dispute_deadline).await;
            self.events.publish(SettlerEvent::GigStatusChanged {
                key,
                status: GigStatus::Accepted,
                symmetric_key: Some(transition.after.symmetric_key),
            });
        }
        Ok(())
    }

    async fn on_leg_cancelled(&self, key: GigKey, hash: PaymentHash) -> Result<(), GigmeshError> {
        let Some(transition) = self.store.update_gig(&key, |gig| {
            if gig.status != GigStatus::Open {
                return None;
            }
            let mut next = gig.clone();
            next.status = GigStatus::Cancelled;
            next.sub_status = GigSubStatus::None;
            Some(next)
        })?
        else {
            return Ok(());
        };

        if transition.changed() {
            let other = if hash == transition.after.network_payment_hash {
                transition.after.reply_payment_hash
            } else {
                transition.after.network_payment_hash
            };
            if let Err(e) = self.payments.cancel_invoice(other).await {
                warn!(gig = %key, error = %e, "best-effort cancel of the other escrow leg failed");
            }
            info!(gig = %key, "gig cancelled after escrow leg cancellation");
            self.events.publish(SettlerEvent::GigStatusChanged {
                key,
                status: GigStatus::Cancelled,
                symmetric_key: None,
            });
        }
        Ok(())
    }

    /// Reconciliation sweep over all Open/Accepted gigs. Runs on every
    /// monitor (re)connect and on a periodic tick: notifications may have
    /// been lost, and an Accepted gig past its deadline settles
    /// immediately rather than waiting for a job that may never fire.
    pub async fn reconcile_sweep(&self, now: Timestamp) -> Result<(), GigmeshError> {
        for gig in self.store.gigs_in_status(&[GigStatus::Open, GigStatus::Accepted])? {
            match gig.status {
                GigStatus::Accepted => {
                    if now >= gig.dispute_deadline {
                        self.settle_gig(gig.key).await?;
                    } else {
                        // Re-arm after restart or reconnect; keyed
                        // scheduling makes this idempotent.
                        self.scheduler.schedule(gig.key, gig.dispute_deadline).await;
                    }
                }
                GigStatus::Open => {
                    for hash in [gig.network_payment_hash, gig.reply_payment_hash] {
                        match self.payments.get_invoice_state(hash).await {
                            Ok(InvoiceState::Accepted) => {
                                self.on_leg_accepted(gig.key, hash, now).await?;
                            }
                            Ok(InvoiceState::Cancelled) => {
                                self.on_leg_cancelled(gig.key, hash).await?;
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(gig = %gig.key, hash = %hash, error = %e,
                                    "reconciliation state query failed");
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ── Disputes & cancellation ──────────────────────────────────────────────

    /// Pause the deadline clock on an accepted gig.
    pub async fn open_dispute(
        &self,
        token: &AuthToken,
        key: GigKey,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.authorize_gig_party(&caller, &key)?;

        let transition = self
            .store
            .update_gig(&key, |gig| {
                if gig.status != GigStatus::Accepted {
                    return None;
                }
                let mut next = gig.clone();
                next.status = GigStatus::Disputed;
                Some(next)
            })?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;

        if !transition.changed() {
            return Err(GigmeshError::InvalidGigState {
                required: "Accepted".into(),
                found: transition.before.status.to_string(),
            });
        }

        self.scheduler.cancel(key).await;
        info!(gig = %key, "dispute opened");
        self.events.publish(SettlerEvent::GigStatusChanged {
            key,
            status: GigStatus::Disputed,
            symmetric_key: Some(transition.after.symmetric_key),
        });
        Ok(())
    }

    /// Resume the deadline clock. The job is rescheduled at the *stored*
    /// deadline, so a deadline that passed during the dispute fires
    /// immediately.
    pub async fn close_dispute(
        &self,
        token: &AuthToken,
        key: GigKey,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.authorize_gig_party(&caller, &key)?;

        let transition = self
            .store
            .update_gig(&key, |gig| {
                if gig.status != GigStatus::Disputed {
                    return None;
                }
                let mut next = gig.clone();
                next.status = GigStatus::Accepted;
                Some(next)
            })?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;

        if !transition.changed() {
            return Err(GigmeshError::InvalidGigState {
                required: "Disputed".into(),
                found: transition.before.status.to_string(),
            });
        }

        self.scheduler.schedule(key, transition.after.dispute_deadline).await;
        info!(gig = %key, "dispute closed");
        self.events.publish(SettlerEvent::GigStatusChanged {
            key,
            status: GigStatus::Accepted,
            symmetric_key: Some(transition.after.symmetric_key),
        });
        Ok(())
    }

    /// Cancel a gig from any non-terminal state. An accepted gig's
    /// deadline job is descheduled and its network leg cancelled
    /// best-effort; a stuck escrow leg is preferable to a blocked state
    /// machine.
    pub async fn cancel_gig(
        &self,
        token: &AuthToken,
        key: GigKey,
        now: Timestamp,
    ) -> Result<(), GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.authorize_gig_party(&caller, &key)?;

        let transition = self
            .store
            .update_gig(&key, |gig| {
                if gig.status.is_terminal() {
                    return None;
                }
                let mut next = gig.clone();
                next.status = GigStatus::Cancelled;
                next.sub_status = GigSubStatus::None;
                Some(next)
            })?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;

        if !transition.changed() {
            return Err(GigmeshError::InvalidGigState {
                required: "Open|Accepted|Disputed".into(),
                found: transition.before.status.to_string(),
            });
        }

        if transition.before.status == GigStatus::Accepted {
            self.scheduler.cancel(key).await;
            if let Err(e) = self
                .payments
                .cancel_invoice(transition.after.network_payment_hash)
                .await
            {
                warn!(gig = %key, error = %e, "best-effort network invoice cancel failed");
            }
        }
        info!(gig = %key, from = %transition.before.status, "gig cancelled");
        self.events.publish(SettlerEvent::GigStatusChanged {
            key,
            status: GigStatus::Cancelled,
            symmetric_key: None,
        });
        Ok(())
    }

    // ── Settlement ───────────────────────────────────────────────────────────

    /// The success path: reveal every replier-owned escrow secret for the
    /// request, complete the gig, settle the Settler's own fee leg.
    ///
    /// No-op unless the gig is `Accepted`: a deadline job firing on a
    /// disputed or already-completed gig does nothing. Safe under
    /// concurrent invocation: reveals flip at most once and exactly one
    /// caller wins the `Accepted → Completed` transition.
    pub async fn settle_gig(&self, key: GigKey) -> Result<(), GigmeshError> {
        let gig = self
            .store
            .get_gig(&key)?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;
        if gig.status != GigStatus::Accepted {
            debug!(gig = %key, status = %gig.status, "settle skipped");
            return Ok(());
        }

        let replier = self
            .store
            .get_certificate(&key.replier_certificate_id)?
            .ok_or_else(|| {
                GigmeshError::Internal(format!(
                    "no certificate record for replier {}",
                    key.replier_certificate_id
                ))
            })?
            .subject;

        // Reveal first, complete second: if we crash in between, the gig
        // is still Accepted past its deadline and the sweep retries, with
        // the already-flipped rows reducing to no-ops.
        for row in self.store.preimages_for_request(&key.request_id)? {
            if row.replier != replier {
                continue;
            }
            if let Some((revealed, flipped)) = self.store.reveal_preimage(&row.payment_hash)? {
                if flipped {
                    self.events.publish(SettlerEvent::PreimageRevealed {
                        payment_hash: revealed.payment_hash,
                        preimage: revealed.preimage,
                    });
                }
            }
        }

        let Some(transition) = self.store.update_gig(&key, |gig| {
            if gig.status != GigStatus::Accepted {
                return None;
            }
            let mut next = gig.clone();
            next.status = GigStatus::Completed;
            Some(next)
        })?
        else {
            return Ok(());
        };

        if transition.changed() {
            // A missing row here is a consistency bug, not a recoverable
            // caller error: the leg was registered before the gig existed.
            let own_leg = self
                .store
                .get_preimage(&transition.after.network_payment_hash)?
                .ok_or_else(|| {
                    GigmeshError::Internal(format!(
                        "no preimage registered for network leg {}",
                        transition.after.network_payment_hash
                    ))
                })?;
            if let Err(e) = self.payments.settle_invoice(own_leg.preimage).await {
                warn!(gig = %key, error = %e, "settling the network escrow leg failed");
            }
            info!(gig = %key, "gig completed");
            self.events.publish(SettlerEvent::GigStatusChanged {
                key,
                status: GigStatus::Completed,
                symmetric_key: Some(transition.after.symmetric_key),
            });
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get_gig_status(&self, key: &GigKey) -> Result<(GigStatus, GigSubStatus), GigmeshError> {
        let gig = self
            .store
            .get_gig(key)?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;
        Ok((gig.status, gig.sub_status))
    }

    /// The reply decryption key, available to the gig's parties from
    /// `Accepted` onward so the requester can inspect the reply while the
    /// dispute window is open. `Ok(None)` while the gig is still `Open`
    /// or after cancellation.
    pub fn reveal_symmetric_key(
        &self,
        token: &AuthToken,
        key: GigKey,
        now: Timestamp,
    ) -> Result<Option<[u8; 32]>, GigmeshError> {
        let caller = self.authenticate(token, now)?;
        self.authorize_gig_party(&caller, &key)?;

        let gig = self
            .store
            .get_gig(&key)?
            .ok_or_else(|| GigmeshError::GigNotFound(key.to_string()))?;
        Ok(match gig.status {
            GigStatus::Accepted | GigStatus::Disputed | GigStatus::Completed => {
                Some(gig.symmetric_key)
            }
            GigStatus::Open | GigStatus::Cancelled => None,
        })
    }
}

// ── CA accessor over the local authority ─────────────────────────────────────

#[async_trait::async_trait]
impl CaAccessor for Settler {
    async fn get_public_key(&self, authority_uri: &str) -> Result<PublicKey, GigmeshError> {
        if authority_uri == self.config.uri {
            Ok(self.ca.public_key())
        } else {
            Err(GigmeshError::CrossSettler(format!(
                "unknown authority: {authority_uri}"
            )))
        }
    }

    async fn is_revoked(
        &self,
        authority_uri: &str,
        certificate_id: CertificateId,
    ) -> Result<bool, GigmeshError> {
        if authority_uri != self.config.uri {
            return Err(GigmeshError::CrossSettler(format!(
                "unknown authority: {authority_uri}"
            )));
        }
        self.is_certificate_revoked(&certificate_id)
    }
}

// ── Deadline executor ────────────────────────────────────────────────────────

/// Consumes due gig keys from the scheduler and runs settlement.
async fn deadline_loop(
    settler: Arc<Settler>,
    mut due_rx: mpsc::Receiver<GigKey>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            key = due_rx.recv() => match key {
                Some(key) => {
                    if let Err(e) = settler.settle_gig(key).await {
                        warn!(gig = %key, error = %e, "deadline settlement failed");
                    }
                }
                None => break,
            },
        }
    }
    debug!("deadline executor stopped");
}
