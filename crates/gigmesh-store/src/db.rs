use std::path::Path;

use gigmesh_core::error::GigmeshError;
use gigmesh_core::records::{
    AccessCode, CertificateProperty, Gig, GigKey, GigStatus, GrantedProperty, InvoicePreimage,
    UserCertificate,
};
use gigmesh_core::types::{CertificateId, PaymentHash, PublicKey, Timestamp};

fn storage_err(e: impl std::fmt::Display) -> GigmeshError {
    GigmeshError::Storage(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> GigmeshError {
    GigmeshError::Serialization(e.to_string())
}

/// Outcome of an atomic gig transition.
#[derive(Clone, Debug)]
pub struct GigTransition {
    pub before: Gig,
    pub after: Gig,
}

impl GigTransition {
    /// Did the transition change anything observable?
    pub fn changed(&self) -> bool {
        self.before.status != self.after.status
            || self.before.sub_status != self.after.sub_status
            || self.before.dispute_deadline != self.after.dispute_deadline
    }
}

/// Persistent record store for the Settler.
///
/// Named trees:
///   properties      — subject bytes ‖ name     → bincode(GrantedProperty)
///   certificates    — certificate id (16b)     → bincode(UserCertificate)
///   cert_properties — cert id ‖ property name  → bincode(CertificateProperty)
///   gigs            — GigKey bytes (32b)       → bincode(Gig)
///   gig_hash_index  — payment hash (32b)       → GigKey bytes (membership index)
///   preimages       — payment hash (32b)       → bincode(InvoicePreimage)
///   access_codes    — utf8 code bytes          → bincode(AccessCode)
pub struct StoreDb {
    _db: sled::Db,
    properties: sled::Tree,
    certificates: sled::Tree,
    cert_properties: sled::Tree,
    gigs: sled::Tree,
    gig_hash_index: sled::Tree,
    preimages: sled::Tree,
    access_codes: sled::Tree,
}

fn property_key(subject: &PublicKey, name: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(32 + name.len());
    k.extend_from_slice(subject.as_bytes());
    k.extend_from_slice(name.as_bytes());
    k
}

fn cert_property_key(id: &CertificateId, name: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(16 + name.len());
    k.extend_from_slice(id.as_bytes());
    k.extend_from_slice(name.as_bytes());
    k
}

impl StoreDb {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GigmeshError> {
        let db = sled::open(path).map_err(storage_err)?;
        let properties      = db.open_tree("properties").map_err(storage_err)?;
        let certificates    = db.open_tree("certificates").map_err(storage_err)?;
        let cert_properties = db.open_tree("cert_properties").map_err(storage_err)?;
        let gigs            = db.open_tree("gigs").map_err(storage_err)?;
        let gig_hash_index  = db.open_tree("gig_hash_index").map_err(storage_err)?;
        let preimages       = db.open_tree("preimages").map_err(storage_err)?;
        let access_codes    = db.open_tree("access_codes").map_err(storage_err)?;
        Ok(Self {
            _db: db,
            properties,
            certificates,
            cert_properties,
            gigs,
            gig_hash_index,
            preimages,
            access_codes,
        })
    }

    // ── Granted properties ───────────────────────────────────────────────────

    pub fn put_property(&self, row: &GrantedProperty) -> Result<(), GigmeshError> {
        let bytes = bincode::serialize(row).map_err(ser_err)?;
        self.properties
            .insert(property_key(&row.subject, &row.name), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_property(
        &self,
        subject: &PublicKey,
        name: &str,
    ) -> Result<Option<GrantedProperty>, GigmeshError> {
        match self.properties.get(property_key(subject, name)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// All property rows of a subject (revoked and expired included).
    pub fn properties_for_subject(
        &self,
        subject: &PublicKey,
    ) -> Result<Vec<GrantedProperty>, GigmeshError> {
        let mut rows = Vec::new();
        for item in self.properties.scan_prefix(subject.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            rows.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(rows)
    }

    // ── Issued certificates ──────────────────────────────────────────────────

    pub fn put_certificate(&self, row: &UserCertificate) -> Result<(), GigmeshError> {
        let bytes = bincode::serialize(row).map_err(ser_err)?;
        self.certificates
            .insert(row.certificate_id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_certificate(
        &self,
        id: &CertificateId,
    ) -> Result<Option<UserCertificate>, GigmeshError> {
        match self.certificates.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Flip a certificate's revoked flag. No-op for unknown ids.
    pub fn set_certificate_revoked(&self, id: &CertificateId) -> Result<(), GigmeshError> {
        self.certificates
            .fetch_and_update(id.as_bytes(), |old| {
                let bytes = old?;
                let mut row: UserCertificate = bincode::deserialize(bytes).ok()?;
                row.revoked = true;
                bincode::serialize(&row).ok()
            })
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn put_certificate_property(&self, row: &CertificateProperty) -> Result<(), GigmeshError> {
        let bytes = bincode::serialize(row).map_err(ser_err)?;
        self.cert_properties
            .insert(cert_property_key(&row.certificate_id, &row.property_name), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Which properties backed a given certificate (audit query).
    pub fn properties_for_certificate(
        &self,
        id: &CertificateId,
    ) -> Result<Vec<CertificateProperty>, GigmeshError> {
        let mut rows = Vec::new();
        for item in self.cert_properties.scan_prefix(id.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            rows.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(rows)
    }

    /// Certificates that were issued against a given (subject, property).
    /// Full scan of the join tree; used only by property revocation.
    pub fn certificates_backed_by(
        &self,
        subject: &PublicKey,
        property_name: &str,
    ) -> Result<Vec<CertificateId>, GigmeshError> {
        let mut ids = Vec::new();
        for item in self.cert_properties.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let row: CertificateProperty = bincode::deserialize(&bytes).map_err(ser_err)?;
            if row.subject == *subject && row.property_name == property_name {
                ids.push(row.certificate_id);
            }
        }
        Ok(ids)
    }

    // ── Gigs ─────────────────────────────────────────────────────────────────

    /// Insert a fresh gig row and index both of its payment hashes.
    pub fn put_gig(&self, gig: &Gig) -> Result<(), GigmeshError> {
        let bytes = bincode::serialize(gig).map_err(ser_err)?;
        let key = gig.key.storage_key();
        self.gigs.insert(key, bytes).map_err(storage_err)?;
        self.gig_hash_index
            .insert(gig.network_payment_hash.as_bytes(), &key[..])
            .map_err(storage_err)?;
        self.gig_hash_index
            .insert(gig.reply_payment_hash.as_bytes(), &key[..])
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_gig(&self, key: &GigKey) -> Result<Option<Gig>, GigmeshError> {
        match self.gigs.get(key.storage_key()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Atomic read-modify-write of one gig row.
    ///
    /// `f` maps the current row to its successor; returning `None` leaves
    /// the row untouched. The closure must be pure, since sled may invoke it
    /// more than once under contention. Returns `None` when no row exists,
    /// otherwise the applied transition (`after == before` if `f`
    /// declined).
    pub fn update_gig<F>(&self, key: &GigKey, mut f: F) -> Result<Option<GigTransition>, GigmeshError>
    where
        F: FnMut(&Gig) -> Option<Gig>,
    {
        let mut seen: Option<GigTransition> = None;
        self.gigs
            .update_and_fetch(key.storage_key(), |old| {
                let bytes = old?;
                let before: Gig = match bincode::deserialize(bytes) {
                    Ok(g) => g,
                    Err(_) => return Some(bytes.to_vec()),
                };
                match f(&before) {
                    Some(after) => match bincode::serialize(&after) {
                        Ok(out) => {
                            seen = Some(GigTransition { before, after });
                            Some(out)
                        }
                        Err(_) => Some(bytes.to_vec()),
                    },
                    None => {
                        seen = Some(GigTransition { before: before.clone(), after: before });
                        Some(bytes.to_vec())
                    }
                }
            })
            .map_err(storage_err)?;
        Ok(seen)
    }

    /// Gigs whose network or reply leg uses this payment hash.
    pub fn gigs_for_payment_hash(&self, hash: &PaymentHash) -> Result<Vec<Gig>, GigmeshError> {
        match self.gig_hash_index.get(hash.as_bytes()).map_err(storage_err)? {
            Some(key_bytes) => {
                let Some(key) = GigKey::from_storage_key(&key_bytes) else {
                    return Ok(Vec::new());
                };
                Ok(self.get_gig(&key)?.into_iter().collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// All gigs currently in one of `statuses` (reconciliation sweep).
    pub fn gigs_in_status(&self, statuses: &[GigStatus]) -> Result<Vec<Gig>, GigmeshError> {
        let mut out = Vec::new();
        for item in self.gigs.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let gig: Gig = bincode::deserialize(&bytes).map_err(ser_err)?;
            if statuses.contains(&gig.status) {
                out.push(gig);
            }
        }
        Ok(out)
    }

    // ── Invoice preimages ────────────────────────────────────────────────────

    pub fn put_preimage(&self, row: &InvoicePreimage) -> Result<(), GigmeshError> {
        let bytes = bincode::serialize(row).map_err(ser_err)?;
        self.preimages
            .insert(row.payment_hash.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_preimage(
        &self,
        hash: &PaymentHash,
    ) -> Result<Option<InvoicePreimage>, GigmeshError> {
        match self.preimages.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Atomically flip `revealed`. Returns the row plus whether this call
    /// performed the flip (false when it was already revealed), or `None`
    /// for an unknown hash. The flip happens at most once across all
    /// concurrent callers.
    pub fn reveal_preimage(
        &self,
        hash: &PaymentHash,
    ) -> Result<Option<(InvoicePreimage, bool)>, GigmeshError> {
        let mut seen: Option<(InvoicePreimage, bool)> = None;
        self.preimages
            .update_and_fetch(hash.as_bytes(), |old| {
                let bytes = old?;
                let mut row: InvoicePreimage = match bincode::deserialize(bytes) {
                    Ok(r) => r,
                    Err(_) => return Some(bytes.to_vec()),
                };
                let flipped = !row.revealed;
                row.revealed = true;
                let out = bincode::serialize(&row).ok().unwrap_or_else(|| bytes.to_vec());
                seen = Some((row, flipped));
                Some(out)
            })
            .map_err(storage_err)?;
        Ok(seen)
    }

    /// All escrow legs chained to one broadcast request.
    pub fn preimages_for_request(
        &self,
        request_id: &CertificateId,
    ) -> Result<Vec<InvoicePreimage>, GigmeshError> {
        let mut rows = Vec::new();
        for item in self.preimages.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let row: InvoicePreimage = bincode::deserialize(&bytes).map_err(ser_err)?;
            if row.related_request_id == *request_id {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    // ── Access codes ─────────────────────────────────────────────────────────

    pub fn get_access_code(&self, code: &str) -> Result<Option<AccessCode>, GigmeshError> {
        match self.access_codes.get(code.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Insert a code only if absent. Returns false on collision.
    pub fn insert_access_code_if_absent(&self, row: &AccessCode) -> Result<bool, GigmeshError> {
        let bytes = bincode::serialize(row).map_err(ser_err)?;
        let prior = self
            .access_codes
            .compare_and_swap(row.code.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        Ok(prior.is_ok())
    }

    /// Consume one use of a code: valid codes get their use count bumped
    /// and single-use codes are revoked, atomically. Returns whether the
    /// code was valid at consumption time.
    pub fn consume_access_code(&self, code: &str, now: Timestamp) -> Result<bool, GigmeshError> {
        let mut valid = false;
        self.access_codes
            .update_and_fetch(code.as_bytes(), |old| {
                let bytes = old?;
                let mut row: AccessCode = match bincode::deserialize(bytes) {
                    Ok(r) => r,
                    Err(_) => return Some(bytes.to_vec()),
                };
                valid = row.is_usable(now);
                if valid {
                    row.use_count += 1;
                    if row.single_use {
                        row.revoked = true;
                    }
                }
                Some(bincode::serialize(&row).ok().unwrap_or_else(|| bytes.to_vec()))
            })
            .map_err(storage_err)?;
        Ok(valid)
    }

    /// Revoke a code. No-op for unknown codes.
    pub fn revoke_access_code(&self, code: &str) -> Result<(), GigmeshError> {
        self.access_codes
            .fetch_and_update(code.as_bytes(), |old| {
                let bytes = old?;
                let mut row: AccessCode = bincode::deserialize(bytes).ok()?;
                row.revoked = true;
                bincode::serialize(&row).ok()
            })
            .map_err(storage_err)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), GigmeshError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigmesh_core::constants::NO_DEADLINE;
    use gigmesh_core::records::GigSubStatus;
    use gigmesh_core::types::Preimage;

    fn temp_db(name: &str) -> StoreDb {
        let dir = std::env::temp_dir().join(format!("gigmesh_store_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        StoreDb::open(&dir).expect("open temp db")
    }

    fn pk(n: u8) -> PublicKey {
        PublicKey([n; 32])
    }

    fn sample_gig(req: u8, rep: u8) -> Gig {
        Gig {
            key: GigKey::new(CertificateId([req; 16]), CertificateId([rep; 16])),
            symmetric_key: [7; 32],
            reply_payment_hash: PaymentHash([req ^ 0xaa; 32]),
            network_payment_hash: PaymentHash([req ^ 0x55; 32]),
            status: GigStatus::Open,
            sub_status: GigSubStatus::None,
            dispute_deadline: NO_DEADLINE,
        }
    }

    #[test]
    fn property_upsert_overwrites() {
        let db = temp_db("prop_upsert");
        let subject = pk(1);
        let row = GrantedProperty {
            subject,
            name: "age_over_18".into(),
            public_value: b"yes".to_vec(),
            private_secret: b"s1".to_vec(),
            valid_till: 100,
            revoked: true,
        };
        db.put_property(&row).unwrap();

        let regrant = GrantedProperty { revoked: false, valid_till: 200, ..row };
        db.put_property(&regrant).unwrap();

        let got = db.get_property(&subject, "age_over_18").unwrap().unwrap();
        assert!(!got.revoked);
        assert_eq!(got.valid_till, 200);
        assert_eq!(db.properties_for_subject(&subject).unwrap().len(), 1);
    }

    #[test]
    fn gig_lookup_by_either_hash() {
        let db = temp_db("gig_hash");
        let gig = sample_gig(1, 2);
        db.put_gig(&gig).unwrap();

        let by_network = db.gigs_for_payment_hash(&gig.network_payment_hash).unwrap();
        let by_reply = db.gigs_for_payment_hash(&gig.reply_payment_hash).unwrap();
        assert_eq!(by_network.len(), 1);
        assert_eq!(by_reply.len(), 1);
        assert_eq!(by_network[0].key, gig.key);
    }

    #[test]
    fn update_gig_returns_transition() {
        let db = temp_db("gig_update");
        let gig = sample_gig(3, 4);
        db.put_gig(&gig).unwrap();

        let t = db
            .update_gig(&gig.key, |g| {
                let mut next = g.clone();
                next.status = GigStatus::Accepted;
                next.dispute_deadline = 500;
                Some(next)
            })
            .unwrap()
            .unwrap();
        assert!(t.changed());
        assert_eq!(t.before.status, GigStatus::Open);
        assert_eq!(t.after.status, GigStatus::Accepted);

        // Declining leaves the row untouched and reports no change.
        let t = db.update_gig(&gig.key, |_| None).unwrap().unwrap();
        assert!(!t.changed());
        assert_eq!(db.get_gig(&gig.key).unwrap().unwrap().status, GigStatus::Accepted);

        // Unknown key → None.
        assert!(db.update_gig(&sample_gig(9, 9).key, |_| None).unwrap().is_none());
    }

    #[test]
    fn preimage_reveals_exactly_once() {
        let db = temp_db("preimage_once");
        let hash = PaymentHash([5; 32]);
        db.put_preimage(&InvoicePreimage {
            payment_hash: hash,
            related_request_id: CertificateId([1; 16]),
            replier: pk(2),
            subject: pk(3),
            preimage: Preimage([9; 32]),
            revealed: false,
        })
        .unwrap();

        let (_, flipped) = db.reveal_preimage(&hash).unwrap().unwrap();
        assert!(flipped);
        let (row, flipped_again) = db.reveal_preimage(&hash).unwrap().unwrap();
        assert!(!flipped_again);
        assert!(row.revealed);

        assert!(db.reveal_preimage(&PaymentHash([6; 32])).unwrap().is_none());
    }

    #[test]
    fn single_use_access_code_consumed_once() {
        let db = temp_db("access_code");
        let row = AccessCode {
            code: "BOOT-1234".into(),
            single_use: true,
            use_count: 0,
            valid_till: 1_000,
            revoked: false,
            memo: "onboarding".into(),
        };
        assert!(db.insert_access_code_if_absent(&row).unwrap());
        assert!(!db.insert_access_code_if_absent(&row).unwrap(), "collision must be reported");

        assert!(db.consume_access_code("BOOT-1234", 500).unwrap());
        assert!(!db.consume_access_code("BOOT-1234", 500).unwrap(), "single-use is spent");

        let stored = db.get_access_code("BOOT-1234").unwrap().unwrap();
        assert_eq!(stored.use_count, 1);
        assert!(stored.revoked);
    }

    #[test]
    fn expired_access_code_rejected() {
        let db = temp_db("access_code_exp");
        let row = AccessCode {
            code: "LATE".into(),
            single_use: false,
            use_count: 0,
            valid_till: 100,
            revoked: false,
            memo: String::new(),
        };
        db.insert_access_code_if_absent(&row).unwrap();
        assert!(!db.consume_access_code("LATE", 101).unwrap());
        assert!(db.consume_access_code("LATE", 99).unwrap());
    }
}
