use std::collections::BTreeMap;

use gigmesh_core::records::GrantedProperty;
use gigmesh_core::types::{CertificateId, CertificateKind, PublicKey, SchnorrSignature, Timestamp};
use gigmesh_core::GigmeshError;
use gigmesh_crypto::sign::sign_object;
use gigmesh_crypto::KeyPair;

use crate::certificate::Certificate;

/// The issuing side of a Certification Authority.
///
/// Holds the authority signing key and URI. Property lookup and audit-row
/// persistence belong to the service that owns the record store; `issue`
/// is a pure function of the granted rows handed to it.
pub struct CertificationAuthority {
    pub uri: String,
    keypair: KeyPair,
}

impl CertificationAuthority {
    pub fn new(uri: impl Into<String>, keypair: KeyPair) -> Self {
        Self { uri: uri.into(), keypair }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key
    }

    /// Issue a certificate for `subject` over `requested` property names,
    /// backed by the caller-supplied granted rows.
    ///
    /// Fails with `PropertyNotGranted` when any requested name has no
    /// matching non-revoked, non-expired grant. The certificate can never
    /// outlive its weakest backing property: `not_valid_after` is the
    /// minimum `valid_till` of the matched rows.
    ///
    /// `value` is opaque serialized payload; the certificate does not
    /// interpret it.
    pub fn issue(
        &self,
        kind: CertificateKind,
        subject: &PublicKey,
        requested: &[String],
        granted: &[GrantedProperty],
        value: Vec<u8>,
        now: Timestamp,
    ) -> Result<Certificate, GigmeshError> {
        let mut properties = BTreeMap::new();
        let mut not_valid_after = Timestamp::MAX;

        for name in requested {
            let row = granted
                .iter()
                .find(|p| p.subject == *subject && p.name == *name && p.is_valid(now))
                .ok_or_else(|| GigmeshError::PropertyNotGranted(name.clone()))?;
            properties.insert(row.name.clone(), row.public_value.clone());
            not_valid_after = not_valid_after.min(row.valid_till);
        }

        let mut cert = Certificate {
            signature: SchnorrSignature::empty(),
            authority_uri: self.uri.clone(),
            kind,
            id: CertificateId::random(),
            properties,
            not_valid_before: now,
            not_valid_after,
            value,
        };
        cert.signature = sign_object(&cert.signable(), &self.keypair);
        Ok(cert)
    }
}
