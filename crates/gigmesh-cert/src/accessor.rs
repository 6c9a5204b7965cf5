use async_trait::async_trait;
use gigmesh_core::types::{CertificateId, PublicKey};
use gigmesh_core::GigmeshError;

/// Read-side of a Certification Authority, consumed when verifying
/// certificates issued elsewhere (including by this process's own CA).
#[async_trait]
pub trait CaAccessor: Send + Sync {
    /// Resolve the authority's signing public key by its URI.
    async fn get_public_key(&self, authority_uri: &str) -> Result<PublicKey, GigmeshError>;

    /// Has this certificate been revoked by its authority?
    async fn is_revoked(
        &self,
        authority_uri: &str,
        certificate_id: CertificateId,
    ) -> Result<bool, GigmeshError>;
}
