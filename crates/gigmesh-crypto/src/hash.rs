use gigmesh_core::types::{PaymentHash, Preimage};
use sha2::{Digest, Sha256};

/// Compute SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of several byte slices.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// Derive the payment hash of an escrow preimage. This is the hash the
/// payment layer locks hold invoices to.
pub fn payment_hash(preimage: &Preimage) -> PaymentHash {
    PaymentHash(sha256(preimage.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_equals_single_pass() {
        let whole = sha256(b"hello world");
        let parts = sha256_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(whole, parts);
    }

    #[test]
    fn sha256_known_vector() {
        // SHA256("abc") from FIPS 180-2.
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
