//! gigmesh-pow
//!
//! Proof-of-work admission gate for broadcasts. A relay accepts a message
//! only when `SHA256(canonical_bytes(obj) ‖ nuance_le8)`, read as an
//! unsigned little-endian 256-bit integer, is at or below the target.
//! The target is `MAX / complexity`; the admission policy picks the
//! complexity to bound expected search cost. Stateless.

use gigmesh_core::GigmeshError;
use gigmesh_crypto::hash::sha256_parts;
use gigmesh_crypto::sign::canonical_bytes;
use serde::{Deserialize, Serialize};

/// The only supported scheme tag.
pub const SCHEME_SHA256: &str = "sha256";

// ── Target ───────────────────────────────────────────────────────────────────

/// 256-bit unsigned threshold, little-endian u64 limbs (limb 0 least
/// significant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target(pub [u64; 4]);

impl Target {
    pub const MAX: Target = Target([u64::MAX; 4]);

    /// Zero target: the auto-valid sentinel produced by complexity 0.
    pub const ZERO: Target = Target([0; 4]);

    /// `MAX / complexity`; complexity 0 yields the auto-valid `ZERO`.
    pub fn from_complexity(complexity: u64) -> Self {
        if complexity == 0 {
            return Target::ZERO;
        }
        // 256-by-64-bit long division, most significant limb first.
        let mut limbs = [0u64; 4];
        let mut rem: u128 = 0;
        for i in (0..4).rev() {
            let cur = (rem << 64) | u64::MAX as u128;
            limbs[i] = (cur / complexity as u128) as u64;
            rem = cur % complexity as u128;
        }
        Target(limbs)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Does a digest, read little-endian, satisfy `digest ≤ target`?
    /// A zero target auto-validates everything.
    pub fn is_met_by(&self, digest: &[u8; 32]) -> bool {
        if self.is_zero() {
            return true;
        }
        // Compare from the most significant limb down.
        for i in (0..4).rev() {
            let mut limb_bytes = [0u8; 8];
            limb_bytes.copy_from_slice(&digest[i * 8..(i + 1) * 8]);
            let digest_limb = u64::from_le_bytes(limb_bytes);
            if digest_limb < self.0[i] {
                return true;
            }
            if digest_limb > self.0[i] {
                return false;
            }
        }
        true // equal
    }
}

// ── Proof of work ────────────────────────────────────────────────────────────

/// A solved admission puzzle attached to a broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWork {
    pub scheme: String,
    pub target: Target,
    pub nuance: i64,
}

fn pow_digest<T: Serialize>(obj: &T, nuance: i64) -> [u8; 32] {
    sha256_parts(&[&canonical_bytes(obj), &nuance.to_le_bytes()])
}

/// Validate a proof against the subject object. Any scheme other than
/// `"sha256"` is an error, not an invalid proof.
pub fn validate_pow<T: Serialize>(pow: &ProofOfWork, obj: &T) -> Result<bool, GigmeshError> {
    if pow.scheme != SCHEME_SHA256 {
        return Err(GigmeshError::UnsupportedPowScheme(pow.scheme.clone()));
    }
    Ok(pow.target.is_met_by(&pow_digest(obj, pow.nuance)))
}

/// Brute-force search for a valid nuance, from 0 upward. Unbounded by
/// design; the caller's complexity choice bounds the expected cost.
pub fn compute_proof<T: Serialize>(
    scheme: &str,
    target: Target,
    obj: &T,
) -> Result<ProofOfWork, GigmeshError> {
    if scheme != SCHEME_SHA256 {
        return Err(GigmeshError::UnsupportedPowScheme(scheme.to_string()));
    }
    let body = canonical_bytes(obj);
    for nuance in 0i64.. {
        let digest = sha256_parts(&[&body, &nuance.to_le_bytes()]);
        if target.is_met_by(&digest) {
            return Ok(ProofOfWork { scheme: scheme.to_string(), target, nuance });
        }
    }
    unreachable!("nuance search exhausted i64 range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_sanity() {
        assert_eq!(Target::from_complexity(1), Target::MAX);
        // MAX / 2 == 2^255 - 1: top limb halves, the rest stay saturated.
        assert_eq!(
            Target::from_complexity(2),
            Target([u64::MAX, u64::MAX, u64::MAX, u64::MAX >> 1])
        );
        assert_eq!(Target::from_complexity(0), Target::ZERO);
    }

    #[test]
    fn computed_proof_always_validates() {
        let obj = ("broadcast", 42u64);
        // Complexity 1024 keeps the search fast in tests.
        let target = Target::from_complexity(1024);
        let pow = compute_proof(SCHEME_SHA256, target, &obj).unwrap();
        assert!(validate_pow(&pow, &obj).unwrap());
    }

    #[test]
    fn proof_does_not_transfer_to_other_objects() {
        let target = Target::from_complexity(1024);
        let pow = compute_proof(SCHEME_SHA256, target, &"original").unwrap();
        // Overwhelmingly likely to fail for a different subject.
        assert!(!validate_pow(&pow, &"forged").unwrap());
    }

    #[test]
    fn complexity_zero_validates_any_nuance() {
        let pow = ProofOfWork {
            scheme: SCHEME_SHA256.into(),
            target: Target::from_complexity(0),
            nuance: 0,
        };
        assert!(validate_pow(&pow, &"anything").unwrap());

        let pow = ProofOfWork { nuance: 987_654, ..pow };
        assert!(validate_pow(&pow, &"anything").unwrap());

        // And compute returns immediately with nuance 0.
        let solved = compute_proof(SCHEME_SHA256, Target::ZERO, &"anything").unwrap();
        assert_eq!(solved.nuance, 0);
    }

    #[test]
    fn unsupported_scheme_is_an_error() {
        let pow = ProofOfWork {
            scheme: "scrypt".into(),
            target: Target::MAX,
            nuance: 0,
        };
        assert!(matches!(
            validate_pow(&pow, &"x"),
            Err(GigmeshError::UnsupportedPowScheme(s)) if s == "scrypt"
        ));
        assert!(compute_proof("scrypt", Target::MAX, &"x").is_err());
    }

    #[test]
    fn target_comparison_orders_little_endian() {
        let target = Target([0, 0, 0, 1]); // 2^192
        let mut below = [0u8; 32];
        below[23] = 0xff; // < 2^192
        assert!(target.is_met_by(&below));

        let mut above = [0u8; 32];
        above[31] = 0x01; // 2^248
        assert!(!target.is_met_by(&above));

        let mut equal = [0u8; 32];
        equal[24] = 0x01; // exactly 2^192
        assert!(target.is_met_by(&equal));
    }
}
