//! Caller authentication for the produced API surface.
//!
//! A token is the caller's public key and a fresh timestamp, signed with
//! the caller's key. The Settler accepts it within a configured skew
//! window; everything else is `InvalidAuthToken`.

use gigmesh_core::types::{PublicKey, SchnorrSignature, Timestamp};
use gigmesh_core::GigmeshError;
use gigmesh_crypto::sign::{sign_object, verify_object};
use gigmesh_crypto::KeyPair;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthToken {
    pub public_key: PublicKey,
    pub timestamp: Timestamp,
    pub signature: SchnorrSignature,
}

impl AuthToken {
    pub fn issue(keypair: &KeyPair, now: Timestamp) -> Self {
        let mut token = AuthToken {
            public_key: keypair.public_key,
            timestamp: now,
            signature: SchnorrSignature::empty(),
        };
        token.signature = sign_object(&token.signable(), keypair);
        token
    }

    fn signable(&self) -> AuthToken {
        AuthToken {
            public_key: self.public_key,
            timestamp: self.timestamp,
            signature: SchnorrSignature::empty(),
        }
    }

    /// Check signature and freshness; returns the authenticated caller key.
    pub fn validate(&self, now: Timestamp, window_secs: i64) -> Result<PublicKey, GigmeshError> {
        if (now - self.timestamp).abs() > window_secs {
            return Err(GigmeshError::InvalidAuthToken);
        }
        if !verify_object(&self.signable(), &self.signature, &self.public_key) {
            return Err(GigmeshError::InvalidAuthToken);
        }
        Ok(self.public_key)
    }
}
