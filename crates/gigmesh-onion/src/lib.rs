//! gigmesh-onion
//!
//! Layered asymmetric envelope for anonymous backward routing. Each relay
//! that forwards a broadcast grows the onion by one layer encrypted to the
//! next hop on the reply path; a reply peels one layer per hop until the
//! onion is empty at the origin. Intermediate relays learn only the single
//! hop encrypted to them.

use gigmesh_core::types::PublicKey;
use gigmesh_crypto::ecies::{asymmetric_decrypt, asymmetric_encrypt};
use gigmesh_crypto::{CryptoError, KeyPair};
use serde::{Deserialize, Serialize};

/// An onion route: zero or more nested encrypted layers as an opaque blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OnionRoute(Vec<u8>);

/// One decrypted layer: the hop to forward to, and what remains beneath.
#[derive(Serialize, Deserialize)]
struct OnionLayer {
    next_hop: PublicKey,
    rest: Vec<u8>,
}

impl OnionRoute {
    /// A route with no hops: the message is at its origin.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True iff no layers remain.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a layer: encrypt `{next_hop, current}` under `encrypt_under` so
    /// only that key's holder can peel it.
    pub fn grow(
        &self,
        next_hop: PublicKey,
        encrypt_under: &PublicKey,
    ) -> Result<OnionRoute, CryptoError> {
        let layer = OnionLayer { next_hop, rest: self.0.clone() };
        let plaintext = bincode::serialize(&layer).map_err(|_| CryptoError::Encrypt)?;
        Ok(OnionRoute(asymmetric_encrypt(encrypt_under, None, &plaintext)?))
    }

    /// Remove the outer layer with `my_keypair`. Fails closed when the key
    /// does not match the outermost layer's intended recipient; a success
    /// strictly shrinks the remaining onion.
    pub fn peel(&self, my_keypair: &KeyPair) -> Result<(PublicKey, OnionRoute), CryptoError> {
        let plaintext = asymmetric_decrypt(my_keypair, None, &self.0)?;
        let layer: OnionLayer =
            bincode::deserialize(&plaintext).map_err(|_| CryptoError::Decrypt)?;
        Ok((layer.next_hop, OnionRoute(layer.rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_peel_inverse_over_many_hops() {
        // Relays r1..r4 each wrap the route under their own key; peeling in
        // reverse order must reveal the same hop sequence and end empty.
        let relays: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let hops: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();

        let mut route = OnionRoute::empty();
        for (relay, hop) in relays.iter().zip(&hops) {
            route = route.grow(hop.public_key, &relay.public_key).unwrap();
        }

        for (relay, hop) in relays.iter().zip(&hops).rev() {
            assert!(!route.is_empty());
            let (revealed, shrunk) = route.peel(relay).unwrap();
            assert_eq!(revealed, hop.public_key);
            assert!(shrunk.as_bytes().len() < route.as_bytes().len());
            route = shrunk;
        }
        assert!(route.is_empty());
    }

    #[test]
    fn wrong_key_at_any_hop_fails() {
        let relay = KeyPair::generate();
        let intruder = KeyPair::generate();
        let hop = KeyPair::generate();

        let route = OnionRoute::empty().grow(hop.public_key, &relay.public_key).unwrap();
        assert!(route.peel(&intruder).is_err());
        // The right key still works afterwards.
        assert!(route.peel(&relay).is_ok());
    }

    #[test]
    fn empty_route_has_no_hops() {
        let route = OnionRoute::empty();
        assert!(route.is_empty());
        assert!(route.peel(&KeyPair::generate()).is_err());
    }
}
