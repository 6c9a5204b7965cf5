//! Broadcast admission and reply routing, end to end: a certified request
//! travels requester → relay → relay → replier with a proof-of-work at
//! the gate and an onion grown at every forward; the reply retraces the
//! path without any relay learning the endpoints.
//!
//! Run with:
//!   cargo test -p gigmesh-settler --test broadcast_path

mod common;

use common::{issue_request, now, testbed};
use gigmesh_cert::CaAccessor;
use gigmesh_crypto::KeyPair;
use gigmesh_onion::OnionRoute;
use gigmesh_pow::{compute_proof, validate_pow, Target, SCHEME_SHA256};

#[tokio::test]
async fn certified_broadcast_passes_gate_and_reply_retraces_onion() {
    let bed = testbed("broadcast_path", |_| {});
    let request = issue_request(&bed);
    let t = now();

    let relay1 = KeyPair::generate();
    let relay2 = KeyPair::generate();
    let replier = &bed.replier;

    // The requester attaches a PoW over the signed request before
    // broadcasting; complexity is kept tiny for the test.
    let target = Target::from_complexity(512);
    let pow = compute_proof(SCHEME_SHA256, target, &request).unwrap();

    // Every receiving relay gates on the PoW and the certificate before
    // forwarding, resolving the CA through its accessor.
    for _hop in 0..3 {
        assert!(validate_pow(&pow, &request).unwrap());
        assert!(request.verify_with(&*bed.settler, t).await);
        assert!(!bed
            .settler
            .is_revoked(&request.authority_uri, request.id)
            .await
            .unwrap());
    }

    // A flooded copy with a forged nuance is dropped at the first gate.
    let mut forged = pow.clone();
    forged.nuance += 1;
    assert!(!validate_pow(&forged, &request).unwrap());

    // Forwarding grows the onion one layer per hop: requester → relay1 →
    // relay2 → replier.
    let to_relay1 = OnionRoute::empty()
        .grow(bed.requester.public_key, &relay1.public_key)
        .unwrap();
    let to_relay2 = to_relay1.grow(relay1.public_key, &relay2.public_key).unwrap();
    let to_replier = to_relay2.grow(relay2.public_key, &replier.public_key).unwrap();

    // The reply peels backward, each hop learning only its predecessor.
    let (hop, route) = to_replier.peel(replier).unwrap();
    assert_eq!(hop, relay2.public_key);
    let (hop, route) = route.peel(&relay2).unwrap();
    assert_eq!(hop, relay1.public_key);
    let (hop, route) = route.peel(&relay1).unwrap();
    assert_eq!(hop, bed.requester.public_key);
    assert!(route.is_empty(), "reply has reached its origin");

    // A curious relay cannot peel a layer that is not addressed to it.
    assert!(to_replier.peel(&relay1).is_err());
}
