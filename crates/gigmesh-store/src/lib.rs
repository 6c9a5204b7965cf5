//! gigmesh-store
//!
//! Persistent record store backed by sled (pure-Rust, no C dependencies).
//! One named tree per record kind; values are bincode. Cross-request
//! invariants (one gig row per key pair, at-most-once preimage reveal,
//! single-use access codes) are enforced with sled's atomic
//! read-modify-write primitives; no process-wide lock.

pub mod db;

pub use db::{GigTransition, StoreDb};
