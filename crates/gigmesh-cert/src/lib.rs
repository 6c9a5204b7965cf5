//! gigmesh-cert
//!
//! Property-bound, time-boxed signed credentials and the Certification
//! Authority that issues them. Verification is local and infallible
//! (returns `bool`); revocation is a separate accessor query because a
//! certificate cannot attest to its own revocation.

pub mod accessor;
pub mod authority;
pub mod certificate;

pub use accessor::CaAccessor;
pub use authority::CertificationAuthority;
pub use certificate::Certificate;
