use thiserror::Error;

/// The one error taxonomy surfaced by the produced API.
///
/// Every variant carries a stable numeric code (`code()`) so transport
/// layers can map errors without string matching. Signature and
/// certificate verification never produce these; they return `false`.
#[derive(Debug, Error)]
pub enum GigmeshError {
    // ── Caller errors ────────────────────────────────────────────────────────
    #[error("invalid auth token")]
    InvalidAuthToken,

    #[error("property not granted: {0}")]
    PropertyNotGranted(String),

    #[error("unknown certificate: {0}")]
    UnknownCertificate(String),

    #[error("unknown preimage for payment hash: {0}")]
    UnknownPreimage(String),

    #[error("access denied")]
    AccessDenied,

    #[error("gig not found: {0}")]
    GigNotFound(String),

    #[error("gig is {found}; operation requires {required}")]
    InvalidGigState { required: String, found: String },

    #[error("unsupported proof-of-work scheme: {0}")]
    UnsupportedPowScheme(String),

    #[error("could not generate a unique access code after {attempts} attempts")]
    AccessCodeCollision { attempts: u32 },

    // ── Local faults ─────────────────────────────────────────────────────────
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── External service failures (fatal for the single request) ────────────
    #[error("payment service error: {0}")]
    Payment(String),

    #[error("cross-settler error: {0}")]
    CrossSettler(String),

    // ── Internal consistency faults ──────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl GigmeshError {
    /// Stable numeric code for transport layers.
    pub fn code(&self) -> u16 {
        match self {
            GigmeshError::InvalidAuthToken => 1001,
            GigmeshError::PropertyNotGranted(_) => 1002,
            GigmeshError::UnknownCertificate(_) => 1003,
            GigmeshError::UnknownPreimage(_) => 1004,
            GigmeshError::AccessDenied => 1005,
            GigmeshError::GigNotFound(_) => 1006,
            GigmeshError::InvalidGigState { .. } => 1007,
            GigmeshError::UnsupportedPowScheme(_) => 1008,
            GigmeshError::AccessCodeCollision { .. } => 1009,
            GigmeshError::Crypto(_) => 2001,
            GigmeshError::Serialization(_) => 2002,
            GigmeshError::Storage(_) => 2003,
            GigmeshError::Payment(_) => 3001,
            GigmeshError::CrossSettler(_) => 3002,
            GigmeshError::Internal(_) => 5000,
        }
    }
}
