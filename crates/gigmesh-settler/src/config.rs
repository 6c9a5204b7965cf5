use gigmesh_core::constants::{
    ACCESS_CODE_RETRY_MAX, DEFAULT_AUTH_TOKEN_WINDOW_SECS, DEFAULT_DISPUTE_TIMEOUT_SECS,
    DEFAULT_EVENT_CAPACITY, DEFAULT_INVOICE_EXPIRY_SECS, DEFAULT_MONITOR_BACKOFF_MAX_SECS,
    DEFAULT_MONITOR_BACKOFF_SECS, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_SETTLEMENT_FEE_SAT,
};
use gigmesh_core::types::{PublicKey, Sats};

/// Runtime configuration of one Settler instance.
#[derive(Clone, Debug)]
pub struct SettlerConfig {
    /// Public URI of this Settler; becomes the authority URI of every
    /// certificate it issues.
    pub uri: String,
    /// Seconds after both escrow legs accept during which a dispute may be
    /// opened.
    pub dispute_timeout_secs: i64,
    /// Flat network fee (sats) charged per gig.
    pub settlement_fee_sat: Sats,
    /// Expiry passed to the payment service for opened escrow invoices.
    pub invoice_expiry_secs: u64,
    /// Accepted clock skew on signed auth tokens.
    pub auth_token_window_secs: i64,
    /// Retry limit for random access-code generation collisions.
    pub access_code_retry_max: u32,
    /// Invoice-stream reconnect backoff: initial and ceiling.
    pub monitor_backoff_secs: u64,
    pub monitor_backoff_max_secs: u64,
    /// Cadence of the periodic Open/Accepted reconciliation sweep.
    pub reconcile_interval_secs: u64,
    /// Event broadcast ring capacity.
    pub event_capacity: usize,
    /// Keys allowed to grant/revoke properties and manage access codes.
    pub admin_keys: Vec<PublicKey>,
}

impl SettlerConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            dispute_timeout_secs: DEFAULT_DISPUTE_TIMEOUT_SECS,
            settlement_fee_sat: DEFAULT_SETTLEMENT_FEE_SAT,
            invoice_expiry_secs: DEFAULT_INVOICE_EXPIRY_SECS,
            auth_token_window_secs: DEFAULT_AUTH_TOKEN_WINDOW_SECS,
            access_code_retry_max: ACCESS_CODE_RETRY_MAX,
            monitor_backoff_secs: DEFAULT_MONITOR_BACKOFF_SECS,
            monitor_backoff_max_secs: DEFAULT_MONITOR_BACKOFF_MAX_SECS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            admin_keys: Vec::new(),
        }
    }

    pub fn with_admin(mut self, key: PublicKey) -> Self {
        self.admin_keys.push(key);
        self
    }

    pub fn is_admin(&self, key: &PublicKey) -> bool {
        self.admin_keys.contains(key)
    }
}
