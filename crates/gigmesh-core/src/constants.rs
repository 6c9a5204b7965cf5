//! ─── GigMesh Protocol Constants ─────────────────────────────────────────────
//!
//! Defaults for the Settler service. All of these are overridable via
//! `SettlerConfig`; the values here are what a fresh deployment gets.

use crate::types::Timestamp;

// ── Settlement ───────────────────────────────────────────────────────────────

/// Flat fee (sats) charged by the Settler per gig, collected through the
/// network escrow invoice leg.
pub const DEFAULT_SETTLEMENT_FEE_SAT: u64 = 1_000;

/// Window (seconds) after both escrow legs are accepted during which the
/// requester may open a dispute. Settlement fires when it elapses.
pub const DEFAULT_DISPUTE_TIMEOUT_SECS: i64 = 3_600;

/// Expiry passed to the payment service when opening escrow invoices.
pub const DEFAULT_INVOICE_EXPIRY_SECS: u64 = 86_400;

/// Sentinel dispute deadline for gigs that have not been accepted yet.
pub const NO_DEADLINE: Timestamp = i64::MAX;

// ── Caller authentication ────────────────────────────────────────────────────

/// Maximum clock skew (seconds, either direction) tolerated on a signed
/// auth-token timestamp.
pub const DEFAULT_AUTH_TOKEN_WINDOW_SECS: i64 = 300;

// ── Access codes ─────────────────────────────────────────────────────────────

/// Random alphanumeric length of issued access codes.
pub const ACCESS_CODE_LENGTH: usize = 16;

/// How many collisions `issue_access_code` tolerates before giving up.
pub const ACCESS_CODE_RETRY_MAX: u32 = 10;

// ── Invoice monitor ──────────────────────────────────────────────────────────

/// Initial reconnect backoff (seconds) after the payment stream drops.
pub const DEFAULT_MONITOR_BACKOFF_SECS: u64 = 1;

/// Reconnect backoff ceiling (seconds).
pub const DEFAULT_MONITOR_BACKOFF_MAX_SECS: u64 = 60;

/// Cadence (seconds) of the periodic reconciliation sweep over
/// Open/Accepted gigs. Covers notifications lost between reconnects and
/// deadline jobs that never fired.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

// ── Events ───────────────────────────────────────────────────────────────────

/// Ring capacity of the per-hub broadcast channel. A subscriber that lags
/// more than this many events loses the oldest ones.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
