//! gigmesh-settler
//!
//! The Settler: a Certification-Authority-backed settlement service for
//! anonymous gigs. It grants and revokes subject properties, issues
//! request/cancel/reply certificates, chains two hold-style escrow
//! invoices per gig, runs the gig lifecycle state machine off external
//! invoice-state events, and schedules dispute-deadline settlement.
//!
//! Construction wires the service once at startup; request handlers, the
//! invoice monitor and the deadline scheduler all share it by `Arc`.

pub mod auth;
pub mod config;
pub mod events;
pub mod monitor;
pub mod payment;
pub mod scheduler;
pub mod settler;

pub use auth::AuthToken;
pub use config::SettlerConfig;
pub use events::{EventHub, SettlerEvent};
pub use payment::{
    CrossSettlerApi, DecodedInvoice, EscrowInvoice, InvoiceState, InvoiceStateChange,
    PaymentServiceApi,
};
pub use scheduler::DeadlineScheduler;
pub use settler::{ReplyPayload, Settler, SettlementTrust};
