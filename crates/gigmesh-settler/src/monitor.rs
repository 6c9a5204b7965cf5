//! Invoice-state monitor.
//!
//! One persistent subscription loop per payment stream. On transport
//! failure it reconnects with exponential backoff; every (re)connect is
//! followed by a full reconciliation sweep over Open/Accepted gigs,
//! because notifications buffered while disconnected are gone. A periodic
//! sweep also runs so a lost notification or missed deadline job can
//! never wedge a gig.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::settler::Settler;

pub(crate) async fn run(settler: Arc<Settler>, mut shutdown: watch::Receiver<bool>) {
    let initial_backoff = settler.config().monitor_backoff_secs.max(1);
    let max_backoff = settler.config().monitor_backoff_max_secs.max(initial_backoff);
    let reconcile_secs = settler.config().reconcile_interval_secs.max(1);
    let mut backoff = initial_backoff;

    'outer: loop {
        if *shutdown.borrow() {
            break;
        }

        let mut stream = match settler.payments().subscribe_invoice_updates().await {
            Ok(rx) => {
                backoff = initial_backoff;
                rx
            }
            Err(e) => {
                warn!(error = %e, backoff, "invoice stream connect failed");
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break 'outer;
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        debug!("invoice stream connected");
        sweep(&settler).await;

        let mut reconcile = tokio::time::interval(Duration::from_secs(reconcile_secs));
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reconcile.tick().await; // the immediate tick; the sweep above covered it

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break 'outer;
                    }
                }
                _ = reconcile.tick() => sweep(&settler).await,
                change = stream.recv() => match change {
                    Some(change) => {
                        let now = chrono::Utc::now().timestamp();
                        if let Err(e) = settler
                            .on_invoice_state(change.payment_hash, change.state, now)
                            .await
                        {
                            warn!(
                                hash = %change.payment_hash,
                                error = %e,
                                "invoice state handling failed"
                            );
                        }
                    }
                    None => {
                        warn!("invoice stream dropped; reconnecting");
                        continue 'outer;
                    }
                },
            }
        }
    }
    debug!("invoice monitor stopped");
}

async fn sweep(settler: &Settler) {
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = settler.reconcile_sweep(now).await {
        warn!(error = %e, "reconciliation sweep failed");
    }
}
