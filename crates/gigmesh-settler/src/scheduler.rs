//! Dispute-deadline scheduler.
//!
//! A single coordinator task owns a deadline-indexed min-heap with one
//! live job per gig key. Schedule and cancel are O(log n) by key:
//! rescheduling bumps a per-key generation counter so stale heap entries
//! are skipped when popped. Due keys are delivered on an mpsc channel and
//! executed by the Settler's deadline loop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use gigmesh_core::records::GigKey;
use gigmesh_core::types::Timestamp;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

enum Cmd {
    Schedule { key: GigKey, at: Timestamp },
    Cancel { key: GigKey },
}

struct Entry {
    at: Timestamp,
    seq: u64,
    key: GigKey,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so BinaryHeap pops the earliest deadline first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then(other.seq.cmp(&self.seq))
    }
}

/// Handle to the coordinator task.
#[derive(Clone)]
pub struct DeadlineScheduler {
    cmd_tx: mpsc::Sender<Cmd>,
}

impl DeadlineScheduler {
    /// Spawn the coordinator. Keys whose deadline has passed arrive on the
    /// returned receiver; deadlines already in the past fire immediately.
    pub fn spawn(shutdown: watch::Receiver<bool>) -> (Self, mpsc::Receiver<GigKey>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (due_tx, due_rx) = mpsc::channel(64);
        tokio::spawn(coordinator(cmd_rx, due_tx, shutdown));
        (Self { cmd_tx }, due_rx)
    }

    /// Schedule (or reschedule) the job for `key` at `at`.
    pub async fn schedule(&self, key: GigKey, at: Timestamp) {
        let _ = self.cmd_tx.send(Cmd::Schedule { key, at }).await;
    }

    /// Drop any pending job for `key`.
    pub async fn cancel(&self, key: GigKey) {
        let _ = self.cmd_tx.send(Cmd::Cancel { key }).await;
    }
}

/// Sleep horizon while the heap is empty; commands interrupt it anyway.
const IDLE_SECS: u64 = 3_600;

async fn coordinator(
    mut cmd_rx: mpsc::Receiver<Cmd>,
    due_tx: mpsc::Sender<GigKey>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
    let mut live: HashMap<GigKey, u64> = HashMap::new();
    let mut seq = 0u64;

    loop {
        // Discard entries superseded by a reschedule or cancel.
        while matches!(heap.peek(), Some(e) if live.get(&e.key) != Some(&e.seq)) {
            heap.pop();
        }

        let wake = match heap.peek() {
            Some(e) => {
                let now = chrono::Utc::now().timestamp();
                Instant::now() + Duration::from_secs((e.at - now).max(0) as u64)
            }
            None => Instant::now() + Duration::from_secs(IDLE_SECS),
        };

        tokio::select! {
            res = shutdown.changed() => {
                // A dropped sender counts as shutdown.
                if res.is_err() || *shutdown.borrow() {
                    debug!("deadline scheduler shutting down");
                    break;
                }
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(Cmd::Schedule { key, at }) => {
                    seq += 1;
                    live.insert(key, seq);
                    heap.push(Entry { at, seq, key });
                    debug!(gig = %key, at, "deadline scheduled");
                }
                Some(Cmd::Cancel { key }) => {
                    live.remove(&key);
                    debug!(gig = %key, "deadline cancelled");
                }
                None => break,
            },

            _ = sleep_until(wake) => {
                let now = chrono::Utc::now().timestamp();
                loop {
                    let fire = match heap.peek() {
                        Some(e) if live.get(&e.key) != Some(&e.seq) => false, // stale
                        Some(e) if e.at <= now => true,
                        _ => break,
                    };
                    let entry = heap.pop().expect("peeked entry exists");
                    if fire {
                        live.remove(&entry.key);
                        if due_tx.send(entry.key).await.is_err() {
                            return; // consumer gone
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigmesh_core::types::CertificateId;
    use tokio::time::timeout;

    fn key(n: u8) -> GigKey {
        GigKey::new(CertificateId([n; 16]), CertificateId([n; 16]))
    }

    fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn past_deadline_fires_immediately() {
        let (_tx, rx) = shutdown_pair();
        let (sched, mut due) = DeadlineScheduler::spawn(rx);

        let now = chrono::Utc::now().timestamp();
        sched.schedule(key(1), now - 10).await;

        let fired = timeout(Duration::from_secs(2), due.recv()).await.unwrap().unwrap();
        assert_eq!(fired, key(1));
    }

    #[tokio::test]
    async fn cancelled_job_does_not_fire() {
        let (_tx, rx) = shutdown_pair();
        let (sched, mut due) = DeadlineScheduler::spawn(rx);

        let now = chrono::Utc::now().timestamp();
        sched.schedule(key(2), now + 1).await;
        sched.cancel(key(2)).await;

        assert!(timeout(Duration::from_millis(1_800), due.recv()).await.is_err());
    }

    #[tokio::test]
    async fn reschedule_replaces_earlier_deadline() {
        let (_tx, rx) = shutdown_pair();
        let (sched, mut due) = DeadlineScheduler::spawn(rx);

        let now = chrono::Utc::now().timestamp();
        // First far in the future, then brought forward: the second wins
        // and only one fire is delivered.
        sched.schedule(key(3), now + 3_000).await;
        sched.schedule(key(3), now - 1).await;

        let fired = timeout(Duration::from_secs(2), due.recv()).await.unwrap().unwrap();
        assert_eq!(fired, key(3));
        assert!(timeout(Duration::from_millis(500), due.recv()).await.is_err());
    }

    #[tokio::test]
    async fn ordering_is_by_deadline() {
        let (_tx, rx) = shutdown_pair();
        let (sched, mut due) = DeadlineScheduler::spawn(rx);

        // Scheduled out of order with future deadlines so both commands
        // land before either fires.
        let now = chrono::Utc::now().timestamp();
        sched.schedule(key(5), now + 2).await;
        sched.schedule(key(4), now + 1).await;

        let first = timeout(Duration::from_secs(4), due.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(4), due.recv()).await.unwrap().unwrap();
        assert_eq!(first, key(4));
        assert_eq!(second, key(5));
    }
}
