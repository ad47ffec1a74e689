//! Per-chain nonce sequencing for the warden account
//!
//! One lease at a time per (chain, signer): `reserve` suspends callers
//! until the previous lease is resolved, `commit` advances after a
//! broadcast, `release` hands the nonce back untouched so a failed
//! pre-broadcast attempt leaves no gap.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes outbound transactions for one (chain, signer) pair.
#[derive(Clone)]
pub struct NonceSequencer {
    next: Arc<Mutex<u64>>,
}

/// Exclusive hold on the next nonce. Dropping without `commit` behaves
/// like `release`: the nonce stays available and the sequencer unblocks.
pub struct NonceLease {
    guard: OwnedMutexGuard<u64>,
}

impl NonceSequencer {
    pub fn new(initial: u64) -> Self {
        Self {
            next: Arc::new(Mutex::new(initial)),
        }
    }

    /// Reconcile with the chain-reported transaction count. Local state
    /// only ever moves forward: `next = max(next, chain_reported)`.
    pub async fn sync(&self, chain_reported: u64) {
        let mut next = self.next.lock().await;
        if chain_reported > *next {
            tracing::info!(
                local = *next,
                chain_reported,
                "Advancing nonce to chain-reported transaction count"
            );
            *next = chain_reported;
        }
    }

    /// Reserve the next nonce. Suspends until any outstanding lease on
    /// this sequencer has been committed, released, or dropped.
    pub async fn reserve(&self) -> NonceLease {
        let guard = self.next.clone().lock_owned().await;
        NonceLease { guard }
    }

    /// Snapshot of the next nonce; for logs and diagnostics only.
    pub async fn peek(&self) -> u64 {
        *self.next.lock().await
    }
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        *self.guard
    }

    /// Mark the nonce as consumed by a broadcast submission.
    pub fn commit(mut self) {
        *self.guard += 1;
    }

    /// Return the nonce unused. Only valid when nothing was broadcast with
    /// it; the next lease will hand out the same value.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_advances_release_does_not() {
        tokio_test::block_on(async {
            let seq = NonceSequencer::new(7);

            let lease = seq.reserve().await;
            assert_eq!(lease.nonce(), 7);
            lease.commit();

            let lease = seq.reserve().await;
            assert_eq!(lease.nonce(), 8);
            lease.release();

            let lease = seq.reserve().await;
            assert_eq!(lease.nonce(), 8);
            lease.commit();

            assert_eq!(seq.peek().await, 9);
        });
    }

    #[test]
    fn test_sync_only_moves_forward() {
        tokio_test::block_on(async {
            let seq = NonceSequencer::new(5);
            seq.sync(3).await;
            assert_eq!(seq.peek().await, 5);
            seq.sync(12).await;
            assert_eq!(seq.peek().await, 12);
        });
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_contiguous() {
        let seq = NonceSequencer::new(0);
        let mut handles = Vec::new();

        for _ in 0..10 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move {
                let lease = seq.reserve().await;
                let nonce = lease.nonce();
                lease.commit();
                nonce
            }));
        }

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_dropped_lease_unblocks_next_caller() {
        let seq = NonceSequencer::new(0);
        {
            let _lease = seq.reserve().await;
            // dropped here without commit
        }
        let lease = seq.reserve().await;
        assert_eq!(lease.nonce(), 0);
        lease.commit();
    }
}
