//! Drives one relay direction: watch, dedup, sequence, submit, record
//!
//! Per-event state machine: `Discovered → Admitted → Submitted → Confirmed`
//! on success, `Admitted → Failed` after the retry budget is spent. A
//! failure is always isolated to its event; the loop itself only stops on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use tokio::sync::mpsc;

use crate::error::{RelayError, SubmissionKind};
use crate::metrics;
use crate::nonce::NonceSequencer;
use crate::retry::RetryPolicy;
use crate::store::{Admission, RelayStore};
use crate::submitter::TransactionSubmitter;
use crate::types::{BridgeCall, EventKey, RelayEvent, RelayStatus};
use crate::watcher::ChainWatcher;

/// Terminal outcome of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Included on the destination chain.
    Confirmed(B256),
    /// Another caller (or an earlier run) already owns this key.
    Skipped,
    /// Broadcast but inclusion is still ambiguous; the record stays
    /// `Submitted` and startup recovery resolves it by chain lookup.
    Unresolved(B256),
    /// Retry budget exhausted; the record is `Failed` until an operator
    /// re-drives it.
    Failed(String),
}

/// One direction of the bridge (source→destination or the mirror).
pub struct RelayOrchestrator {
    label: String,
    watcher: ChainWatcher,
    submitter: TransactionSubmitter,
    sequencer: NonceSequencer,
    store: Arc<dyn RelayStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl RelayOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: impl Into<String>,
        watcher: ChainWatcher,
        submitter: TransactionSubmitter,
        sequencer: NonceSequencer,
        store: Arc<dyn RelayStore>,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            watcher,
            submitter,
            sequencer,
            store,
            retry,
            poll_interval,
        }
    }

    /// Chain the watched events originate on.
    fn origin_chain_id(&self) -> u64 {
        self.watcher.chain_id()
    }

    /// Reconcile local state with the chains after a (re)start.
    ///
    /// Submitted-but-unconfirmed relays are resolved by chain lookup,
    /// never by rebroadcast. Admitted-but-unsubmitted relays had no
    /// external side effect yet and are re-driven here because the dedup
    /// store will refuse to admit them a second time.
    pub async fn recover(&self) -> Result<(), RelayError> {
        let ledger = self.submitter.ledger();
        let chain_nonce = ledger.account_nonce(ledger.signer_address()).await?;
        self.sequencer.sync(chain_nonce).await;

        let submitted = self
            .store
            .records_with_status(self.origin_chain_id(), RelayStatus::Submitted)
            .await?;
        for record in submitted {
            let Some(tx_hash) = record.outbound_tx_hash else {
                tracing::warn!(
                    direction = %self.label,
                    key = %record.key,
                    "Submitted record has no outbound hash; leaving for operator follow-up"
                );
                continue;
            };
            match self.submitter.confirm(tx_hash).await {
                Ok(receipt) => {
                    self.store.record_confirmed(&record.key).await?;
                    metrics::record_confirmed(&self.label);
                    tracing::info!(
                        direction = %self.label,
                        key = %record.key,
                        tx_hash = %tx_hash,
                        block = receipt.block_number,
                        "Interrupted relay confirmed during recovery"
                    );
                }
                Err(RelayError::Submission {
                    kind: SubmissionKind::Reverted,
                    message,
                }) => {
                    self.store.record_failed(&record.key, &message).await?;
                    metrics::record_failed(&self.label);
                    tracing::error!(
                        direction = %self.label,
                        key = %record.key,
                        tx_hash = %tx_hash,
                        "Interrupted relay found reverted during recovery"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        direction = %self.label,
                        key = %record.key,
                        tx_hash = %tx_hash,
                        error = %e,
                        "Interrupted relay still unresolved; leaving submitted"
                    );
                }
            }
        }

        let pending = self
            .store
            .records_with_status(self.origin_chain_id(), RelayStatus::Pending)
            .await?;
        for record in pending {
            tracing::info!(
                direction = %self.label,
                key = %record.key,
                "Re-driving relay interrupted before broadcast"
            );
            self.drive_admitted(&record.event()).await;
        }

        Ok(())
    }

    /// Run one scan cycle: discover, relay each event, then advance the
    /// cursor. Returns the number of events discovered.
    pub async fn poll_once(&self) -> Result<usize, RelayError> {
        let batch = self.watcher.next_batch().await?;
        let discovered = batch.events.len();

        for event in &batch.events {
            if let Err(e) = self.relay_event(event).await {
                // Store-level failure; isolate and keep going.
                metrics::record_error(&self.label, e.class());
                tracing::error!(
                    direction = %self.label,
                    key = %event.key(),
                    error = %e,
                    "Relay attempt errored, continuing with next event"
                );
            }
        }

        // Every event above now has a relay record (or was skipped as a
        // duplicate), so the cursor may advance.
        if let Some(scanned_to) = batch.scanned_to {
            self.watcher.commit(scanned_to).await?;
        }

        Ok(discovered)
    }

    /// Relay a single discovered event end to end.
    pub async fn relay_event(&self, event: &RelayEvent) -> Result<RelayOutcome, RelayError> {
        match self.store.try_begin_relay(event).await? {
            Admission::AlreadyHandled => {
                metrics::record_skipped(&self.label);
                tracing::debug!(
                    direction = %self.label,
                    key = %event.key(),
                    "Event already handled, skipping"
                );
                Ok(RelayOutcome::Skipped)
            }
            Admission::Admitted => {
                metrics::record_admitted(&self.label);
                tracing::info!(
                    direction = %self.label,
                    key = %event.key(),
                    kind = %event.kind,
                    amount = %event.amount,
                    "Event admitted for relay"
                );
                Ok(self.drive_admitted(event).await)
            }
        }
    }

    /// Bounded-retry submission loop for an event this instance owns.
    async fn drive_admitted(&self, event: &RelayEvent) -> RelayOutcome {
        let key = event.key();
        let call = BridgeCall::for_event(event);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let lease = self.sequencer.reserve().await;

            match self.submitter.broadcast(&call, lease.nonce()).await {
                Ok(tx_hash) => {
                    // Durably mark Submitted before the nonce advances.
                    if let Err(e) = self.store.record_submitted(&key, tx_hash).await {
                        // The transaction is on the wire; the nonce must
                        // advance regardless, or the next relay conflicts.
                        tracing::error!(
                            direction = %self.label,
                            key = %key,
                            tx_hash = %tx_hash,
                            error = %e,
                            "Broadcast succeeded but store update failed"
                        );
                    }
                    lease.commit();

                    match self.submitter.confirm(tx_hash).await {
                        Ok(receipt) => {
                            if let Err(e) = self.store.record_confirmed(&key).await {
                                tracing::error!(
                                    direction = %self.label,
                                    key = %key,
                                    error = %e,
                                    "Relay confirmed but store update failed"
                                );
                            }
                            metrics::record_confirmed(&self.label);
                            tracing::info!(
                                direction = %self.label,
                                key = %key,
                                tx_hash = %tx_hash,
                                block = receipt.block_number,
                                attempts,
                                "Relay confirmed"
                            );
                            return RelayOutcome::Confirmed(tx_hash);
                        }
                        Err(RelayError::Submission {
                            kind: SubmissionKind::Reverted,
                            message,
                        }) => {
                            // Definitive rejection: the nonce is spent but
                            // the relay did not happen. Retry with a fresh
                            // reservation inside the budget.
                            metrics::record_error(&self.label, "reverted");
                            if self.retry.allows(attempts) {
                                let backoff = self.retry.backoff_for_attempt(attempts);
                                tracing::warn!(
                                    direction = %self.label,
                                    key = %key,
                                    tx_hash = %tx_hash,
                                    attempts,
                                    backoff_ms = backoff.as_millis() as u64,
                                    "Relay reverted on-chain, retrying"
                                );
                                tokio::time::sleep(backoff).await;
                                continue;
                            }
                            return self.fail(&key, &message).await;
                        }
                        Err(e) => {
                            // Timeout or transport trouble while waiting:
                            // the outcome is ambiguous, so never rebroadcast
                            // here. Recovery resolves it by chain lookup.
                            metrics::record_error(&self.label, e.class());
                            tracing::warn!(
                                direction = %self.label,
                                key = %key,
                                tx_hash = %tx_hash,
                                error = %e,
                                "Inclusion unresolved, leaving record submitted"
                            );
                            return RelayOutcome::Unresolved(tx_hash);
                        }
                    }
                }
                Err(e) => {
                    // Nothing was broadcast; the nonce goes back gap-free.
                    lease.release();

                    if let RelayError::Submission {
                        kind: SubmissionKind::NonceConflict,
                        ..
                    } = &e
                    {
                        self.resync_nonce().await;
                    }

                    if let Err(store_err) = self.store.record_attempt(&key, &e).await {
                        tracing::error!(
                            direction = %self.label,
                            key = %key,
                            error = %store_err,
                            "Failed to record attempt"
                        );
                    }
                    metrics::record_error(&self.label, e.class());

                    if e.is_retriable() && self.retry.allows(attempts) {
                        let backoff = self.retry.backoff_for_attempt(attempts);
                        tracing::warn!(
                            direction = %self.label,
                            key = %key,
                            attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Submission attempt failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return self.fail(&key, &e.to_string()).await;
                }
            }
        }
    }

    /// Record terminal failure and surface it without stopping the loop.
    async fn fail(&self, key: &EventKey, message: &str) -> RelayOutcome {
        if let Err(e) = self.store.record_failed(key, message).await {
            tracing::error!(
                direction = %self.label,
                key = %key,
                error = %e,
                "Failed to record terminal failure"
            );
        }
        metrics::record_failed(&self.label);
        tracing::error!(
            direction = %self.label,
            key = %key,
            error = %message,
            "Relay failed, operator re-drive required"
        );
        RelayOutcome::Failed(message.to_string())
    }

    /// Pull the authoritative account nonce after a conflict.
    async fn resync_nonce(&self) {
        let ledger = self.submitter.ledger();
        match ledger.account_nonce(ledger.signer_address()).await {
            Ok(chain_nonce) => self.sequencer.sync(chain_nonce).await,
            Err(e) => tracing::warn!(
                direction = %self.label,
                error = %e,
                "Could not refresh chain nonce after conflict"
            ),
        }
    }

    /// Run the direction loop until shutdown.
    ///
    /// A cycle in progress always runs to completion, so a relay that has
    /// reached `Submitted` finishes its confirmation wait before the loop
    /// observes the shutdown signal.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> Result<(), RelayError> {
        self.recover().await?;
        tracing::info!(
            direction = %self.label,
            origin_chain = self.origin_chain_id(),
            kind = %self.watcher.kind(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Relay direction started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(direction = %self.label, "Shutdown signal received, stopping direction loop");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.poll_once().await {
                        metrics::record_error(&self.label, e.class());
                        tracing::error!(
                            direction = %self.label,
                            error = %e,
                            "Scan cycle failed, will retry next poll"
                        );
                    }
                }
            }
        }
    }
}
