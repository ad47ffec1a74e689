//! Per-chain, per-event-kind scan loop
//!
//! The watcher re-scans `reorg_margin` blocks of recent history on every
//! cycle, so discovery is at-least-once by construction; the dedup store
//! downstream is what makes relaying effectively-once.

use std::sync::Arc;

use crate::client::LedgerClient;
use crate::decoder::decode_log;
use crate::error::RelayError;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::store::RelayStore;
use crate::types::{EventKind, RelayEvent};

/// Result of one scan cycle.
#[derive(Debug)]
pub struct ScanBatch {
    /// Decoded events in discovery order.
    pub events: Vec<RelayEvent>,
    /// Highest block fully scanned this cycle; `None` when the cycle was a
    /// no-op or failed before completing any sub-range.
    pub scanned_to: Option<u64>,
}

/// Computes safe scan ranges and yields decoded events for one event kind
/// on one chain.
pub struct ChainWatcher {
    client: Arc<dyn LedgerClient>,
    store: Arc<dyn RelayStore>,
    kind: EventKind,
    chain_name: String,
    reorg_margin: u64,
    max_blocks_per_query: u64,
    retry: RetryPolicy,
}

impl ChainWatcher {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        store: Arc<dyn RelayStore>,
        kind: EventKind,
        chain_name: impl Into<String>,
        reorg_margin: u64,
        max_blocks_per_query: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            store,
            kind,
            chain_name: chain_name.into(),
            reorg_margin,
            max_blocks_per_query,
            retry,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.client.chain_id()
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Scan the next safe range and decode its events.
    ///
    /// Sub-ranges are fetched in block order; a sub-range that exhausts its
    /// retries ends the cycle early so the cursor never advances past it
    /// and the next cycle picks up exactly there.
    pub async fn next_batch(&self) -> Result<ScanBatch, RelayError> {
        let last_scanned = self
            .store
            .get_cursor(self.client.chain_id(), self.kind)
            .await?;
        let head = self.client.head_height().await?;

        let Some((from, to)) = scan_range(last_scanned, head, self.reorg_margin) else {
            tracing::debug!(
                chain = %self.chain_name,
                kind = %self.kind,
                head,
                "No new blocks to scan"
            );
            return Ok(ScanBatch {
                events: Vec::new(),
                scanned_to: None,
            });
        };

        tracing::debug!(
            chain = %self.chain_name,
            kind = %self.kind,
            from,
            to,
            "Scanning block range"
        );

        let mut events = Vec::new();
        let mut scanned_to = None;

        for (sub_from, sub_to) in plan_sub_ranges(from, to, self.max_blocks_per_query) {
            match self.fetch_sub_range(sub_from, sub_to).await {
                Ok(logs) => {
                    for log in &logs {
                        match decode_log(self.client.chain_id(), self.kind, log) {
                            Ok(event) => {
                                tracing::info!(
                                    chain = %self.chain_name,
                                    kind = %self.kind,
                                    key = %event.key(),
                                    block = event.block_number,
                                    amount = %event.amount,
                                    "Event discovered"
                                );
                                events.push(event);
                            }
                            Err(e) => {
                                // One bad log never blocks the batch.
                                metrics::record_error(&self.chain_name, e.class());
                                tracing::warn!(
                                    chain = %self.chain_name,
                                    kind = %self.kind,
                                    tx_hash = ?log.tx_hash,
                                    log_index = ?log.log_index,
                                    error = %e,
                                    "Skipping undecodable log"
                                );
                            }
                        }
                    }
                    scanned_to = Some(sub_to);
                }
                Err(e) => {
                    metrics::record_error(&self.chain_name, e.class());
                    tracing::warn!(
                        chain = %self.chain_name,
                        kind = %self.kind,
                        sub_from,
                        sub_to,
                        error = %e,
                        "Sub-range fetch failed, ending scan cycle early"
                    );
                    break;
                }
            }
        }

        metrics::record_discovered(&self.chain_name, self.kind.as_str(), events.len());
        Ok(ScanBatch { events, scanned_to })
    }

    /// Advance the durable cursor. Only called once every event in the
    /// scanned range has a relay record.
    pub async fn commit(&self, scanned_to: u64) -> Result<(), RelayError> {
        self.store
            .set_cursor(self.client.chain_id(), self.kind, scanned_to)
            .await?;
        metrics::set_cursor(&self.chain_name, self.kind.as_str(), scanned_to);
        Ok(())
    }

    /// Fetch one sub-range with bounded retry on transient failures.
    async fn fetch_sub_range(&self, from: u64, to: u64) -> Result<Vec<crate::client::RawLog>, RelayError> {
        let mut attempts = 0u32;
        loop {
            match self.client.fetch_logs(self.kind, from, to).await {
                Ok(logs) => return Ok(logs),
                Err(e) if e.is_transient() && self.retry.allows(attempts + 1) => {
                    attempts += 1;
                    let backoff = self.retry.backoff_for_attempt(attempts);
                    tracing::debug!(
                        chain = %self.chain_name,
                        from,
                        to,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying sub-range fetch"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Select the next inclusive scan range: `[max(0, last + 1 − margin), head]`
/// once a cursor exists, `[head − margin, head]` on a cold start.
/// `None` means there is nothing new to scan.
pub fn scan_range(last_scanned: Option<u64>, head: u64, reorg_margin: u64) -> Option<(u64, u64)> {
    let from = match last_scanned {
        Some(last) => (last + 1).saturating_sub(reorg_margin),
        None => head.saturating_sub(reorg_margin),
    };
    if head < from {
        return None;
    }
    Some((from, head))
}

/// Split the inclusive range `[from, to]` into chunks of at most
/// `max_blocks` blocks each.
pub fn plan_sub_ranges(from: u64, to: u64, max_blocks: u64) -> Vec<(u64, u64)> {
    let max_blocks = max_blocks.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = to.min(start + max_blocks - 1);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}
