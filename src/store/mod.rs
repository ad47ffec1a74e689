//! Durable relay state: dedup records and scan cursors
//!
//! `try_begin_relay` is the mechanism that turns at-least-once discovery
//! into effectively-once relaying: exactly one caller per event key is
//! admitted, everyone else (including another process instance after a
//! failover) sees `AlreadyHandled`.

use async_trait::async_trait;
use alloy::primitives::B256;

use crate::error::RelayError;
use crate::types::{EventKey, EventKind, RelayEvent, RelayRecord, RelayStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of `try_begin_relay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// This caller owns the relay attempt; a `Pending` record now exists.
    Admitted,
    /// A record for this key already exists; skip.
    AlreadyHandled,
}

/// Storage contract for relay records and scan cursors.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Atomically create a `Pending` record for `event`, or report the key
    /// as already handled. At most one concurrent caller is ever admitted
    /// for a given key.
    async fn try_begin_relay(&self, event: &RelayEvent) -> Result<Admission, RelayError>;

    /// Record a failed submission attempt: bumps the attempt counter and
    /// stores the error without changing the status.
    async fn record_attempt(&self, key: &EventKey, error: &RelayError) -> Result<(), RelayError>;

    /// Transition to `Submitted` with the outbound transaction hash; also
    /// counts as one attempt.
    async fn record_submitted(
        &self,
        key: &EventKey,
        outbound_tx_hash: B256,
    ) -> Result<(), RelayError>;

    /// Transition to `Confirmed` (terminal success).
    async fn record_confirmed(&self, key: &EventKey) -> Result<(), RelayError>;

    /// Transition to `Failed` (terminal failure, operator re-drive only).
    async fn record_failed(&self, key: &EventKey, error: &str) -> Result<(), RelayError>;

    async fn get_record(&self, key: &EventKey) -> Result<Option<RelayRecord>, RelayError>;

    /// Records originating on `chain_id` currently in `status`, oldest
    /// first. Used by startup recovery.
    async fn records_with_status(
        &self,
        chain_id: u64,
        status: RelayStatus,
    ) -> Result<Vec<RelayRecord>, RelayError>;

    /// Last fully scanned block for (chain, event kind), if any.
    async fn get_cursor(&self, chain_id: u64, kind: EventKind) -> Result<Option<u64>, RelayError>;

    /// Advance the scan cursor. Callers only invoke this once every event
    /// in the scanned range has a relay record.
    async fn set_cursor(&self, chain_id: u64, kind: EventKind, block: u64)
        -> Result<(), RelayError>;
}
