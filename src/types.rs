//! Core types for cross-chain relaying
//!
//! The dedup key `(chain_id, tx_hash, log_index)` is the only identity an
//! event ever has; it is stable across re-scans and independent of when the
//! event was observed.

use alloy::primitives::{keccak256, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two event kinds the bridge recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Asset locked on the source chain; relayed as `wrap` on the destination.
    Deposit,
    /// Representation burned on the destination chain; relayed as `withdraw`
    /// on the source.
    Unwrap,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Unwrap => "unwrap",
        }
    }

    /// Solidity event signature used for log filtering.
    ///
    /// Both events carry the same `(address, address, uint256)` shape; the
    /// event name alone distinguishes their topic hashes.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Deposit => "Deposit(address,address,uint256)",
            EventKind::Unwrap => "Unwrap(address,address,uint256)",
        }
    }

    /// topic0 for this event kind.
    pub fn topic(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EventKind::Deposit),
            "unwrap" => Some(EventKind::Unwrap),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Globally unique identity of an on-chain event; the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub chain_id: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain_id, self.tx_hash, self.log_index)
    }
}

/// Immutable record of an on-chain occurrence relevant to the bridge.
///
/// Created by the decoder, consumed once by the orchestrator; only the key
/// persists afterwards (inside its `RelayRecord`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    pub chain_id: u64,
    pub kind: EventKind,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

impl RelayEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            chain_id: self.chain_id,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}

/// Lifecycle status of a relay record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl RelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStatus::Pending => "pending",
            RelayStatus::Submitted => "submitted",
            RelayStatus::Confirmed => "confirmed",
            RelayStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RelayStatus::Pending),
            "submitted" => Some(RelayStatus::Submitted),
            "confirmed" => Some(RelayStatus::Confirmed),
            "failed" => Some(RelayStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable dedup/audit entry for one event key.
///
/// Carries the event payload so an interrupted relay can be re-driven after
/// a restart without re-scanning the origin chain.
#[derive(Debug, Clone)]
pub struct RelayRecord {
    pub key: EventKey,
    pub kind: EventKind,
    pub block_number: u64,
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub status: RelayStatus,
    pub outbound_tx_hash: Option<B256>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayRecord {
    /// Reconstruct the relay event this record was created from.
    pub fn event(&self) -> RelayEvent {
        RelayEvent {
            chain_id: self.key.chain_id,
            kind: self.kind,
            block_number: self.block_number,
            tx_hash: self.key.tx_hash,
            log_index: self.key.log_index,
            token: self.token,
            recipient: self.recipient,
            amount: self.amount,
        }
    }
}

/// Outbound contract call on the opposite chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    Wrap {
        token: Address,
        recipient: Address,
        amount: U256,
    },
    Withdraw {
        token: Address,
        recipient: Address,
        amount: U256,
    },
}

impl BridgeCall {
    /// Map a discovered event to the call that settles it: a `Deposit`
    /// mints on the destination, an `Unwrap` releases on the source.
    pub fn for_event(event: &RelayEvent) -> Self {
        match event.kind {
            EventKind::Deposit => BridgeCall::Wrap {
                token: event.token,
                recipient: event.recipient,
                amount: event.amount,
            },
            EventKind::Unwrap => BridgeCall::Withdraw {
                token: event.token,
                recipient: event.recipient,
                amount: event.amount,
            },
        }
    }

    pub fn function_name(&self) -> &'static str {
        match self {
            BridgeCall::Wrap { .. } => "wrap",
            BridgeCall::Withdraw { .. } => "withdraw",
        }
    }
}
