//! The `LedgerClient` capability: the engine's only view of a chain
//!
//! Everything chain-specific (transport, signing, ABI encoding) lives
//! behind this trait so the relay engine itself never touches an RPC
//! endpoint directly and tests can script a ledger end to end.

use async_trait::async_trait;
use alloy::primitives::{Address, B256};
use std::time::Duration;

use crate::error::RelayError;
use crate::types::{BridgeCall, EventKind};

/// Raw log entry as returned by a ledger's log query.
#[derive(Debug, Clone, Default)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

/// A fully parameterized outbound transaction, ready to sign and broadcast.
#[derive(Debug, Clone)]
pub struct PreparedTx {
    pub call: BridgeCall,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

/// Inclusion receipt for a submitted transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// False when the transaction was included but reverted.
    pub success: bool,
}

/// Read and write operations the engine needs from one ledger.
///
/// Implementations own their transport and signer; `submit` signs the
/// prepared transaction with the warden key and broadcasts it exactly once.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Numeric chain id of this ledger.
    fn chain_id(&self) -> u64;

    /// Address the warden signs with on this ledger.
    fn signer_address(&self) -> Address;

    /// Current head block height.
    async fn head_height(&self) -> Result<u64, RelayError>;

    /// Logs matching `kind`'s signature in the inclusive range
    /// `[from_block, to_block]`.
    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RelayError>;

    /// Chain-reported transaction count for `account`.
    async fn account_nonce(&self, account: Address) -> Result<u64, RelayError>;

    /// Node-suggested gas price.
    async fn suggested_gas_price(&self) -> Result<u128, RelayError>;

    /// Gas estimate for `call`; failure maps to `RelayError::Estimation`.
    async fn estimate_gas(&self, call: &BridgeCall) -> Result<u64, RelayError>;

    /// Sign and broadcast. Returns the transaction hash on acceptance.
    async fn submit(&self, tx: &PreparedTx) -> Result<B256, RelayError>;

    /// Wait until `tx_hash` is included or `timeout` elapses
    /// (`RelayError::ConfirmationTimeout`).
    async fn wait_for_inclusion(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<Receipt, RelayError>;
}
