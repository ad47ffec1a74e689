//! Shared test fixtures: a scriptable in-memory ledger and helpers

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use alloy::primitives::{keccak256, Address, B256, U256};

use bridge_warden::client::{LedgerClient, PreparedTx, RawLog, Receipt};
use bridge_warden::error::RelayError;
use bridge_warden::nonce::NonceSequencer;
use bridge_warden::orchestrator::RelayOrchestrator;
use bridge_warden::retry::RetryPolicy;
use bridge_warden::store::MemoryStore;
use bridge_warden::submitter::TransactionSubmitter;
use bridge_warden::types::{BridgeCall, EventKind};
use bridge_warden::watcher::ChainWatcher;

pub const DEFAULT_GAS_LIMIT: u64 = 250_000;

#[derive(Default)]
struct MockState {
    head: u64,
    logs: Vec<RawLog>,
    account_nonce: u64,
    fail_estimation: bool,
    /// Scripted per-call fetch outcomes; `None` = succeed. Empty = succeed.
    fetch_script: VecDeque<Option<RelayError>>,
    /// Scripted submit failures, consumed one per attempt.
    submit_failures: VecDeque<RelayError>,
    /// Receipts for submitted transactions are withheld when set, so
    /// inclusion waits time out.
    withhold_receipts: bool,
    submitted: Vec<PreparedTx>,
    receipts: HashMap<B256, Receipt>,
}

/// Programmable `LedgerClient` for driving the engine in tests.
pub struct MockLedger {
    chain_id: u64,
    signer: Address,
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            signer: Address::repeat_byte(0x77),
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn set_account_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().account_nonce = nonce;
    }

    pub fn fail_estimation(&self, fail: bool) {
        self.state.lock().unwrap().fail_estimation = fail;
    }

    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().unwrap().withhold_receipts = withhold;
    }

    pub fn add_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Script the next fetch_logs outcomes; `None` entries succeed.
    pub fn script_fetches(&self, outcomes: Vec<Option<RelayError>>) {
        self.state.lock().unwrap().fetch_script.extend(outcomes);
    }

    /// Queue failures consumed by the next submit attempts.
    pub fn fail_next_submits(&self, errors: Vec<RelayError>) {
        self.state.lock().unwrap().submit_failures.extend(errors);
    }

    pub fn submitted(&self) -> Vec<PreparedTx> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Insert a receipt directly (used to simulate a transaction that
    /// landed before a crash/restart).
    pub fn insert_receipt(&self, tx_hash: B256, block_number: u64, success: bool) {
        self.state.lock().unwrap().receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number,
                success,
            },
        );
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn head_height(&self) -> Result<u64, RelayError> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RelayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(Some(err)) = state.fetch_script.pop_front() {
            return Err(err);
        }

        let topic = kind.topic();
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.topics.first() == Some(&topic)
                    && log
                        .block_number
                        .map(|b| b >= from_block && b <= to_block)
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn account_nonce(&self, _account: Address) -> Result<u64, RelayError> {
        Ok(self.state.lock().unwrap().account_nonce)
    }

    async fn suggested_gas_price(&self) -> Result<u128, RelayError> {
        Ok(1_000_000_000)
    }

    async fn estimate_gas(&self, _call: &BridgeCall) -> Result<u64, RelayError> {
        let state = self.state.lock().unwrap();
        if state.fail_estimation {
            Err(RelayError::Estimation("estimator unavailable".to_string()))
        } else {
            Ok(100_000)
        }
    }

    async fn submit(&self, tx: &PreparedTx) -> Result<B256, RelayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }

        let mut seed = Vec::new();
        seed.extend(self.chain_id.to_be_bytes());
        seed.extend(tx.nonce.to_be_bytes());
        seed.extend((state.submitted.len() as u64).to_be_bytes());
        let tx_hash = keccak256(&seed);

        state.submitted.push(tx.clone());
        if !state.withhold_receipts {
            let head = state.head;
            state.receipts.insert(
                tx_hash,
                Receipt {
                    tx_hash,
                    block_number: head + 1,
                    success: true,
                },
            );
        }
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(
        &self,
        tx_hash: B256,
        _timeout: Duration,
    ) -> Result<Receipt, RelayError> {
        let state = self.state.lock().unwrap();
        match state.receipts.get(&tx_hash) {
            Some(receipt) => Ok(receipt.clone()),
            None => Err(RelayError::ConfirmationTimeout { tx_hash }),
        }
    }
}

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn tx_hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

fn address_topic(addr: Address) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_slice());
    B256::from(bytes)
}

/// Build a well-formed bridge event log.
pub fn event_log(
    kind: EventKind,
    block_number: u64,
    tx: B256,
    log_index: u64,
    token: Address,
    recipient: Address,
    amount: u64,
) -> RawLog {
    RawLog {
        address: Address::ZERO,
        topics: vec![kind.topic(), address_topic(token), address_topic(recipient)],
        data: U256::from(amount).to_be_bytes::<32>().to_vec(),
        block_number: Some(block_number),
        tx_hash: Some(tx),
        log_index: Some(log_index),
    }
}

/// Tight backoffs so retry-path tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(40),
        multiplier: 2.0,
    }
}

/// Wire one relay direction over mock ledgers and the in-memory store.
pub fn direction(
    label: &str,
    watch: &Arc<MockLedger>,
    kind: EventKind,
    submit_to: &Arc<MockLedger>,
    store: &Arc<MemoryStore>,
) -> RelayOrchestrator {
    direction_with_chunk(label, watch, kind, submit_to, store, 30)
}

/// Same as `direction` with an explicit sub-range size.
pub fn direction_with_chunk(
    label: &str,
    watch: &Arc<MockLedger>,
    kind: EventKind,
    submit_to: &Arc<MockLedger>,
    store: &Arc<MemoryStore>,
    max_blocks_per_query: u64,
) -> RelayOrchestrator {
    let retry = fast_retry();
    RelayOrchestrator::new(
        label,
        ChainWatcher::new(
            watch.clone() as Arc<dyn LedgerClient>,
            store.clone() as Arc<dyn bridge_warden::store::RelayStore>,
            kind,
            "watched",
            5,
            max_blocks_per_query,
            retry.clone(),
        ),
        TransactionSubmitter::new(
            submit_to.clone() as Arc<dyn LedgerClient>,
            "target",
            DEFAULT_GAS_LIMIT,
            Duration::from_secs(5),
        ),
        NonceSequencer::new(0),
        store.clone() as Arc<dyn bridge_warden::store::RelayStore>,
        retry,
        Duration::from_millis(10),
    )
}
