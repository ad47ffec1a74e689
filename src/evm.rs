//! Alloy-backed `LedgerClient` for one EVM chain
//!
//! Owns the chain's RPC endpoint, the bridge contract address, and the
//! warden signer. One instance per chain; nothing here is shared process
//! state.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::{Client, Http};
use eyre::{Result, WrapErr};

use crate::client::{LedgerClient, PreparedTx, RawLog, Receipt};
use crate::error::{classify_rpc_error, RelayError};
use crate::types::{BridgeCall, EventKind};

// Bridge contract surface the warden drives. Both chains expose the same
// interface; each side only emits/accepts its own half.
sol! {
    contract BridgeGateway {
        event Deposit(address indexed token, address indexed recipient, uint256 amount);
        event Unwrap(address indexed underlying_token, address indexed to, uint256 amount);

        function wrap(address token, address recipient, uint256 amount) external;
        function withdraw(address token, address recipient, uint256 amount) external;
    }
}

/// Receipt polling interval during inclusion waits.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on any single RPC round trip.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound an RPC call so a stalled endpoint surfaces as a transient
/// connectivity error instead of hanging the loop.
async fn with_timeout<T, F>(what: &str, fut: F) -> Result<T, RelayError>
where
    F: std::future::Future<Output = Result<T, RelayError>>,
{
    match tokio::time::timeout(RPC_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Connectivity(format!("{} timed out", what))),
    }
}

pub struct EvmLedger {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    chain_id: u64,
    bridge_address: Address,
    signer: PrivateKeySigner,
}

impl EvmLedger {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        bridge_address: &str,
        private_key: &str,
    ) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
        let provider = RootProvider::new_http(url);

        let bridge_address =
            Address::from_str(bridge_address).wrap_err("Invalid bridge address")?;
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid warden key")?;

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
            chain_id,
            bridge_address,
            signer,
        })
    }

    fn encode_call(call: &BridgeCall) -> Vec<u8> {
        match call {
            BridgeCall::Wrap {
                token,
                recipient,
                amount,
            } => BridgeGateway::wrapCall {
                token: *token,
                recipient: *recipient,
                amount: *amount,
            }
            .abi_encode(),
            BridgeCall::Withdraw {
                token,
                recipient,
                amount,
            } => BridgeGateway::withdrawCall {
                token: *token,
                recipient: *recipient,
                amount: *amount,
            }
            .abi_encode(),
        }
    }

    fn call_request(&self, call: &BridgeCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(self.bridge_address)
            .with_input(Self::encode_call(call))
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn head_height(&self) -> Result<u64, RelayError> {
        with_timeout("get_block_number", async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| RelayError::Connectivity(format!("get_block_number: {}", e)))
        })
        .await
    }

    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RelayError> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = with_timeout("get_logs", async {
            self.provider
                .get_logs(&filter)
                .await
                .map_err(|e| RelayError::Connectivity(format!("get_logs: {}", e)))
        })
        .await?;

        let topic = kind.topic();
        let raw = logs
            .into_iter()
            .filter(|log| log.topics().first() == Some(&topic))
            .map(|log| RawLog {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.to_vec(),
                block_number: log.block_number,
                tx_hash: log.transaction_hash,
                log_index: log.log_index,
            })
            .collect();

        Ok(raw)
    }

    async fn account_nonce(&self, account: Address) -> Result<u64, RelayError> {
        with_timeout("get_transaction_count", async {
            self.provider
                .get_transaction_count(account)
                .await
                .map_err(|e| RelayError::Connectivity(format!("get_transaction_count: {}", e)))
        })
        .await
    }

    async fn suggested_gas_price(&self) -> Result<u128, RelayError> {
        with_timeout("get_gas_price", async {
            self.provider
                .get_gas_price()
                .await
                .map_err(|e| RelayError::Connectivity(format!("get_gas_price: {}", e)))
        })
        .await
    }

    async fn estimate_gas(&self, call: &BridgeCall) -> Result<u64, RelayError> {
        // Any estimation failure (including node quirks on testnets) maps
        // to Estimation so the submitter can fall back to the default.
        match tokio::time::timeout(
            RPC_TIMEOUT,
            self.provider.estimate_gas(&self.call_request(call)),
        )
        .await
        {
            Ok(result) => result.map_err(|e| RelayError::Estimation(e.to_string())),
            Err(_) => Err(RelayError::Estimation("estimate_gas timed out".to_string())),
        }
    }

    async fn submit(&self, tx: &PreparedTx) -> Result<B256, RelayError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| RelayError::Connectivity(format!("bad RPC URL: {}", e)))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new().wallet(wallet).on_http(url);

        let request = self
            .call_request(&tx.call)
            .with_nonce(tx.nonce)
            .with_gas_limit(tx.gas_limit)
            .with_gas_price(tx.gas_price)
            .with_chain_id(self.chain_id);

        tracing::debug!(
            function = tx.call.function_name(),
            nonce = tx.nonce,
            calldata = %hex::encode(Self::encode_call(&tx.call)),
            "Submitting bridge call"
        );

        let pending = match tokio::time::timeout(RPC_TIMEOUT, provider.send_transaction(request))
            .await
        {
            Ok(result) => result.map_err(|e| classify_rpc_error(&e.to_string()))?,
            Err(_) => {
                return Err(RelayError::Connectivity(
                    "send_transaction timed out".to_string(),
                ))
            }
        };

        Ok(*pending.tx_hash())
    }

    async fn wait_for_inclusion(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<Receipt, RelayError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let poll = with_timeout("get_transaction_receipt", async {
                self.provider
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(|e| RelayError::Connectivity(format!("get_transaction_receipt: {}", e)))
            })
            .await;

            match poll {
                Ok(Some(receipt)) => {
                    return Ok(Receipt {
                        tx_hash,
                        block_number: receipt.block_number.unwrap_or_default(),
                        success: receipt.status(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    // Transport hiccup while polling; keep trying until
                    // the deadline rather than failing the wait outright.
                    tracing::debug!(
                        tx_hash = %tx_hash,
                        error = %e,
                        "Receipt poll failed, retrying"
                    );
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(RelayError::ConfirmationTimeout { tx_hash });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
