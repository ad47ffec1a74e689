//! Builds, submits, and confirms a single outbound call
//!
//! One broadcast per successful attempt: retries of a relay always go
//! through a fresh nonce reservation at the orchestrator, never a
//! resubmission of a previously signed payload.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;

use crate::client::{LedgerClient, PreparedTx, Receipt};
use crate::error::{RelayError, SubmissionKind};
use crate::types::BridgeCall;

/// Submits one call at a time to one destination ledger.
pub struct TransactionSubmitter {
    client: Arc<dyn LedgerClient>,
    chain_name: String,
    default_gas_limit: u64,
    confirm_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        chain_name: impl Into<String>,
        default_gas_limit: u64,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            client,
            chain_name: chain_name.into(),
            default_gas_limit,
            confirm_timeout,
        }
    }

    /// The ledger this submitter writes to.
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Estimate, price, build, sign, and broadcast `call` under `nonce`.
    ///
    /// Estimation failure is expected on chains with flaky estimators and
    /// falls back to the configured default gas limit. Exactly one network
    /// submission happens when this returns `Ok`.
    pub async fn broadcast(&self, call: &BridgeCall, nonce: u64) -> Result<B256, RelayError> {
        let gas_limit = match self.client.estimate_gas(call).await {
            Ok(estimate) => estimate,
            Err(RelayError::Estimation(msg)) => {
                tracing::warn!(
                    chain = %self.chain_name,
                    function = call.function_name(),
                    default_gas_limit = self.default_gas_limit,
                    error = %msg,
                    "Gas estimation failed, using default gas limit"
                );
                self.default_gas_limit
            }
            Err(e) => return Err(e),
        };

        let gas_price = self.client.suggested_gas_price().await?;

        let tx = PreparedTx {
            call: call.clone(),
            nonce,
            gas_limit,
            gas_price,
        };

        let tx_hash = self.client.submit(&tx).await?;
        tracing::info!(
            chain = %self.chain_name,
            function = call.function_name(),
            nonce,
            gas_limit,
            tx_hash = %tx_hash,
            "Transaction broadcast"
        );
        Ok(tx_hash)
    }

    /// Wait for inclusion within the configured timeout; a reverted
    /// execution surfaces as a classified submission error.
    pub async fn confirm(&self, tx_hash: B256) -> Result<Receipt, RelayError> {
        let receipt = self
            .client
            .wait_for_inclusion(tx_hash, self.confirm_timeout)
            .await?;

        if !receipt.success {
            return Err(RelayError::Submission {
                kind: SubmissionKind::Reverted,
                message: format!("transaction {} reverted on-chain", tx_hash),
            });
        }
        Ok(receipt)
    }
}
