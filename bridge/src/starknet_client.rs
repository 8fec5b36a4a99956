// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use starknet::core::types::Felt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::events::{find_matching_transfer, StrkTransfer, TransactionReceipt, TransactionStatus};
use crate::metrics::BridgeMetrics;
use crate::retry_with_max_elapsed_time;
use crate::starknet_jsonrpc_client::StarknetJsonRpcClient;
use crate::types::{felt_to_hex, format_units, PollingConfig, STRK_DECIMALS};

pub const STRK_TOKEN_ADDRESS: &str =
    "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct StarknetClient<P> {
    inner: P,
    strk_token: Felt,
    custodial_account: Felt,
    confirmation: PollingConfig,
    bridge_metrics: Arc<BridgeMetrics>,
}

pub type StarknetBridgeClient = StarknetClient<StarknetJsonRpcClient>;

impl<P> StarknetClient<P>
where
    P: StarknetClientInner,
{
    pub fn new(
        inner: P,
        strk_token: Felt,
        custodial_account: Felt,
        confirmation: PollingConfig,
        bridge_metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            inner,
            strk_token,
            custodial_account,
            confirmation,
            bridge_metrics,
        }
    }

    pub fn new_for_testing(inner: P) -> Self {
        Self {
            inner,
            strk_token: Felt::from(0x4718u64),
            custodial_account: Felt::from(0x1353u64),
            confirmation: PollingConfig::new(Duration::from_millis(200), Duration::from_millis(10)),
            bridge_metrics: Arc::new(BridgeMetrics::new_for_testing()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn strk_token(&self) -> &Felt {
        &self.strk_token
    }

    pub fn custodial_account(&self) -> &Felt {
        &self.custodial_account
    }

    pub async fn describe(&self) -> anyhow::Result<()> {
        let Ok(Ok(chain_id)) =
            retry_with_max_elapsed_time!(self.inner.get_chain_id(), Duration::from_secs(30))
        else {
            anyhow::bail!("Failed to reach Starknet rpc after retries");
        };
        let block_number = self.inner.get_block_number().await?;
        info!(
            "StarknetClient is connected to chain {}, current block number: {block_number}",
            felt_to_hex(&chain_id)
        );
        match self.get_strk_balance(&self.custodial_account).await {
            Ok(balance) => info!(
                "Custodial account {} holds {} STRK",
                felt_to_hex(&self.custodial_account),
                format_units(balance, STRK_DECIMALS, 6)
            ),
            Err(e) => warn!("Failed to read custodial STRK balance: {e}"),
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> BridgeResult<Felt> {
        self.query("chain_id", self.inner.get_chain_id()).await
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &Felt,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        self.query(
            "get_transaction_receipt",
            self.inner.get_transaction_receipt(tx_hash),
        )
        .await
    }

    pub async fn get_strk_balance(&self, account: &Felt) -> BridgeResult<u128> {
        self.query(
            "balance_of",
            self.inner.get_erc20_balance(&self.strk_token, account),
        )
        .await
    }

    // Polls the receipt of `tx_hash` until it is final. Unknown hashes, non
    // final receipts and rpc errors keep the loop going until the deadline.
    pub async fn wait_for_transaction_confirmation(
        &self,
        tx_hash: &Felt,
    ) -> BridgeResult<TransactionReceipt> {
        let started = Instant::now();
        let deadline = started + self.confirmation.timeout;
        let tx_hex = felt_to_hex(tx_hash);
        loop {
            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => match receipt.status() {
                    TransactionStatus::Final => {
                        self.bridge_metrics
                            .confirmation_wait_latency
                            .with_label_values(&["starknet"])
                            .observe(started.elapsed().as_secs_f64());
                        info!("Starknet transaction {tx_hex} is final");
                        return Ok(receipt);
                    }
                    TransactionStatus::Reverted(reason) => {
                        return Err(BridgeError::TransactionReverted {
                            tx_hash: tx_hex,
                            reason,
                        });
                    }
                    TransactionStatus::Pending => {
                        debug!(
                            "Starknet transaction {tx_hex} not final yet: {:?}",
                            receipt.finality_status
                        );
                    }
                },
                Ok(None) => debug!("Starknet transaction {tx_hex} not found yet"),
                Err(e) => warn!("Failed to get receipt of {tx_hex}, retrying: {e}"),
            }
            if Instant::now() + self.confirmation.interval > deadline {
                return Err(BridgeError::TransactionNotConfirmed {
                    tx_hash: tx_hex,
                    timeout_ms: self.confirmation.timeout.as_millis(),
                });
            }
            tokio::time::sleep(self.confirmation.interval).await;
        }
    }

    pub fn verify_strk_transfer(
        &self,
        receipt: &TransactionReceipt,
        amount_wei: u128,
        sender: Option<&Felt>,
    ) -> BridgeResult<StrkTransfer> {
        let transfer = find_matching_transfer(
            receipt,
            &self.strk_token,
            &self.custodial_account,
            amount_wei,
            sender,
        )?;
        info!(
            "Verified STRK transfer of {} wei from {} in {}",
            transfer.value,
            felt_to_hex(&transfer.from),
            felt_to_hex(&receipt.transaction_hash)
        );
        Ok(transfer)
    }

    // Transfers STRK from the custodial account. Returns the transaction hash
    // as soon as the node accepted the invocation.
    pub async fn send_strk(&self, recipient: &Felt, amount_wei: u128) -> BridgeResult<Felt> {
        let tx_hash = self
            .query(
                "transfer",
                self.inner
                    .transfer_erc20(&self.strk_token, recipient, amount_wei),
            )
            .await?;
        self.bridge_metrics.strk_transfers_sent.inc();
        info!(
            "Sent {amount_wei} wei STRK to {}: {}",
            felt_to_hex(recipient),
            felt_to_hex(&tx_hash)
        );
        Ok(tx_hash)
    }

    async fn query<T>(
        &self,
        method: &str,
        fut: impl std::future::Future<Output = BridgeResult<T>>,
    ) -> BridgeResult<T> {
        self.bridge_metrics
            .starknet_rpc_queries
            .with_label_values(&[method])
            .inc();
        let result = fut.await;
        if result.is_err() {
            self.bridge_metrics
                .starknet_rpc_errors
                .with_label_values(&[method])
                .inc();
        }
        result
    }
}

/// Use a trait to abstract over the Starknet JSON-RPC client and the mock client
/// used in tests.
#[async_trait]
pub trait StarknetClientInner: Send + Sync {
    async fn get_chain_id(&self) -> BridgeResult<Felt>;

    async fn get_block_number(&self) -> BridgeResult<u64>;

    // `None` when the node does not know the hash (yet).
    async fn get_transaction_receipt(
        &self,
        tx_hash: &Felt,
    ) -> BridgeResult<Option<TransactionReceipt>>;

    async fn get_erc20_balance(&self, token: &Felt, account: &Felt) -> BridgeResult<u128>;

    // Signs and submits `token.transfer(recipient, amount)` from the custodial account.
    async fn transfer_erc20(
        &self,
        token: &Felt,
        recipient: &Felt,
        amount: u128,
    ) -> BridgeResult<Felt>;
}
