// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::types::{format_tdust, PollingConfig, SwapAmount, WalletSeed};

pub const DEFAULT_DEPOSIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_DEPOSIT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_WALLET_SYNC_DELAY: Duration = Duration::from_secs(3);
// 0.001 tDUST
pub const DEFAULT_DEPOSIT_TOLERANCE: u128 = 1_000;

#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub address: String,
    // micro-tDUST, sent as a decimal string
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub balance: u128,
}

/// A Midnight wallet that is synced and ready to use.
#[async_trait]
pub trait MidnightWalletInner: Send + Sync {
    async fn state(&self) -> BridgeResult<WalletState>;

    // Builds, proves and submits a native token transfer. Returns the tx id.
    async fn transfer(&self, receiver_address: &str, amount_micro: u128) -> BridgeResult<String>;

    async fn close(&self) -> BridgeResult<()>;

    // True once the wallet can no longer serve requests and must be rebuilt.
    fn is_broken(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait MidnightWalletBuilder: Send + Sync {
    type Wallet: MidnightWalletInner + 'static;

    async fn build(&self, seed: &WalletSeed) -> BridgeResult<Self::Wallet>;
}

pub struct MidnightWallet<W> {
    inner: W,
    // Held across a balance check and the transfer that depends on it
    transfer_lock: Mutex<()>,
    bridge_metrics: Arc<BridgeMetrics>,
}

impl<W> MidnightWallet<W>
where
    W: MidnightWalletInner,
{
    pub fn new(inner: W, bridge_metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            inner,
            transfer_lock: Mutex::new(()),
            bridge_metrics,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.inner.is_broken()
    }

    pub async fn state(&self) -> BridgeResult<WalletState> {
        self.inner.state().await
    }

    pub async fn address(&self) -> BridgeResult<String> {
        Ok(self.inner.state().await?.address)
    }

    pub async fn balance(&self) -> BridgeResult<u128> {
        Ok(self.inner.state().await?.balance)
    }

    // Checks the balance covers `amount` and sends it to `receiver_address`.
    pub async fn send_tdust(
        &self,
        receiver_address: &str,
        amount: &SwapAmount,
    ) -> BridgeResult<String> {
        let _guard = self.transfer_lock.lock().await;
        let state = self.inner.state().await?;
        if state.balance < amount.tdust_micro {
            return Err(BridgeError::InsufficientBalance {
                required: amount.display.clone(),
                available: format_tdust(state.balance),
            });
        }
        info!(
            "Sending {} tDUST from {} to {receiver_address}",
            amount, state.address
        );
        let tx_id = self
            .inner
            .transfer(receiver_address, amount.tdust_micro)
            .await?;
        self.bridge_metrics.tdust_transfers_sent.inc();
        info!("tDUST transfer submitted: {tx_id}");
        Ok(tx_id)
    }

    // Polls the balance until it grew by `expected_micro` (within `tolerance`)
    // compared to the balance at call time. Returns the new balance.
    pub async fn wait_for_deposit(
        &self,
        expected_micro: u128,
        tolerance: u128,
        polling: PollingConfig,
    ) -> BridgeResult<u128> {
        let started = Instant::now();
        let deadline = started + polling.timeout;
        let initial_balance = self.balance().await?;
        self.bridge_metrics.observe_tdust_balance(initial_balance);
        info!(
            "Waiting for a {} tDUST deposit, initial balance: {} tDUST",
            format_tdust(expected_micro),
            format_tdust(initial_balance)
        );
        loop {
            if Instant::now() + polling.interval > deadline {
                return Err(BridgeError::DepositNotReceived {
                    timeout_ms: polling.timeout.as_millis(),
                });
            }
            tokio::time::sleep(polling.interval).await;
            let balance = match self.balance().await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!("Failed to read tDUST balance, retrying: {e}");
                    continue;
                }
            };
            self.bridge_metrics.observe_tdust_balance(balance);
            if balance <= initial_balance {
                debug!("No tDUST deposit yet");
                continue;
            }
            let received = balance - initial_balance;
            if received.abs_diff(expected_micro) <= tolerance {
                self.bridge_metrics
                    .confirmation_wait_latency
                    .with_label_values(&["midnight"])
                    .observe(started.elapsed().as_secs_f64());
                info!("Received {} tDUST deposit", format_tdust(received));
                return Ok(balance);
            }
            self.bridge_metrics.deposits_ignored.inc();
            warn!(
                "Balance increased by {} tDUST, expected {} tDUST",
                format_tdust(received),
                format_tdust(expected_micro)
            );
        }
    }

    pub async fn close(&self) -> BridgeResult<()> {
        self.inner.close().await
    }
}

/// Opens Midnight wallets from seeds and waits for them to sync.
pub struct MidnightClient<B> {
    builder: B,
    sync_delay: Duration,
    bridge_metrics: Arc<BridgeMetrics>,
}

impl<B> MidnightClient<B>
where
    B: MidnightWalletBuilder,
{
    pub fn new(builder: B, sync_delay: Duration, bridge_metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            builder,
            sync_delay,
            bridge_metrics,
        }
    }

    pub fn new_for_testing(builder: B) -> Self {
        Self::new(
            builder,
            Duration::from_millis(1),
            Arc::new(BridgeMetrics::new_for_testing()),
        )
    }

    pub async fn open_wallet(&self, seed: &WalletSeed) -> BridgeResult<MidnightWallet<B::Wallet>> {
        let inner = self.builder.build(seed).await?;
        // The wallet syncs in the background, balances read too early are stale.
        tokio::time::sleep(self.sync_delay).await;
        Ok(MidnightWallet::new(inner, self.bridge_metrics.clone()))
    }

    // Runs `f` against a throwaway wallet and closes it afterwards, whatever
    // `f` returned.
    pub async fn with_wallet<T, F, Fut>(&self, seed: &WalletSeed, f: F) -> BridgeResult<T>
    where
        F: FnOnce(Arc<MidnightWallet<B::Wallet>>) -> Fut,
        Fut: std::future::Future<Output = BridgeResult<T>>,
    {
        let wallet = Arc::new(self.open_wallet(seed).await?);
        let result = f(wallet.clone()).await;
        if let Err(e) = wallet.close().await {
            warn!("Failed to close Midnight wallet: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midnight_mock_client::{MidnightMockBuilder, MidnightMockWallet};

    fn amount(value: &str) -> SwapAmount {
        SwapAmount::parse(value).unwrap()
    }

    fn polling() -> PollingConfig {
        PollingConfig::new(Duration::from_millis(200), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_send_tdust() {
        let mock = MidnightMockWallet::new("mn_custodial", 5_000_000);
        let wallet = MidnightWallet::new(mock.clone(), Arc::new(BridgeMetrics::new_for_testing()));

        let tx_id = wallet.send_tdust("mn_user", &amount("1.5")).await.unwrap();
        assert_eq!(mock.transfers(), vec![("mn_user".to_string(), 1_500_000, tx_id)]);
        assert_eq!(wallet.balance().await.unwrap(), 3_500_000);

        let err = wallet.send_tdust("mn_user", &amount("4")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient tDUST balance. Required: 4 tDUST, Available: 3.5 tDUST"
        );
        assert_eq!(mock.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_deposit() {
        telemetry_subscribers::init_for_testing();
        let mock = MidnightMockWallet::new("mn_custodial", 1_000_000);
        let wallet = MidnightWallet::new(mock.clone(), Arc::new(BridgeMetrics::new_for_testing()));
        // initial read, an unrelated deposit, a failed read, then the deposit
        mock.push_balances([1_000_000, 1_200_000]);
        mock.push_balance_error();
        mock.push_balances([3_000_500]);

        let balance = wallet
            .wait_for_deposit(2_000_000, DEFAULT_DEPOSIT_TOLERANCE, polling())
            .await
            .unwrap();
        assert_eq!(balance, 3_000_500);
    }

    #[tokio::test]
    async fn test_wait_for_deposit_tolerance_edges() {
        for (received, ok) in [(1_000, true), (999, false), (3_000, true), (3_001, false)] {
            let mock = MidnightMockWallet::new("mn_custodial", 0);
            let wallet = MidnightWallet::new(mock.clone(), Arc::new(BridgeMetrics::new_for_testing()));
            mock.push_balances([0, received]);
            let result = wallet
                .wait_for_deposit(2_000, DEFAULT_DEPOSIT_TOLERANCE, polling())
                .await;
            assert_eq!(result.is_ok(), ok, "received {received}");
        }
    }

    #[tokio::test]
    async fn test_wait_for_deposit_timeout() {
        let mock = MidnightMockWallet::new("mn_custodial", 10);
        let wallet = MidnightWallet::new(mock, Arc::new(BridgeMetrics::new_for_testing()));
        let err = wallet
            .wait_for_deposit(1_000_000, DEFAULT_DEPOSIT_TOLERANCE, polling())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "tDUST transaction not received within 200ms");
    }

    #[tokio::test]
    async fn test_with_wallet_closes_on_error() {
        let builder = MidnightMockBuilder::default();
        let client = MidnightClient::new_for_testing(builder.clone());
        let seed = WalletSeed::generate();

        let result: BridgeResult<()> = client
            .with_wallet(&seed, |_| async {
                Err(BridgeError::MidnightWalletError("proof server down".into()))
            })
            .await;
        assert!(result.is_err());
        let wallets = builder.built_wallets();
        assert_eq!(wallets.len(), 1);
        assert!(wallets[0].is_closed());
    }
}
