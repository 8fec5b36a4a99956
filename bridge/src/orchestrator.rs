// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sequences the cross-chain flows: wait for the source chain, verify, pay out
//! on the destination chain.

use starknet::core::types::Felt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::midnight_client::{
    MidnightClient, MidnightWallet, MidnightWalletBuilder, DEFAULT_DEPOSIT_POLL_INTERVAL,
    DEFAULT_DEPOSIT_TIMEOUT, DEFAULT_DEPOSIT_TOLERANCE,
};
use crate::starknet_client::{StarknetClient, StarknetClientInner};
use crate::types::{felt_to_hex, PollingConfig, SwapAmount, WalletSeed};
use crate::wallet_env::read_wallet_env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    // Check the Transfer event of the user's STRK payment before paying out
    pub verify_source_transfer: bool,
    pub deposit: PollingConfig,
    // micro-tDUST
    pub deposit_tolerance: u128,
    // dotenv file holding WALLET_SEED of the custodial Midnight wallet
    pub wallet_env_path: PathBuf,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            verify_source_transfer: true,
            deposit: PollingConfig::new(DEFAULT_DEPOSIT_TIMEOUT, DEFAULT_DEPOSIT_POLL_INTERVAL),
            deposit_tolerance: DEFAULT_DEPOSIT_TOLERANCE,
            wallet_env_path: PathBuf::from(".env"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalance {
    pub address: String,
    // micro-tDUST
    pub balance: u128,
}

pub struct BridgeOrchestrator<S, B: MidnightWalletBuilder> {
    starknet_client: Arc<StarknetClient<S>>,
    midnight_client: Arc<MidnightClient<B>>,
    // Built on first use and shared by all requests, rebuilt once broken
    custodial_wallet: Mutex<Option<Arc<MidnightWallet<B::Wallet>>>>,
    settings: OrchestratorSettings,
    metrics: Arc<BridgeMetrics>,
}

impl<S, B> BridgeOrchestrator<S, B>
where
    S: StarknetClientInner + 'static,
    B: MidnightWalletBuilder + 'static,
{
    pub fn new(
        starknet_client: Arc<StarknetClient<S>>,
        midnight_client: Arc<MidnightClient<B>>,
        settings: OrchestratorSettings,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            starknet_client,
            midnight_client,
            custodial_wallet: Mutex::new(None),
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn starknet_client(&self) -> &Arc<StarknetClient<S>> {
        &self.starknet_client
    }

    // A failed build is not cached and a broken wallet is dropped, the next
    // request builds a new one.
    pub async fn custodial_wallet(&self) -> BridgeResult<Arc<MidnightWallet<B::Wallet>>> {
        let mut slot = self.custodial_wallet.lock().await;
        if let Some(wallet) = slot.as_ref() {
            if !wallet.is_broken() {
                return Ok(wallet.clone());
            }
            warn!("Custodial Midnight wallet is broken, rebuilding it");
            *slot = None;
        }
        let env = read_wallet_env(&self.settings.wallet_env_path)?;
        let seed = env.seed.ok_or(BridgeError::WalletSeedNotFound)?;
        info!("Building custodial Midnight wallet");
        let wallet = self.midnight_client.open_wallet(&seed).await?;
        let state = wallet.state().await?;
        self.metrics.observe_tdust_balance(state.balance);
        info!(
            "Custodial Midnight wallet {} ready with {} micro-tDUST",
            state.address, state.balance
        );
        let wallet = Arc::new(wallet);
        *slot = Some(wallet.clone());
        Ok(wallet)
    }

    // Pays out tDUST for a confirmed STRK transfer to the custodial account.
    pub async fn strk_to_tdust(
        &self,
        tx_hash: &Felt,
        sender: Option<&Felt>,
        amount: &SwapAmount,
        payout_address: &str,
    ) -> BridgeResult<String> {
        info!(
            "Swapping {amount} STRK from {} to tDUST for {payout_address}",
            felt_to_hex(tx_hash)
        );
        let receipt = self
            .starknet_client
            .wait_for_transaction_confirmation(tx_hash)
            .await?;
        if self.settings.verify_source_transfer {
            self.starknet_client
                .verify_strk_transfer(&receipt, amount.strk_wei, sender)?;
        }
        let wallet = self.custodial_wallet().await?;
        wallet.send_tdust(payout_address, amount).await
    }

    // Waits for a tDUST deposit to the custodial wallet and pays out STRK to
    // `recipient`. Returns the STRK transaction hash once it is final.
    pub async fn tdust_to_strk(
        &self,
        amount: &SwapAmount,
        depositor: &str,
        recipient: &Felt,
    ) -> BridgeResult<Felt> {
        info!(
            "Swapping {amount} tDUST from {depositor} to STRK for {}",
            felt_to_hex(recipient)
        );
        let wallet = self.custodial_wallet().await?;
        wallet
            .wait_for_deposit(
                amount.tdust_micro,
                self.settings.deposit_tolerance,
                self.settings.deposit,
            )
            .await?;
        let tx_hash = self
            .starknet_client
            .send_strk(recipient, amount.strk_wei)
            .await?;
        self.starknet_client
            .wait_for_transaction_confirmation(&tx_hash)
            .await?;
        Ok(tx_hash)
    }

    pub async fn pay_with_strk(
        &self,
        tx_hash: &Felt,
        amount: &SwapAmount,
        recipient_address: &str,
    ) -> BridgeResult<String> {
        self.strk_to_tdust(tx_hash, None, amount, recipient_address)
            .await
    }

    // Spends from the payer's own wallet, the custodial wallet is not involved.
    pub async fn pay_with_tdust(
        &self,
        seed: &WalletSeed,
        amount: &SwapAmount,
        recipient_address: &str,
    ) -> BridgeResult<String> {
        let amount = amount.clone();
        let recipient_address = recipient_address.to_string();
        self.midnight_client
            .with_wallet(seed, |wallet| async move {
                wallet.send_tdust(&recipient_address, &amount).await
            })
            .await
    }

    // Returns the address of the wallet for `seed`, generating the seed when
    // none is given. The address is None if the wallet could not be built.
    pub async fn generate_wallet(
        &self,
        seed: Option<WalletSeed>,
    ) -> (Option<String>, Option<WalletSeed>) {
        let (seed, generated) = match seed {
            Some(seed) => (seed, false),
            None => (WalletSeed::generate(), true),
        };
        let address = match self
            .midnight_client
            .with_wallet(&seed, |wallet| async move { wallet.address().await })
            .await
        {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Failed to build Midnight wallet: {e}");
                None
            }
        };
        (address, generated.then_some(seed))
    }

    pub async fn check_balance(&self, seed: &WalletSeed) -> BridgeResult<WalletBalance> {
        let state = self
            .midnight_client
            .with_wallet(seed, |wallet| async move { wallet.state().await })
            .await?;
        Ok(WalletBalance {
            address: state.address,
            balance: state.balance,
        })
    }

    pub async fn shutdown(&self, timeout: Duration) {
        let close = async {
            // Waits for an in-flight build
            let Some(wallet) = self.custodial_wallet.lock().await.take() else {
                return Ok(());
            };
            info!("Closing custodial Midnight wallet");
            wallet.close().await
        };
        match tokio::time::timeout(timeout, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close custodial Midnight wallet: {e}"),
            Err(_) => warn!("Timed out closing custodial Midnight wallet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::{cairo1_transfer, receipt_with_events};
    use crate::events::{ExecutionStatus, TransactionReceipt};
    use crate::midnight_mock_client::{MidnightMockBuilder, MidnightMockWallet};
    use crate::starknet_mock_client::StarknetMockClient;
    use crate::wallet_env::write_wallet_env;

    struct TestEnv {
        _dir: tempfile::TempDir,
        starknet: StarknetMockClient,
        midnight: MidnightMockBuilder,
        custodial: MidnightMockWallet,
        custodial_seed: WalletSeed,
        orchestrator: BridgeOrchestrator<StarknetMockClient, MidnightMockBuilder>,
    }

    fn test_env(custodial_balance: u128) -> TestEnv {
        telemetry_subscribers::init_for_testing();
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        let seed = WalletSeed::generate();
        write_wallet_env(&env_path, &seed, None).unwrap();

        let starknet = StarknetMockClient::default();
        let midnight = MidnightMockBuilder::default();
        let custodial = MidnightMockWallet::new("mn_shield-addr_test1custodial", custodial_balance);
        midnight.add_wallet(&seed, custodial.clone());

        let settings = OrchestratorSettings {
            verify_source_transfer: true,
            deposit: PollingConfig::new(Duration::from_millis(300), Duration::from_millis(5)),
            deposit_tolerance: DEFAULT_DEPOSIT_TOLERANCE,
            wallet_env_path: env_path,
        };
        let orchestrator = BridgeOrchestrator::new(
            Arc::new(StarknetClient::new_for_testing(starknet.clone())),
            Arc::new(MidnightClient::new_for_testing(midnight.clone())),
            settings,
            Arc::new(BridgeMetrics::new_for_testing()),
        );
        TestEnv {
            _dir: dir,
            starknet,
            midnight,
            custodial,
            custodial_seed: seed,
            orchestrator,
        }
    }

    fn amount(value: &str) -> SwapAmount {
        SwapAmount::parse(value).unwrap()
    }

    fn user_payment(env: &TestEnv, tx_hash: Felt, value: u128) -> TransactionReceipt {
        let client = env.orchestrator.starknet_client();
        let mut receipt = receipt_with_events(vec![cairo1_transfer(
            *client.strk_token(),
            Felt::from(0xabcu64),
            *client.custodial_account(),
            value,
        )]);
        receipt.transaction_hash = tx_hash;
        receipt
    }

    #[tokio::test]
    async fn test_strk_to_tdust() {
        let env = test_env(10_000_000);
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(tx_hash, Ok(None));
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 2_000_000_000_000_000_000))),
        );

        let tx_id = env
            .orchestrator
            .strk_to_tdust(&tx_hash, Some(&Felt::from(0xabcu64)), &amount("2"), "mn_user")
            .await
            .unwrap();
        assert_eq!(
            env.custodial.transfers(),
            vec![("mn_user".to_string(), 2_000_000, tx_id)]
        );

        // the custodial wallet is built once
        env.orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("2"), "mn_user")
            .await
            .unwrap();
        assert_eq!(env.midnight.built_wallets().len(), 1);
    }

    #[tokio::test]
    async fn test_strk_to_tdust_payout_failure_is_terminal() {
        let env = test_env(10_000_000);
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 2_000_000_000_000_000_000))),
        );
        env.custodial
            .set_transfer_error(Some(BridgeError::MidnightWalletError(
                "proof server unavailable".into(),
            )));

        let err = env
            .orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("2"), "mn_user")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::MidnightWalletError("proof server unavailable".into())
        );
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(env.custodial.transfers().is_empty());
        // the confirmed STRK stays with the bridge
        assert!(env.starknet.sent_transfers().is_empty());
        assert_eq!(env.starknet.receipt_requests(&tx_hash), 1);
    }

    #[tokio::test]
    async fn test_pay_with_strk() {
        let env = test_env(10_000_000);
        let tx_hash = Felt::from(0x5u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 1_000_000_000_000_000_000))),
        );

        let tx_id = env
            .orchestrator
            .pay_with_strk(&tx_hash, &amount("1"), "mn_merchant")
            .await
            .unwrap();
        assert_eq!(
            env.custodial.transfers(),
            vec![("mn_merchant".to_string(), 1_000_000, tx_id)]
        );

        let err = env
            .orchestrator
            .pay_with_strk(&tx_hash, &amount("3"), "mn_merchant")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransferVerificationFailed(_)));
        assert_eq!(env.custodial.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_custodial_wallet_is_rebuilt() {
        let env = test_env(10_000_000);
        env.orchestrator.custodial_wallet().await.unwrap();
        assert_eq!(env.midnight.built_wallets().len(), 1);

        // the proxy behind the cached wallet died
        env.custodial.set_broken(true);
        let replacement = MidnightMockWallet::new("mn_shield-addr_test1custodial", 10_000_000);
        env.midnight
            .add_wallet(&env.custodial_seed, replacement.clone());
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 2_000_000_000_000_000_000))),
        );

        let tx_id = env
            .orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("2"), "mn_user")
            .await
            .unwrap();
        assert_eq!(env.midnight.built_wallets().len(), 2);
        assert_eq!(
            replacement.transfers(),
            vec![("mn_user".to_string(), 2_000_000, tx_id)]
        );
        assert!(env.custodial.transfers().is_empty());

        // a healthy wallet stays cached
        env.orchestrator.custodial_wallet().await.unwrap();
        assert_eq!(env.midnight.built_wallets().len(), 2);
    }

    #[tokio::test]
    async fn test_strk_to_tdust_verification_failure() {
        let env = test_env(10_000_000);
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 1_000_000_000_000_000_000))),
        );
        let err = env
            .orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("2"), "mn_user")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransferVerificationFailed(_)));
        assert!(env.custodial.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_strk_to_tdust_insufficient_balance() {
        let env = test_env(1_500_000);
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 2_000_000_000_000_000_000))),
        );
        let err = env
            .orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("2"), "mn_user")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient tDUST balance. Required: 2 tDUST, Available: 1.5 tDUST"
        );
    }

    #[tokio::test]
    async fn test_strk_to_tdust_reverted_and_timeout() {
        let env = test_env(10_000_000);
        let reverted = Felt::from(0x2u64);
        let mut receipt = user_payment(&env, reverted, 1);
        receipt.execution_status = Some(ExecutionStatus::Reverted);
        env.starknet.add_receipt_response(reverted, Ok(Some(receipt)));
        let err = env
            .orchestrator
            .strk_to_tdust(&reverted, None, &amount("1"), "mn_user")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransactionReverted { .. }));

        let unknown = Felt::from(0x3u64);
        let err = env
            .orchestrator
            .strk_to_tdust(&unknown, None, &amount("1"), "mn_user")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransactionNotConfirmed { .. }));
        assert!(env.custodial.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_missing_wallet_seed() {
        let env = test_env(10_000_000);
        std::fs::remove_file(&env.orchestrator.settings().wallet_env_path).unwrap();
        let tx_hash = Felt::from(0x1u64);
        env.starknet.add_receipt_response(
            tx_hash,
            Ok(Some(user_payment(&env, tx_hash, 1_000_000_000_000_000_000))),
        );
        let err = env
            .orchestrator
            .strk_to_tdust(&tx_hash, None, &amount("1"), "mn_user")
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::WalletSeedNotFound);
    }

    #[tokio::test]
    async fn test_tdust_to_strk() {
        let env = test_env(1_000_000);
        let recipient = Felt::from(0xabcu64);
        // read by the wallet build, the deposit baseline, then the deposit lands
        env.custodial.push_balances([1_000_000, 1_000_000, 1_000_000, 3_500_000]);
        let tx_hash = Felt::from(0xf000u64);
        env.starknet
            .add_receipt_response(tx_hash, Ok(Some(receipt_with_events(vec![]))));

        let sent = env
            .orchestrator
            .tdust_to_strk(&amount("2.5"), "mn_user", &recipient)
            .await
            .unwrap();
        assert_eq!(sent, tx_hash);
        assert_eq!(
            env.starknet.sent_transfers(),
            vec![(
                *env.orchestrator.starknet_client().strk_token(),
                recipient,
                2_500_000_000_000_000_000,
                tx_hash
            )]
        );
    }

    #[tokio::test]
    async fn test_tdust_to_strk_send_failure_is_terminal() {
        let env = test_env(1_000_000);
        // wallet build, deposit baseline, the deposit
        env.custodial.push_balances([1_000_000, 1_000_000, 3_500_000]);
        env.starknet
            .set_transfer_error(Some(BridgeError::StarknetRpcError(
                "invalid transaction nonce".into(),
            )));

        let err = env
            .orchestrator
            .tdust_to_strk(&amount("2.5"), "mn_user", &Felt::from(0xabcu64))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::StarknetRpcError("invalid transaction nonce".into())
        );
        assert!(env.starknet.sent_transfers().is_empty());
        // the deposit is not sent back
        assert!(env.custodial.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_tdust_to_strk_reverted_payout() {
        let env = test_env(1_000_000);
        env.custodial.push_balances([1_000_000, 1_000_000, 3_500_000]);
        let tx_hash = Felt::from(0xf000u64);
        let mut receipt = receipt_with_events(vec![]);
        receipt.transaction_hash = tx_hash;
        receipt.execution_status = Some(ExecutionStatus::Reverted);
        receipt.revert_reason = Some("u256_sub Overflow".into());
        env.starknet.add_receipt_response(tx_hash, Ok(Some(receipt)));

        let err = env
            .orchestrator
            .tdust_to_strk(&amount("2.5"), "mn_user", &Felt::from(0xabcu64))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::TransactionReverted {
                tx_hash: "0xf000".into(),
                reason: "u256_sub Overflow".into()
            }
        );
        assert_eq!(env.starknet.sent_transfers().len(), 1);
        assert_eq!(env.starknet.receipt_requests(&tx_hash), 1);
    }

    #[tokio::test]
    async fn test_tdust_to_strk_deposit_timeout() {
        let env = test_env(1_000_000);
        let err = env
            .orchestrator
            .tdust_to_strk(&amount("2.5"), "mn_user", &Felt::ONE)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "tDUST transaction not received within 300ms"
        );
        assert!(env.starknet.sent_transfers().is_empty());
    }

    #[tokio::test]
    async fn test_pay_with_tdust_closes_wallet() {
        let env = test_env(0);
        let payer_seed = WalletSeed::generate();
        let payer = MidnightMockWallet::new("mn_payer", 5_000_000);
        env.midnight.add_wallet(&payer_seed, payer.clone());

        let tx_id = env
            .orchestrator
            .pay_with_tdust(&payer_seed, &amount("1"), "mn_merchant")
            .await
            .unwrap();
        assert_eq!(
            payer.transfers(),
            vec![("mn_merchant".to_string(), 1_000_000, tx_id)]
        );
        assert!(payer.is_closed());

        let broke_seed = WalletSeed::generate();
        let broke = MidnightMockWallet::new("mn_broke", 10);
        env.midnight.add_wallet(&broke_seed, broke.clone());
        let err = env
            .orchestrator
            .pay_with_tdust(&broke_seed, &amount("1"), "mn_merchant")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientBalance { .. }));
        assert!(broke.is_closed());
    }

    #[tokio::test]
    async fn test_generate_wallet_and_balance() {
        let env = test_env(0);
        let (address, generated) = env.orchestrator.generate_wallet(None).await;
        let generated = generated.unwrap();
        assert_eq!(
            address.unwrap(),
            format!("mn_shield-addr_test1{}", &generated.expose()[..16])
        );

        let seed = WalletSeed::generate();
        env.midnight
            .add_wallet(&seed, MidnightMockWallet::new("mn_known", 1_234_567));
        let (address, generated) = env.orchestrator.generate_wallet(Some(seed.clone())).await;
        assert_eq!(address.as_deref(), Some("mn_known"));
        assert!(generated.is_none());

        let balance = env.orchestrator.check_balance(&seed).await.unwrap();
        assert_eq!(
            balance,
            WalletBalance {
                address: "mn_known".into(),
                balance: 1_234_567
            }
        );

        env.midnight
            .set_build_error(Some(BridgeError::MidnightWalletError("bad seed".into())));
        let (address, _) = env.orchestrator.generate_wallet(Some(seed.clone())).await;
        assert_eq!(address, None);
        assert!(env.orchestrator.check_balance(&seed).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_custodial_wallet() {
        let env = test_env(0);
        env.orchestrator.shutdown(Duration::from_secs(1)).await;
        assert!(!env.custodial.is_closed());

        env.orchestrator.custodial_wallet().await.unwrap();
        env.orchestrator.shutdown(Duration::from_secs(1)).await;
        assert!(env.custodial.is_closed());
    }
}
