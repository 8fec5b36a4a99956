// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::BridgeMetrics;
use crate::midnight_client::{
    MidnightClient, DEFAULT_DEPOSIT_POLL_INTERVAL, DEFAULT_DEPOSIT_TIMEOUT,
    DEFAULT_DEPOSIT_TOLERANCE, DEFAULT_WALLET_SYNC_DELAY,
};
use crate::midnight_proxy_client::{
    MidnightNetworkConfig, MidnightProxyBuilder, DEFAULT_PROXY_REQUEST_TIMEOUT,
};
use crate::orchestrator::OrchestratorSettings;
use crate::starknet_client::{
    StarknetBridgeClient, StarknetClient, DEFAULT_CONFIRMATION_POLL_INTERVAL,
    DEFAULT_CONFIRMATION_TIMEOUT, STRK_TOKEN_ADDRESS,
};
use crate::starknet_jsonrpc_client::StarknetJsonRpcClient;
use crate::types::{parse_felt, PollingConfig};
use anyhow::{anyhow, Context};
use bridge_config::Config;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use starknet::core::types::Felt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const STARKNET_PRIVATE_KEY_ENV: &str = "STARKNET_PRIVATE_KEY";

pub const DEFAULT_SERVER_LISTEN_PORT: u16 = 3001;
pub const DEFAULT_METRICS_PORT: u16 = 9184;

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StarknetConfig {
    // Rpc url for the Starknet fullnode, used for queries and to submit transactions.
    pub starknet_rpc_url: String,
    // ERC-20 contract of STRK.
    #[serde(default = "default_strk_token_address")]
    pub strk_token_address: String,
    // The custodial account. Users pay STRK into it, STRK payouts are sent from it.
    pub custodial_account_address: String,
    // File holding the hex private key of the custodial account. When not set
    // the key is read from STARKNET_PRIVATE_KEY. Without a key the node still
    // runs but cannot pay out STRK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_interval_ms")]
    pub confirmation_poll_interval_ms: u64,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MidnightConfig {
    #[serde(flatten)]
    pub network: MidnightNetworkConfig,
    // Executable of the wallet proxy, spawned once per wallet.
    pub wallet_proxy_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wallet_proxy_args: Vec<String>,
    // Dotenv file with WALLET_SEED of the custodial wallet.
    #[serde(default = "default_wallet_env_path")]
    pub wallet_env_path: PathBuf,
    #[serde(default = "default_proxy_request_timeout_secs")]
    pub proxy_request_timeout_secs: u64,
    // Time given to a freshly built wallet to sync before it is used.
    #[serde(default = "default_wallet_sync_delay_ms")]
    pub wallet_sync_delay_ms: u64,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SwapConfig {
    // Check that the user's STRK transaction pays the custodial account the
    // requested amount before paying out tDUST.
    #[serde(default = "default_true")]
    pub verify_source_transfer: bool,
    #[serde(default = "default_deposit_timeout_secs")]
    pub deposit_timeout_secs: u64,
    #[serde(default = "default_deposit_poll_interval_ms")]
    pub deposit_poll_interval_ms: u64,
    // Accepted difference between expected and received tDUST, in micro-tDUST.
    #[serde(default = "default_deposit_tolerance")]
    pub deposit_tolerance: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            verify_source_transfer: true,
            deposit_timeout_secs: default_deposit_timeout_secs(),
            deposit_poll_interval_ms: default_deposit_poll_interval_ms(),
            deposit_tolerance: default_deposit_tolerance(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeNodeConfig {
    // The port that the server listens on.
    pub server_listen_port: u16,
    // The port for the metrics server.
    pub metrics_port: u16,
    // Starknet configuration
    pub starknet: StarknetConfig,
    // Midnight configuration
    pub midnight: MidnightConfig,
    #[serde(default)]
    pub swap: SwapConfig,
}

impl Config for BridgeNodeConfig {}

fn default_strk_token_address() -> String {
    STRK_TOKEN_ADDRESS.to_string()
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
}

fn default_confirmation_poll_interval_ms() -> u64 {
    DEFAULT_CONFIRMATION_POLL_INTERVAL.as_millis() as u64
}

fn default_wallet_env_path() -> PathBuf {
    PathBuf::from(".env")
}

fn default_proxy_request_timeout_secs() -> u64 {
    DEFAULT_PROXY_REQUEST_TIMEOUT.as_secs()
}

fn default_wallet_sync_delay_ms() -> u64 {
    DEFAULT_WALLET_SYNC_DELAY.as_millis() as u64
}

fn default_true() -> bool {
    true
}

fn default_deposit_timeout_secs() -> u64 {
    DEFAULT_DEPOSIT_TIMEOUT.as_secs()
}

fn default_deposit_poll_interval_ms() -> u64 {
    DEFAULT_DEPOSIT_POLL_INTERVAL.as_millis() as u64
}

fn default_deposit_tolerance() -> u64 {
    DEFAULT_DEPOSIT_TOLERANCE as u64
}

pub struct BridgeServerConfig {
    pub server_listen_port: u16,
    pub metrics_port: u16,
    pub starknet_client: Arc<StarknetBridgeClient>,
    pub midnight_client: Arc<MidnightClient<MidnightProxyBuilder>>,
    pub orchestrator_settings: OrchestratorSettings,
}

impl BridgeNodeConfig {
    pub fn template() -> Self {
        Self {
            server_listen_port: DEFAULT_SERVER_LISTEN_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            starknet: StarknetConfig {
                starknet_rpc_url: "https://starknet-sepolia.public.blastapi.io/rpc/v0_8"
                    .to_string(),
                strk_token_address: default_strk_token_address(),
                custodial_account_address:
                    "0x0135353f55784cb5f1c1c7d2ec3f5d4dab42eff301834a9d8588550ae7a33ed4"
                        .to_string(),
                private_key_path: None,
                confirmation_timeout_secs: default_confirmation_timeout_secs(),
                confirmation_poll_interval_ms: default_confirmation_poll_interval_ms(),
            },
            midnight: MidnightConfig {
                network: MidnightNetworkConfig::testnet(),
                wallet_proxy_path: "midnight-wallet-proxy".to_string(),
                wallet_proxy_args: vec![],
                wallet_env_path: default_wallet_env_path(),
                proxy_request_timeout_secs: default_proxy_request_timeout_secs(),
                wallet_sync_delay_ms: default_wallet_sync_delay_ms(),
            },
            swap: SwapConfig::default(),
        }
    }

    pub fn orchestrator_settings(&self) -> anyhow::Result<OrchestratorSettings> {
        if self.swap.deposit_poll_interval_ms == 0 {
            return Err(anyhow!("swap.deposit-poll-interval-ms must be positive"));
        }
        Ok(OrchestratorSettings {
            verify_source_transfer: self.swap.verify_source_transfer,
            deposit: PollingConfig::new(
                Duration::from_secs(self.swap.deposit_timeout_secs),
                Duration::from_millis(self.swap.deposit_poll_interval_ms),
            ),
            deposit_tolerance: self.swap.deposit_tolerance as u128,
            wallet_env_path: self.midnight.wallet_env_path.clone(),
        })
    }

    pub fn starknet_polling(&self) -> anyhow::Result<PollingConfig> {
        if self.starknet.confirmation_poll_interval_ms == 0 {
            return Err(anyhow!(
                "starknet.confirmation-poll-interval-ms must be positive"
            ));
        }
        Ok(PollingConfig::new(
            Duration::from_secs(self.starknet.confirmation_timeout_secs),
            Duration::from_millis(self.starknet.confirmation_poll_interval_ms),
        ))
    }

    // Starknet client signing with the custodial account key, if one is configured.
    pub fn starknet_client(&self, metrics: Arc<BridgeMetrics>) -> anyhow::Result<StarknetBridgeClient> {
        let strk_token = parse_felt(&self.starknet.strk_token_address).ok_or_else(|| {
            anyhow!(
                "Invalid strk-token-address {}",
                self.starknet.strk_token_address
            )
        })?;
        let custodial_account = parse_felt(&self.starknet.custodial_account_address)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid custodial-account-address {}",
                    self.starknet.custodial_account_address
                )
            })?;
        let mut rpc_client = StarknetJsonRpcClient::new(&self.starknet.starknet_rpc_url);
        match read_starknet_private_key(self.starknet.private_key_path.as_deref())? {
            Some(private_key) => {
                rpc_client = rpc_client.with_signer(custodial_account, private_key);
            }
            None => warn!(
                "No Starknet private key configured, STRK payouts will fail. Set {STARKNET_PRIVATE_KEY_ENV} or starknet.private-key-path"
            ),
        }
        Ok(StarknetClient::new(
            rpc_client,
            strk_token,
            custodial_account,
            self.starknet_polling()?,
            metrics,
        ))
    }

    pub fn midnight_client(&self, metrics: Arc<BridgeMetrics>) -> MidnightClient<MidnightProxyBuilder> {
        let builder = MidnightProxyBuilder::new(
            self.midnight.wallet_proxy_path.clone(),
            self.midnight.wallet_proxy_args.clone(),
            self.midnight.network.clone(),
            Duration::from_secs(self.midnight.proxy_request_timeout_secs),
            metrics.clone(),
        );
        MidnightClient::new(
            builder,
            Duration::from_millis(self.midnight.wallet_sync_delay_ms),
            metrics,
        )
    }

    pub async fn validate(&self, metrics: Arc<BridgeMetrics>) -> anyhow::Result<BridgeServerConfig> {
        info!("Starting config validation");
        let orchestrator_settings = self.orchestrator_settings()?;

        let starknet_client = Arc::new(self.starknet_client(metrics.clone())?);
        starknet_client.describe().await?;

        let midnight_client = Arc::new(self.midnight_client(metrics));
        info!(
            "Midnight wallets use indexer {} and proof server {}",
            self.midnight.network.indexer, self.midnight.network.proof_server
        );
        if !orchestrator_settings.wallet_env_path.exists() {
            warn!(
                "Wallet env file {:?} not found, swaps will fail until it holds WALLET_SEED",
                orchestrator_settings.wallet_env_path
            );
        }

        info!("Config validation complete");
        Ok(BridgeServerConfig {
            server_listen_port: self.server_listen_port,
            metrics_port: self.metrics_port,
            starknet_client,
            midnight_client,
            orchestrator_settings,
        })
    }
}

// Key file first, then the environment.
pub fn read_starknet_private_key(path: Option<&Path>) -> anyhow::Result<Option<Felt>> {
    let raw = match path {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read Starknet private key from {path:?}"))?,
        ),
        None => std::env::var(STARKNET_PRIVATE_KEY_ENV).ok(),
    };
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    parse_felt(&raw)
        .map(Some)
        .ok_or_else(|| anyhow!("Starknet private key is not a valid hex field element"))
}
