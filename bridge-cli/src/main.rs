// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use bridge_config::Config;
use clap::*;
use std::sync::Arc;
use strk_midnight_bridge::config::BridgeNodeConfig;
use strk_midnight_bridge::events::TransactionStatus;
use strk_midnight_bridge::metrics::BridgeMetrics;
use strk_midnight_bridge::types::{
    felt_to_hex, format_tdust, format_units, parse_starknet_address, parse_tx_hash, WalletSeed,
    STRK_DECIMALS,
};
use strk_midnight_bridge::utils::{
    generate_bridge_node_config_and_write_to_file, generate_wallet_seed_and_write_to_file,
};
use strk_midnight_bridge::wallet_env::read_wallet_env;
use strk_midnight_bridge_cli::{Args, BridgeApiClient, BridgeCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    // Init logging
    let (_guard, _filter_handle) = telemetry_subscribers::TelemetryConfig::new()
        .with_env()
        .init();
    let args = Args::parse();
    // Registered but never exported, the CLI has no metrics server
    let metrics = Arc::new(BridgeMetrics::new(&prometheus::Registry::new()));

    match args.command {
        BridgeCommand::CreateWalletSeed {
            env_path,
            overwrite,
        } => {
            generate_wallet_seed_and_write_to_file(&env_path, overwrite)?;
            println!("Wallet seed generated at {}", env_path.display());
        }
        BridgeCommand::CreateBridgeNodeConfigTemplate { path } => {
            generate_bridge_node_config_and_write_to_file(&path)?;
            println!(
                "Bridge node config template generated at {}",
                path.display()
            );
        }
        BridgeCommand::ViewMidnightWallet { config_path, seed } => {
            let config = BridgeNodeConfig::load(&config_path)?;
            let seed = match seed {
                Some(seed) => WalletSeed::parse(&seed)?,
                None => read_wallet_env(&config.midnight.wallet_env_path)?
                    .seed
                    .ok_or_else(|| {
                        anyhow!(
                            "No WALLET_SEED in {}",
                            config.midnight.wallet_env_path.display()
                        )
                    })?,
            };
            let midnight_client = config.midnight_client(metrics);
            let state = midnight_client
                .with_wallet(&seed, |wallet| async move { wallet.state().await })
                .await?;
            println!("Address: {}", state.address);
            println!(
                "Balance: {} tDUST ({} micro-tDUST)",
                format_tdust(state.balance),
                state.balance
            );
        }
        BridgeCommand::ViewStarknetTx {
            config_path,
            tx_hash,
        } => {
            let config = BridgeNodeConfig::load(&config_path)?;
            let client = config.starknet_client(metrics)?;
            let tx_hash = parse_tx_hash(&tx_hash)?;
            let Some(receipt) = client.get_transaction_receipt(&tx_hash).await? else {
                println!("Transaction {} not found", felt_to_hex(&tx_hash));
                return Ok(());
            };
            match receipt.status() {
                TransactionStatus::Pending => println!("Status: pending"),
                TransactionStatus::Final => println!("Status: final"),
                TransactionStatus::Reverted(reason) => println!("Status: reverted ({reason})"),
            }
            for transfer in receipt.strk_transfers(client.strk_token()) {
                println!(
                    "Transfer {} STRK from {} to {}",
                    format_units(transfer.value, STRK_DECIMALS, 6),
                    felt_to_hex(&transfer.from),
                    felt_to_hex(&transfer.to)
                );
            }
        }
        BridgeCommand::ViewStrkBalance {
            config_path,
            address,
        } => {
            let config = BridgeNodeConfig::load(&config_path)?;
            let client = config.starknet_client(metrics)?;
            let account = match address {
                Some(address) => parse_starknet_address(&address)?,
                None => *client.custodial_account(),
            };
            let balance = client.get_strk_balance(&account).await?;
            println!(
                "{} holds {} STRK",
                felt_to_hex(&account),
                format_units(balance, STRK_DECIMALS, 6)
            );
        }
        BridgeCommand::Client { server_url, cmd } => {
            let client = BridgeApiClient::new(&server_url);
            let response = client.send(&cmd).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}
