// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use clap::*;
use serde_json::{json, Value};
use std::path::PathBuf;
use strk_midnight_bridge::server::{
    CHECK_BALANCE_PATH, GENERATE_WALLET_PATH, HEALTH_PATH, PAYMENT_PATH, SWAP_PATH,
};
use tracing::info;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3001";

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    #[clap(subcommand)]
    pub command: BridgeCommand,
}

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub enum BridgeCommand {
    // Generate the custodial Midnight wallet seed and store it in a dotenv file
    #[clap(name = "create-wallet-seed")]
    CreateWalletSeed {
        #[clap(long = "env-path", default_value = ".env")]
        env_path: PathBuf,
        #[clap(long)]
        overwrite: bool,
    },
    #[clap(name = "create-bridge-node-config-template")]
    CreateBridgeNodeConfigTemplate { path: PathBuf },
    // Open a Midnight wallet through the proxy and print its address and balance.
    // Without `--seed` the custodial seed from the node's wallet env file is used.
    #[clap(name = "view-midnight-wallet")]
    ViewMidnightWallet {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        #[clap(long)]
        seed: Option<String>,
    },
    // Print the finality and the STRK transfers of a Starknet transaction
    #[clap(name = "view-starknet-tx")]
    ViewStarknetTx {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        tx_hash: String,
    },
    // STRK balance of an account, the custodial account by default
    #[clap(name = "view-strk-balance")]
    ViewStrkBalance {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        #[clap(long)]
        address: Option<String>,
    },
    // Send requests to a running bridge node
    #[clap(name = "client")]
    Client {
        #[clap(long = "server-url", default_value = DEFAULT_SERVER_URL)]
        server_url: String,
        #[clap(subcommand)]
        cmd: BridgeClientCommands,
    },
}

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub enum BridgeClientCommands {
    #[clap(name = "health")]
    Health,
    #[clap(name = "generate-wallet")]
    GenerateWallet {
        #[clap(long)]
        seed: Option<String>,
    },
    #[clap(name = "check-balance")]
    CheckBalance {
        #[clap(long)]
        seed: String,
    },
    #[clap(name = "swap")]
    Swap {
        #[clap(long)]
        amount: String,
        #[clap(long = "midnight-address")]
        midnight_address: String,
        // strk-to-tdust or tdust-to-strk
        #[clap(long)]
        direction: String,
        #[clap(long = "tx-hash")]
        tx_hash: Option<String>,
        #[clap(long = "sender-address")]
        sender_address: Option<String>,
        #[clap(long = "recipient-address")]
        recipient_address: Option<String>,
    },
    #[clap(name = "payment")]
    Payment {
        #[clap(long)]
        amount: String,
        #[clap(long = "recipient-address")]
        recipient_address: String,
        // strk or tdust
        #[clap(long = "payment-method")]
        payment_method: String,
        #[clap(long = "tx-hash")]
        tx_hash: Option<String>,
        #[clap(long)]
        seed: Option<String>,
    },
}

impl BridgeClientCommands {
    // Path and body of the request. Absent optional fields are left out so the
    // node reports what is missing.
    pub fn request(&self) -> (&'static str, Option<Value>) {
        match self {
            BridgeClientCommands::Health => (HEALTH_PATH, None),
            BridgeClientCommands::GenerateWallet { seed } => {
                let mut body = json!({});
                insert_optional(&mut body, "seed", seed);
                (GENERATE_WALLET_PATH, Some(body))
            }
            BridgeClientCommands::CheckBalance { seed } => {
                (CHECK_BALANCE_PATH, Some(json!({ "seed": seed })))
            }
            BridgeClientCommands::Swap {
                amount,
                midnight_address,
                direction,
                tx_hash,
                sender_address,
                recipient_address,
            } => {
                let mut body = json!({
                    "amount": amount,
                    "midnightAddress": midnight_address,
                    "direction": direction,
                });
                insert_optional(&mut body, "txHash", tx_hash);
                insert_optional(&mut body, "senderAddress", sender_address);
                insert_optional(&mut body, "recipientAddress", recipient_address);
                (SWAP_PATH, Some(body))
            }
            BridgeClientCommands::Payment {
                amount,
                recipient_address,
                payment_method,
                tx_hash,
                seed,
            } => {
                let mut body = json!({
                    "amount": amount,
                    "recipientAddress": recipient_address,
                    "paymentMethod": payment_method,
                });
                insert_optional(&mut body, "txHash", tx_hash);
                insert_optional(&mut body, "seed", seed);
                (PAYMENT_PATH, Some(body))
            }
        }
    }
}

fn insert_optional(body: &mut Value, key: &str, value: &Option<String>) {
    if let (Some(map), Some(value)) = (body.as_object_mut(), value) {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
}

pub struct BridgeApiClient {
    http_client: reqwest::Client,
    server_url: String,
}

impl BridgeApiClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    // Returns the response body on success, the node's error message otherwise.
    pub async fn send(&self, command: &BridgeClientCommands) -> anyhow::Result<Value> {
        let (path, body) = command.request();
        let url = format!("{}{path}", self.server_url);
        info!("Sending request to {url}");
        let request = match body {
            Some(body) => self.http_client.post(&url).json(&body),
            None => self.http_client.get(&url),
        };
        let response = request.send().await?;
        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Invalid response from {url} ({status}): {e}"))?;
        if !status.is_success() {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(anyhow!("Request failed with {status}: {error}"));
        }
        Ok(value)
    }
}
