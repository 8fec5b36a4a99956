// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

// Async JSON-RPC client for Starknet nodes. Reads go through plain JSON-RPC,
// only invocations from the custodial account are signed with starknet-rs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use starknet::accounts::{Account, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::{Call, Felt};
use starknet::macros::selector;
use starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use starknet::signers::{LocalWallet, SigningKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

use crate::error::{BridgeError, BridgeResult};
use crate::events::TransactionReceipt;
use crate::starknet_client::StarknetClientInner;
use crate::types::felt_to_hex;

// Starknet JSON-RPC error code for an unknown transaction hash
const TXN_HASH_NOT_FOUND: i64 = 29;

type CustodialAccount = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("{0}")]
    Transport(String),
}

impl From<CallError> for BridgeError {
    fn from(e: CallError) -> Self {
        BridgeError::StarknetRpcError(e.to_string())
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        CallError::Transport(e.to_string())
    }
}

#[derive(Clone)]
struct SignerConfig {
    address: Felt,
    private_key: Felt,
}

#[derive(Clone)]
pub struct StarknetJsonRpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: Arc<AtomicU64>,
    signer: Option<SignerConfig>,
    // Built on first transfer, needs the chain id
    account: Arc<OnceCell<CustodialAccount>>,
}

impl StarknetJsonRpcClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            request_id: Arc::new(AtomicU64::new(1)),
            signer: None,
            account: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_signer(mut self, address: Felt, private_key: Felt) -> Self {
        self.signer = Some(SignerConfig {
            address,
            private_key,
        });
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Transport(format!(
                "HTTP error: {status} - {}",
                response.text().await?
            )));
        }

        let response_text = response.text().await?;
        let rpc_response: JsonRpcResponse = serde_json::from_str(&response_text)
            .map_err(|e| CallError::Transport(format!("Invalid response: {e}")))?;

        if let Some(error) = rpc_response.error {
            if error.code != TXN_HASH_NOT_FOUND {
                tracing::warn!(
                    "RPC error - Request: {} | Response: {}",
                    serde_json::to_string(&request).unwrap_or_default(),
                    &response_text
                );
            }
            return Err(CallError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    async fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> BridgeResult<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| {
            BridgeError::StarknetRpcError(format!("Failed to decode {method} result: {e}"))
        })
    }

    async fn account(&self) -> BridgeResult<&CustodialAccount> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(BridgeError::StarknetAccountNotConfigured)?;
        self.account
            .get_or_try_init(|| async {
                let chain_id = self.get_chain_id().await?;
                let url = Url::parse(&self.rpc_url).map_err(|e| {
                    BridgeError::StarknetRpcError(format!("Invalid rpc url {}: {e}", self.rpc_url))
                })?;
                let provider = JsonRpcClient::new(HttpTransport::new(url));
                let wallet =
                    LocalWallet::from(SigningKey::from_secret_scalar(signer.private_key));
                Ok::<_, BridgeError>(SingleOwnerAccount::new(
                    provider,
                    wallet,
                    signer.address,
                    chain_id,
                    ExecutionEncoding::New,
                ))
            })
            .await
    }
}

#[async_trait]
impl StarknetClientInner for StarknetJsonRpcClient {
    async fn get_chain_id(&self) -> BridgeResult<Felt> {
        self.call_as("starknet_chainId", json!([])).await
    }

    async fn get_block_number(&self) -> BridgeResult<u64> {
        self.call_as("starknet_blockNumber", json!([])).await
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &Felt,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        match self
            .call(
                "starknet_getTransactionReceipt",
                json!([felt_to_hex(tx_hash)]),
            )
            .await
        {
            Ok(result) => serde_json::from_value(result).map(Some).map_err(|e| {
                BridgeError::StarknetRpcError(format!("Failed to decode receipt: {e}"))
            }),
            Err(CallError::Rpc {
                code: TXN_HASH_NOT_FOUND,
                ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_erc20_balance(&self, token: &Felt, account: &Felt) -> BridgeResult<u128> {
        let result: Vec<Felt> = self
            .call_as(
                "starknet_call",
                json!([
                    {
                        "contract_address": felt_to_hex(token),
                        "entry_point_selector": felt_to_hex(&selector!("balanceOf")),
                        "calldata": [felt_to_hex(account)],
                    },
                    "latest"
                ]),
            )
            .await?;
        let [low, high] = result.as_slice() else {
            return Err(BridgeError::StarknetRpcError(format!(
                "Unexpected balanceOf result: {result:?}"
            )));
        };
        if *high != Felt::ZERO {
            return Err(BridgeError::StarknetRpcError(format!(
                "balance of {} does not fit in u128",
                felt_to_hex(account)
            )));
        }
        u128::try_from(*low).map_err(|_| {
            BridgeError::StarknetRpcError(format!(
                "balance of {} does not fit in u128",
                felt_to_hex(account)
            ))
        })
    }

    async fn transfer_erc20(
        &self,
        token: &Felt,
        recipient: &Felt,
        amount: u128,
    ) -> BridgeResult<Felt> {
        let account = self.account().await?;
        let call = Call {
            to: *token,
            selector: selector!("transfer"),
            // u256 as (low, high)
            calldata: vec![*recipient, Felt::from(amount), Felt::ZERO],
        };
        let result = account
            .execute_v3(vec![call])
            .send()
            .await
            .map_err(|e| BridgeError::StarknetRpcError(format!("STRK transfer failed: {e}")))?;
        Ok(result.transaction_hash)
    }
}
