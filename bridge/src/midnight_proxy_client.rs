// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

// Client for the midnight-wallet-proxy subprocess. The Midnight wallet SDK
// lives in the proxy, one proxy process per wallet. Requests and responses
// are single-line JSON objects over stdin/stdout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::midnight_client::{MidnightWalletBuilder, MidnightWalletInner, WalletState};
use crate::types::WalletSeed;

pub const DEFAULT_PROXY_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MidnightNetworkConfig {
    // GraphQL endpoint of the indexer
    pub indexer: String,
    pub indexer_ws: String,
    pub proof_server: String,
    pub node: String,
    pub network_id: String,
}

impl MidnightNetworkConfig {
    pub fn testnet() -> Self {
        Self {
            indexer: "https://indexer.testnet-02.midnight.network/api/v1/graphql".to_string(),
            indexer_ws: "wss://indexer.testnet-02.midnight.network/api/v1/graphql/ws"
                .to_string(),
            proof_server: "https://lace-dev.proof-pub.stg.midnight.tools".to_string(),
            node: "https://rpc.testnet-02.midnight.network".to_string(),
            network_id: "TestNet".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "method", content = "params")]
enum ProxyRequest<'a> {
    Build {
        seed: &'a str,
        indexer: &'a str,
        indexer_ws: &'a str,
        proof_server: &'a str,
        node: &'a str,
        network_id: &'a str,
    },
    State,
    Transfer {
        receiver_address: &'a str,
        // micro-tDUST as a decimal string, u128 does not fit in a JSON number
        amount: String,
    },
    Close,
    Ping,
}

impl ProxyRequest<'_> {
    fn name(&self) -> &'static str {
        match self {
            ProxyRequest::Build { .. } => "build",
            ProxyRequest::State => "state",
            ProxyRequest::Transfer { .. } => "transfer",
            ProxyRequest::Close => "close",
            ProxyRequest::Ping => "ping",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProxyResponse {
    Success { result: Value },
    Error { error: String },
}

struct ProxyIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct MidnightProxyWallet {
    // Requests are serialized through this lock
    io: Mutex<ProxyIo>,
    // Spawned with kill_on_drop
    _child: Child,
    // Set once the proxy exited, its pipe failed or a request timed out.
    // A late response would desync the stream.
    broken: AtomicBool,
    request_timeout: Duration,
    bridge_metrics: Arc<BridgeMetrics>,
}

impl MidnightProxyWallet {
    pub fn spawn(
        program: &str,
        args: &[String],
        request_timeout: Duration,
        bridge_metrics: Arc<BridgeMetrics>,
    ) -> BridgeResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::MidnightWalletError(format!(
                    "Failed to spawn midnight-wallet-proxy {program}: {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::MidnightWalletError("Failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::MidnightWalletError("Failed to get stdout".into()))?;

        tracing::info!("Spawned midnight-wallet-proxy subprocess (pid: {:?})", child.id());

        Ok(Self {
            io: Mutex::new(ProxyIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            _child: child,
            broken: AtomicBool::new(false),
            request_timeout,
            bridge_metrics,
        })
    }

    async fn send_request(&self, req: ProxyRequest<'_>) -> BridgeResult<Value> {
        let name = req.name();
        self.bridge_metrics
            .midnight_proxy_requests
            .with_label_values(&[name])
            .inc();
        let result = self.send_request_inner(req).await;
        if let Err(e) = &result {
            self.bridge_metrics
                .midnight_proxy_errors
                .with_label_values(&[name])
                .inc();
            tracing::warn!("midnight-wallet-proxy {name} failed: {e}");
        }
        result
    }

    async fn send_request_inner(&self, req: ProxyRequest<'_>) -> BridgeResult<Value> {
        let mut request_json = serde_json::to_string(&req)
            .map_err(|e| BridgeError::Generic(format!("Failed to encode proxy request: {e}")))?;
        request_json.push('\n');

        let mut io = self.io.lock().await;
        if self.broken.load(Ordering::SeqCst) {
            return Err(BridgeError::MidnightWalletError(
                "midnight-wallet-proxy is unusable after a failed request".into(),
            ));
        }

        let exchange = async {
            io.stdin
                .write_all(request_json.as_bytes())
                .await
                .map_err(|e| proxy_io_error("write request", e))?;
            io.stdin
                .flush()
                .await
                .map_err(|e| proxy_io_error("flush request", e))?;
            let mut response_line = String::new();
            let read = io
                .stdout
                .read_line(&mut response_line)
                .await
                .map_err(|e| proxy_io_error("read response", e))?;
            if read == 0 {
                return Err(BridgeError::MidnightWalletError(
                    "midnight-wallet-proxy exited".into(),
                ));
            }
            Ok(response_line)
        };
        let outcome = tokio::time::timeout(self.request_timeout, exchange).await;
        let response_line = match outcome {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                self.broken.store(true, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                self.broken.store(true, Ordering::SeqCst);
                return Err(BridgeError::MidnightWalletError(format!(
                    "midnight-wallet-proxy did not answer {} within {}ms",
                    req.name(),
                    self.request_timeout.as_millis()
                )));
            }
        };

        let response: ProxyResponse = serde_json::from_str(response_line.trim()).map_err(|e| {
            BridgeError::MidnightWalletError(format!("Invalid proxy response: {e}"))
        })?;
        match response {
            ProxyResponse::Success { result } => Ok(result),
            ProxyResponse::Error { error } => Err(BridgeError::MidnightWalletError(error)),
        }
    }

    async fn build(&self, seed: &WalletSeed, network: &MidnightNetworkConfig) -> BridgeResult<()> {
        self.send_request(ProxyRequest::Build {
            seed: seed.expose(),
            indexer: &network.indexer,
            indexer_ws: &network.indexer_ws,
            proof_server: &network.proof_server,
            node: &network.node,
            network_id: &network.network_id,
        })
        .await?;
        Ok(())
    }

    pub async fn ping(&self) -> BridgeResult<()> {
        self.send_request(ProxyRequest::Ping).await?;
        Ok(())
    }
}

fn proxy_io_error(action: &str, e: std::io::Error) -> BridgeError {
    BridgeError::MidnightWalletError(format!("Failed to {action}: {e}"))
}

#[async_trait]
impl MidnightWalletInner for MidnightProxyWallet {
    async fn state(&self) -> BridgeResult<WalletState> {
        let result = self.send_request(ProxyRequest::State).await?;
        serde_json::from_value(result)
            .map_err(|e| BridgeError::MidnightWalletError(format!("Invalid wallet state: {e}")))
    }

    async fn transfer(&self, receiver_address: &str, amount_micro: u128) -> BridgeResult<String> {
        let result = self
            .send_request(ProxyRequest::Transfer {
                receiver_address,
                amount: amount_micro.to_string(),
            })
            .await?;
        serde_json::from_value(result)
            .map_err(|e| BridgeError::MidnightWalletError(format!("Invalid transaction id: {e}")))
    }

    async fn close(&self) -> BridgeResult<()> {
        self.send_request(ProxyRequest::Close).await?;
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MidnightProxyBuilder {
    program: String,
    args: Vec<String>,
    network: MidnightNetworkConfig,
    request_timeout: Duration,
    bridge_metrics: Arc<BridgeMetrics>,
}

impl MidnightProxyBuilder {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        network: MidnightNetworkConfig,
        request_timeout: Duration,
        bridge_metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            network,
            request_timeout,
            bridge_metrics,
        }
    }
}

#[async_trait]
impl MidnightWalletBuilder for MidnightProxyBuilder {
    type Wallet = MidnightProxyWallet;

    async fn build(&self, seed: &WalletSeed) -> BridgeResult<MidnightProxyWallet> {
        let wallet = MidnightProxyWallet::spawn(
            &self.program,
            &self.args,
            self.request_timeout,
            self.bridge_metrics.clone(),
        )?;
        wallet.build(seed, &self.network).await?;
        Ok(wallet)
    }
}
