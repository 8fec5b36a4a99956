// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::BridgeNodeConfig,
    metrics::{start_metrics_server, BridgeMetrics},
    midnight_proxy_client::MidnightProxyBuilder,
    orchestrator::BridgeOrchestrator,
    server::{handler::BridgeRequestHandler, run_server},
    starknet_jsonrpc_client::StarknetJsonRpcClient,
};
use std::future::Future;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::info;

pub type BridgeNodeOrchestrator = BridgeOrchestrator<StarknetJsonRpcClient, MidnightProxyBuilder>;

pub struct BridgeNodeHandles {
    pub server: JoinHandle<()>,
    pub metrics_server: JoinHandle<()>,
    // Kept so the custodial wallet can be closed on shutdown
    pub orchestrator: Arc<BridgeNodeOrchestrator>,
}

pub async fn run_bridge_node(
    config: BridgeNodeConfig,
    prometheus_registry: prometheus::Registry,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<BridgeNodeHandles> {
    let metrics = Arc::new(BridgeMetrics::new(&prometheus_registry));
    let server_config = config.validate(metrics.clone()).await?;

    let metrics_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        server_config.metrics_port,
    );
    let metrics_server = start_metrics_server(metrics_address, prometheus_registry);

    let orchestrator = Arc::new(BridgeOrchestrator::new(
        server_config.starknet_client,
        server_config.midnight_client,
        server_config.orchestrator_settings,
        metrics.clone(),
    ));

    // Start Server
    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        server_config.server_listen_port,
    );
    info!("Starting bridge server on {socket_address}");
    let server = run_server(
        &socket_address,
        BridgeRequestHandler::new(orchestrator.clone()),
        metrics,
        shutdown,
    );
    Ok(BridgeNodeHandles {
        server,
        metrics_server,
        orchestrator,
    })
}
