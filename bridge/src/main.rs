// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use bridge_config::Config;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use strk_midnight_bridge::config::BridgeNodeConfig;
use strk_midnight_bridge::node::run_bridge_node;
use tokio::sync::oneshot;
use tracing::{info, warn};

const WALLET_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const FORCED_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version)]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // STARKNET_PRIVATE_KEY and friends may live in .env
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = BridgeNodeConfig::load(&args.config_path)?;

    // Init logging
    let (_guard, _filter_handle) = telemetry_subscribers::TelemetryConfig::new()
        .with_env()
        .init();
    info!("Loaded bridge node config from {:?}", args.config_path);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handles = run_bridge_node(config, prometheus::Registry::new(), async {
        let _ = shutdown_rx.await;
    })
    .await?;

    shutdown_signal().await;
    info!("Shutting down bridge node");
    let _ = shutdown_tx.send(());
    tokio::spawn(async {
        tokio::time::sleep(FORCED_EXIT_TIMEOUT).await;
        warn!("Graceful shutdown timed out, forcing exit");
        std::process::exit(1);
    });

    if let Err(e) = handles.server.await {
        warn!("Bridge server task failed: {e}");
    }
    handles.orchestrator.shutdown(WALLET_CLOSE_TIMEOUT).await;
    handles.metrics_server.abort();
    info!("Bridge node stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
