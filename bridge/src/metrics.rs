// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

pub const METRICS_ROUTE: &str = "/metrics";

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0, 180.0,
];

#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) starknet_rpc_queries: IntCounterVec,
    pub(crate) starknet_rpc_errors: IntCounterVec,
    pub(crate) strk_transfers_sent: IntCounter,
    pub(crate) confirmation_wait_latency: HistogramVec,

    pub(crate) midnight_proxy_requests: IntCounterVec,
    pub(crate) midnight_proxy_errors: IntCounterVec,
    pub(crate) tdust_transfers_sent: IntCounter,
    pub(crate) custodial_tdust_balance: IntGauge,
    pub(crate) deposits_ignored: IntCounter,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            requests_received: register_int_counter_vec_with_registry!(
                "bridge_requests_received",
                "Total number of requests received by type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "bridge_requests_ok",
                "Total number of ok requests by type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "bridge_err_requests",
                "Total number of erred requests by type and error kind",
                &["type", "kind"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "bridge_requests_inflight",
                "Total number of inflight requests by type",
                &["type"],
                registry,
            )
            .unwrap(),
            starknet_rpc_queries: register_int_counter_vec_with_registry!(
                "bridge_starknet_rpc_queries",
                "Total number of Starknet rpc queries by method",
                &["method"],
                registry,
            )
            .unwrap(),
            starknet_rpc_errors: register_int_counter_vec_with_registry!(
                "bridge_starknet_rpc_errors",
                "Total number of failed Starknet rpc queries by method",
                &["method"],
                registry,
            )
            .unwrap(),
            strk_transfers_sent: register_int_counter_with_registry!(
                "bridge_strk_transfers_sent",
                "Total number of STRK transfers submitted by the custodial account",
                registry,
            )
            .unwrap(),
            confirmation_wait_latency: register_histogram_vec_with_registry!(
                "bridge_confirmation_wait_latency",
                "Seconds spent waiting for a transaction or deposit to land, by chain",
                &["chain"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            midnight_proxy_requests: register_int_counter_vec_with_registry!(
                "bridge_midnight_proxy_requests",
                "Total number of requests sent to Midnight wallet proxies by method",
                &["method"],
                registry,
            )
            .unwrap(),
            midnight_proxy_errors: register_int_counter_vec_with_registry!(
                "bridge_midnight_proxy_errors",
                "Total number of failed Midnight wallet proxy requests by method",
                &["method"],
                registry,
            )
            .unwrap(),
            tdust_transfers_sent: register_int_counter_with_registry!(
                "bridge_tdust_transfers_sent",
                "Total number of tDUST transfers submitted",
                registry,
            )
            .unwrap(),
            custodial_tdust_balance: register_int_gauge_with_registry!(
                "bridge_custodial_tdust_balance",
                "Last observed tDUST balance of the custodial wallet in micro-tDUST",
                registry,
            )
            .unwrap(),
            deposits_ignored: register_int_counter_with_registry!(
                "bridge_deposits_ignored",
                "Balance increases that did not match the expected deposit",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }

    pub(crate) fn observe_tdust_balance(&self, micro: u128) {
        self.custodial_tdust_balance
            .set(i64::try_from(micro).unwrap_or(i64::MAX));
    }
}

// Counts a request as in flight until dropped, also when the request future
// is dropped mid-way by a disconnecting client.
pub struct InflightGuard(IntGauge);

impl InflightGuard {
    pub fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub fn start_metrics_server(addr: SocketAddr, registry: Registry) -> JoinHandle<()> {
    tracing::info!("Starting metrics server on {addr}");
    let app = Router::new()
        .route(METRICS_ROUTE, get(metrics))
        .with_state(registry);
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to bind metrics server on {addr}: {e}");
                return;
            }
        };
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {e}");
        }
    })
}

async fn metrics(State(registry): State<Registry>) -> (StatusCode, String) {
    let metric_families = registry.gather();
    let mut buffer = vec![];
    match TextEncoder::new().encode(&metric_families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(text) => (StatusCode::OK, text),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unable to encode metrics: {e}"),
        ),
    }
}
