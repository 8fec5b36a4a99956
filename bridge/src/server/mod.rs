// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::types::{
    BalanceResponse, CheckBalanceRequest, ErrorResponse, GenerateWalletRequest,
    GenerateWalletResponse, HealthResponse, PaymentRequest, PaymentResponse, SwapRequest,
    SwapResponse,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub mod handler;

use handler::BridgeRequestHandlerTrait;

pub const HEALTH_PATH: &str = "/health";
pub const GENERATE_WALLET_PATH: &str = "/api/generate-midnight-wallet";
pub const CHECK_BALANCE_PATH: &str = "/api/check-balance";
pub const SWAP_PATH: &str = "/api/swap";
pub const PAYMENT_PATH: &str = "/api/payment";

// Serves until `shutdown` resolves, then drains in-flight requests.
pub fn run_server(
    socket_address: &SocketAddr,
    handler: impl BridgeRequestHandlerTrait + Sync + Send + 'static,
    metrics: Arc<BridgeMetrics>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(socket_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind bridge server on {socket_address}: {e}");
                return;
            }
        };
        info!("Bridge server listening on {socket_address}");
        let router = make_router(Arc::new(handler), metrics);
        if let Err(e) = axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Bridge server stopped: {e}");
        }
    })
}

pub(crate) fn make_router(
    handler: Arc<impl BridgeRequestHandlerTrait + Sync + Send + 'static>,
    metrics: Arc<BridgeMetrics>,
) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(GENERATE_WALLET_PATH, post(handle_generate_wallet))
        .route(CHECK_BALANCE_PATH, post(handle_check_balance))
        .route(SWAP_PATH, post(handle_swap))
        .route(PAYMENT_PATH, post(handle_payment))
        .layer(CorsLayer::permissive())
        .with_state((handler, metrics))
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// Malformed bodies get the same error envelope as failed validation.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, BridgeError> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| BridgeError::InvalidRequest(rejection.body_text()))
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            info!("Received {} request", $type_);
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            let _inflight = $crate::metrics::InflightGuard::new(
                $metrics.requests_inflight.with_label_values(&[$type_]),
            );

            let result = $func.await;

            match &result {
                Ok(_) => {
                    info!("{} request succeeded", $type_);
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    info!("{} request failed: {}", $type_, e);
                    $metrics
                        .err_requests
                        .with_label_values(&[$type_, e.kind()])
                        .inc();
                }
            }
            result
        }
    };
}

async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

async fn handle_generate_wallet(
    State((handler, metrics)): State<(
        Arc<impl BridgeRequestHandlerTrait + Sync + Send>,
        Arc<BridgeMetrics>,
    )>,
    payload: Result<Json<GenerateWalletRequest>, JsonRejection>,
) -> Result<Json<GenerateWalletResponse>, BridgeError> {
    let future = async {
        let request = body(payload)?;
        handler.handle_generate_wallet(request).await
    };
    with_metrics!(metrics.clone(), "generate_wallet", future).await
}

async fn handle_check_balance(
    State((handler, metrics)): State<(
        Arc<impl BridgeRequestHandlerTrait + Sync + Send>,
        Arc<BridgeMetrics>,
    )>,
    payload: Result<Json<CheckBalanceRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, BridgeError> {
    let future = async {
        let request = body(payload)?;
        handler.handle_check_balance(request).await
    };
    with_metrics!(metrics.clone(), "check_balance", future).await
}

async fn handle_swap(
    State((handler, metrics)): State<(
        Arc<impl BridgeRequestHandlerTrait + Sync + Send>,
        Arc<BridgeMetrics>,
    )>,
    payload: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<Json<SwapResponse>, BridgeError> {
    let future = async {
        let request = body(payload)?;
        handler.handle_swap(request).await
    };
    with_metrics!(metrics.clone(), "swap", future).await
}

async fn handle_payment(
    State((handler, metrics)): State<(
        Arc<impl BridgeRequestHandlerTrait + Sync + Send>,
        Arc<BridgeMetrics>,
    )>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, BridgeError> {
    let future = async {
        let request = body(payload)?;
        handler.handle_payment(request).await
    };
    with_metrics!(metrics.clone(), "payment", future).await
}
