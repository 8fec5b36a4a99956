// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use crate::midnight_client::MidnightWalletBuilder;
use crate::orchestrator::BridgeOrchestrator;
use crate::starknet_client::StarknetClientInner;
use crate::types::{
    felt_to_hex, format_units, BalanceResponse, CheckBalanceRequest, GenerateWalletRequest,
    GenerateWalletResponse, PaymentRequest, PaymentResponse, SwapRequest, SwapResponse,
    ValidatedPayment, ValidatedSwap, WalletSeed, TDUST_DECIMALS,
};
use async_trait::async_trait;
use axum::Json;
use std::sync::Arc;
use tap::TapFallible;
use tracing::{info, warn};

pub const SWAP_SUCCESS_MESSAGE: &str = "Swap completed successfully";
pub const PAYMENT_SUCCESS_MESSAGE: &str = "Payment completed successfully";

#[async_trait]
pub trait BridgeRequestHandlerTrait {
    // Derives the Midnight address of a seed, generating the seed if absent.
    async fn handle_generate_wallet(
        &self,
        request: GenerateWalletRequest,
    ) -> Result<Json<GenerateWalletResponse>, BridgeError>;

    async fn handle_check_balance(
        &self,
        request: CheckBalanceRequest,
    ) -> Result<Json<BalanceResponse>, BridgeError>;

    // Runs a swap in either direction and only returns once the payout is
    // submitted (strk-to-tdust) or final (tdust-to-strk).
    async fn handle_swap(&self, request: SwapRequest) -> Result<Json<SwapResponse>, BridgeError>;

    async fn handle_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<Json<PaymentResponse>, BridgeError>;
}

pub struct BridgeRequestHandler<S, B: MidnightWalletBuilder> {
    orchestrator: Arc<BridgeOrchestrator<S, B>>,
}

impl<S, B> BridgeRequestHandler<S, B>
where
    S: StarknetClientInner + 'static,
    B: MidnightWalletBuilder + 'static,
{
    pub fn new(orchestrator: Arc<BridgeOrchestrator<S, B>>) -> Self {
        Self { orchestrator }
    }
}

fn parse_optional_seed(seed: Option<&str>) -> BridgeResult<Option<WalletSeed>> {
    seed.map(str::trim)
        .filter(|seed| !seed.is_empty())
        .map(WalletSeed::parse)
        .transpose()
}

#[async_trait]
impl<S, B> BridgeRequestHandlerTrait for BridgeRequestHandler<S, B>
where
    S: StarknetClientInner + 'static,
    B: MidnightWalletBuilder + 'static,
{
    async fn handle_generate_wallet(
        &self,
        request: GenerateWalletRequest,
    ) -> Result<Json<GenerateWalletResponse>, BridgeError> {
        let seed = parse_optional_seed(request.seed.as_deref())?;
        let (midnight_address, generated_seed) = self.orchestrator.generate_wallet(seed).await;
        Ok(Json(GenerateWalletResponse {
            success: true,
            midnight_address,
            seed: generated_seed.map(|seed| seed.expose().to_string()),
        }))
    }

    async fn handle_check_balance(
        &self,
        request: CheckBalanceRequest,
    ) -> Result<Json<BalanceResponse>, BridgeError> {
        let seed = request.validate()?;
        let balance = self.orchestrator.check_balance(&seed).await?;
        Ok(Json(BalanceResponse {
            success: true,
            address: balance.address,
            balance: balance.balance.to_string(),
            formatted_balance: format_units(balance.balance, TDUST_DECIMALS, 6),
        }))
    }

    async fn handle_swap(&self, request: SwapRequest) -> Result<Json<SwapResponse>, BridgeError> {
        let swap = request.validate()?;
        let direction = swap.direction();
        let response = match swap {
            ValidatedSwap::StrkToTDust {
                amount,
                tx_hash,
                raw_tx_hash,
                sender_address,
                midnight_address: _,
                payout_address,
            } => {
                let midnight_tx_id = self
                    .orchestrator
                    .strk_to_tdust(&tx_hash, sender_address.as_ref(), &amount, &payout_address)
                    .await?;
                SwapResponse {
                    success: true,
                    message: SWAP_SUCCESS_MESSAGE.to_string(),
                    strk_tx_hash: raw_tx_hash,
                    midnight_tx_id: Some(midnight_tx_id),
                    amount: amount.display,
                    midnight_address: payout_address,
                }
            }
            ValidatedSwap::TDustToStrk {
                amount,
                midnight_address,
                starknet_recipient,
            } => {
                let strk_tx_hash = self
                    .orchestrator
                    .tdust_to_strk(&amount, &midnight_address, &starknet_recipient)
                    .await?;
                SwapResponse {
                    success: true,
                    message: SWAP_SUCCESS_MESSAGE.to_string(),
                    strk_tx_hash: felt_to_hex(&strk_tx_hash),
                    // The deposit is detected by balance, its tx id is unknown
                    midnight_tx_id: None,
                    amount: amount.display,
                    midnight_address,
                }
            }
        };
        info!(
            "Swap {} of {} completed, strk tx {}",
            direction.as_str(),
            response.amount,
            response.strk_tx_hash
        );
        Ok(Json(response))
    }

    async fn handle_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<Json<PaymentResponse>, BridgeError> {
        let payment = request.validate()?;
        let method = payment.method();
        let response = match payment {
            ValidatedPayment::Strk {
                amount,
                tx_hash,
                raw_tx_hash,
                recipient_address,
            } => {
                let midnight_tx_id = self
                    .orchestrator
                    .pay_with_strk(&tx_hash, &amount, &recipient_address)
                    .await?;
                PaymentResponse {
                    success: true,
                    message: PAYMENT_SUCCESS_MESSAGE.to_string(),
                    strk_tx_hash: Some(raw_tx_hash),
                    midnight_tx_id,
                    amount: amount.display,
                    recipient_address,
                }
            }
            ValidatedPayment::TDust {
                amount,
                seed,
                recipient_address,
            } => {
                let midnight_tx_id = self
                    .orchestrator
                    .pay_with_tdust(&seed, &amount, &recipient_address)
                    .await
                    .tap_err(|e| warn!("tDUST payment to {recipient_address} failed: {e}"))?;
                PaymentResponse {
                    success: true,
                    message: PAYMENT_SUCCESS_MESSAGE.to_string(),
                    strk_tx_hash: None,
                    midnight_tx_id,
                    amount: amount.display,
                    recipient_address,
                }
            }
        };
        info!(
            "Payment with {} of {} to {} completed: {}",
            method.as_str(),
            response.amount,
            response.recipient_address,
            response.midnight_tx_id
        );
        Ok(Json(response))
    }
}
