// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    // Request is missing fields or carries an unknown enum value. The message
    // is returned to the caller verbatim.
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),
    #[error("Invalid Starknet address: {0}")]
    InvalidStarknetAddress(String),
    #[error("Invalid wallet seed: {0}")]
    InvalidWalletSeed(String),
    #[error("Insufficient tDUST balance. Required: {required} tDUST, Available: {available} tDUST")]
    InsufficientBalance { required: String, available: String },
    // The source chain transfer does not pay the bridge what was promised
    #[error("STRK transaction verification failed: {0}")]
    TransferVerificationFailed(String),
    #[error("Transaction not confirmed within {timeout_ms}ms")]
    TransactionNotConfirmed { tx_hash: String, timeout_ms: u128 },
    #[error("Transaction {tx_hash} reverted: {reason}")]
    TransactionReverted { tx_hash: String, reason: String },
    #[error("tDUST transaction not received within {timeout_ms}ms")]
    DepositNotReceived { timeout_ms: u128 },
    #[error("WALLET_SEED not found in .env file")]
    WalletSeedNotFound,
    #[error("STARKNET_PRIVATE_KEY not configured in environment")]
    StarknetAccountNotConfigured,
    #[error("Starknet RPC error: {0}")]
    StarknetRpcError(String),
    #[error("Midnight wallet error: {0}")]
    MidnightWalletError(String),
    #[error("{0}")]
    Generic(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn missing_fields(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    // Caller errors map to 400, everything the bridge failed to do maps to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidRequest(_)
            | BridgeError::InvalidAmount(_)
            | BridgeError::InvalidTxHash(_)
            | BridgeError::InvalidStarknetAddress(_)
            | BridgeError::InvalidWalletSeed(_)
            | BridgeError::InsufficientBalance { .. }
            | BridgeError::TransferVerificationFailed(_) => StatusCode::BAD_REQUEST,
            BridgeError::TransactionNotConfirmed { .. }
            | BridgeError::TransactionReverted { .. }
            | BridgeError::DepositNotReceived { .. }
            | BridgeError::WalletSeedNotFound
            | BridgeError::StarknetAccountNotConfigured
            | BridgeError::StarknetRpcError(_)
            | BridgeError::MidnightWalletError(_)
            | BridgeError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Label used by the error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::InvalidAmount(_) => "invalid_amount",
            BridgeError::InvalidTxHash(_) => "invalid_tx_hash",
            BridgeError::InvalidStarknetAddress(_) => "invalid_starknet_address",
            BridgeError::InvalidWalletSeed(_) => "invalid_wallet_seed",
            BridgeError::InsufficientBalance { .. } => "insufficient_balance",
            BridgeError::TransferVerificationFailed(_) => "transfer_verification_failed",
            BridgeError::TransactionNotConfirmed { .. } => "transaction_not_confirmed",
            BridgeError::TransactionReverted { .. } => "transaction_reverted",
            BridgeError::DepositNotReceived { .. } => "deposit_not_received",
            BridgeError::WalletSeedNotFound => "wallet_seed_not_found",
            BridgeError::StarknetAccountNotConfigured => "starknet_account_not_configured",
            BridgeError::StarknetRpcError(_) => "starknet_rpc_error",
            BridgeError::MidnightWalletError(_) => "midnight_wallet_error",
            BridgeError::Generic(_) => "generic",
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(e: anyhow::Error) -> Self {
        BridgeError::Generic(e.to_string())
    }
}
