// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Deserializer, Serialize};
use starknet::core::types::Felt;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

// STRK is an 18 decimals ERC-20, amounts on chain are in wei.
pub const STRK_DECIMALS: u32 = 18;
// tDUST amounts on chain are in micro-tDUST.
pub const TDUST_DECIMALS: u32 = 6;

pub const SWAP_DIRECTION_STRK_TO_TDUST: &str = "strk-to-tdust";
pub const SWAP_DIRECTION_TDUST_TO_STRK: &str = "tdust-to-strk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapDirection {
    StrkToTDust,
    TDustToStrk,
}

impl SwapDirection {
    pub fn parse(value: &str) -> BridgeResult<Self> {
        match value {
            SWAP_DIRECTION_STRK_TO_TDUST => Ok(SwapDirection::StrkToTDust),
            SWAP_DIRECTION_TDUST_TO_STRK => Ok(SwapDirection::TDustToStrk),
            _ => Err(BridgeError::InvalidRequest(
                "Invalid direction. Must be 'strk-to-tdust' or 'tdust-to-strk'".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapDirection::StrkToTDust => SWAP_DIRECTION_STRK_TO_TDUST,
            SwapDirection::TDustToStrk => SWAP_DIRECTION_TDUST_TO_STRK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    Strk,
    TDust,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> BridgeResult<Self> {
        match value {
            "strk" => Ok(PaymentMethod::Strk),
            "tdust" => Ok(PaymentMethod::TDust),
            _ => Err(BridgeError::InvalidRequest(
                "Invalid paymentMethod. Must be 'strk' or 'tdust'".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Strk => "strk",
            PaymentMethod::TDust => "tdust",
        }
    }
}

// How long to wait for something to land on chain and how often to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollingConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

// Converts a positive decimal string into the integer unit of a token with
// `decimals` decimals. Digits past the token precision are dropped.
pub fn parse_units(value: &str, decimals: u32) -> BridgeResult<u128> {
    let invalid = || BridgeError::InvalidAmount(value.to_string());
    let trimmed = value.trim();
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (trimmed, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let scale = 10u128.checked_pow(decimals).ok_or_else(invalid)?;
    let whole = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u128>().map_err(|_| invalid())?
    };
    let mut frac_digits: String = frac_part.chars().take(decimals as usize).collect();
    while frac_digits.len() < decimals as usize {
        frac_digits.push('0');
    }
    let frac = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse::<u128>().map_err(|_| invalid())?
    };

    let units = whole
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(invalid)?;
    if units == 0 {
        return Err(BridgeError::InvalidAmount(format!(
            "{value} (amount must be positive)"
        )));
    }
    Ok(units)
}

// Renders an integer amount with exactly `precision` fractional digits
// (truncating), e.g. `format_units(1_500_000, 6, 6) == "1.500000"`.
pub fn format_units(units: u128, decimals: u32, precision: usize) -> String {
    let scale = 10u128.pow(decimals);
    let whole = units / scale;
    if precision == 0 {
        return whole.to_string();
    }
    let mut frac = format!("{:0width$}", units % scale, width = decimals as usize);
    frac.truncate(precision);
    while frac.len() < precision {
        frac.push('0');
    }
    format!("{whole}.{frac}")
}

// Like `format_units` but without trailing zeros, e.g. "1.5" or "12".
pub fn format_units_trimmed(units: u128, decimals: u32) -> String {
    let formatted = format_units(units, decimals, decimals as usize);
    if !formatted.contains('.') {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

pub fn format_tdust(micro: u128) -> String {
    format_units_trimmed(micro, TDUST_DECIMALS)
}

// An amount given by the user, valid on both chains at the fixed 1:1 rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapAmount {
    // As sent by the user, echoed back in responses
    pub display: String,
    pub strk_wei: u128,
    pub tdust_micro: u128,
}

impl SwapAmount {
    pub fn parse(value: &str) -> BridgeResult<Self> {
        Ok(Self {
            display: value.to_string(),
            strk_wei: parse_units(value, STRK_DECIMALS)?,
            tdust_micro: parse_units(value, TDUST_DECIMALS)?,
        })
    }
}

impl fmt::Display for SwapAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

// Hex encoded 32 byte seed of a Midnight wallet. Never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WalletSeed(String);

impl WalletSeed {
    pub const BYTES: usize = 32;

    pub fn generate() -> Self {
        let bytes: [u8; Self::BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    // Accepts the seed with or without one pair of surrounding double quotes,
    // which is how browsers tend to hand out JSON-stringified local storage.
    pub fn parse(raw: &str) -> BridgeResult<Self> {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed);
        let bytes = hex::decode(unquoted)
            .map_err(|e| BridgeError::InvalidWalletSeed(format!("seed is not hex: {e}")))?;
        if bytes.len() != Self::BYTES {
            return Err(BridgeError::InvalidWalletSeed(format!(
                "expected {} bytes, got {}",
                Self::BYTES,
                bytes.len()
            )));
        }
        Ok(Self(unquoted.to_ascii_lowercase()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WalletSeed(<redacted>)")
    }
}

pub fn parse_felt(value: &str) -> Option<Felt> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Felt::from_hex(value).ok()
}

pub fn parse_tx_hash(value: &str) -> BridgeResult<Felt> {
    parse_felt(value).ok_or_else(|| BridgeError::InvalidTxHash(value.to_string()))
}

pub fn parse_starknet_address(value: &str) -> BridgeResult<Felt> {
    parse_felt(value).ok_or_else(|| BridgeError::InvalidStarknetAddress(value.to_string()))
}

pub fn felt_to_hex(value: &Felt) -> String {
    format!("{:#x}", value)
}

// Amounts are usually sent as strings but a bare JSON number is accepted too.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

// Empty strings count as missing.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    pub midnight_address: Option<String>,
    pub direction: Option<String>,
    pub tx_hash: Option<String>,
    pub sender_address: Option<String>,
    // Payout address overriding `midnight_address`, used by payment links
    pub recipient_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedSwap {
    StrkToTDust {
        amount: SwapAmount,
        tx_hash: Felt,
        // txHash as sent by the caller, echoed back in the response
        raw_tx_hash: String,
        sender_address: Option<Felt>,
        midnight_address: String,
        payout_address: String,
    },
    TDustToStrk {
        amount: SwapAmount,
        midnight_address: String,
        starknet_recipient: Felt,
    },
}

impl ValidatedSwap {
    pub fn direction(&self) -> SwapDirection {
        match self {
            ValidatedSwap::StrkToTDust { .. } => SwapDirection::StrkToTDust,
            ValidatedSwap::TDustToStrk { .. } => SwapDirection::TDustToStrk,
        }
    }
}

impl SwapRequest {
    pub fn validate(&self) -> BridgeResult<ValidatedSwap> {
        let (Some(amount), Some(midnight_address), Some(direction)) = (
            present(&self.amount),
            present(&self.midnight_address),
            present(&self.direction),
        ) else {
            return Err(BridgeError::missing_fields(
                "Missing required fields: amount, midnightAddress, direction",
            ));
        };
        match SwapDirection::parse(direction)? {
            SwapDirection::StrkToTDust => {
                let tx_hash = present(&self.tx_hash).ok_or_else(|| {
                    BridgeError::missing_fields(
                        "Missing required field for strk-to-tdust swap: txHash",
                    )
                })?;
                let amount = SwapAmount::parse(amount)?;
                let raw_tx_hash = tx_hash.to_string();
                let tx_hash = parse_tx_hash(tx_hash)?;
                let sender_address = present(&self.sender_address)
                    .map(parse_starknet_address)
                    .transpose()?;
                let payout_address = present(&self.recipient_address)
                    .unwrap_or(midnight_address)
                    .to_string();
                Ok(ValidatedSwap::StrkToTDust {
                    amount,
                    tx_hash,
                    raw_tx_hash,
                    sender_address,
                    midnight_address: midnight_address.to_string(),
                    payout_address,
                })
            }
            SwapDirection::TDustToStrk => {
                let sender_address = present(&self.sender_address).ok_or_else(|| {
                    BridgeError::missing_fields(
                        "Missing required field for tdust-to-strk swap: senderAddress",
                    )
                })?;
                Ok(ValidatedSwap::TDustToStrk {
                    amount: SwapAmount::parse(amount)?,
                    midnight_address: midnight_address.to_string(),
                    starknet_recipient: parse_starknet_address(sender_address)?,
                })
            }
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    pub recipient_address: Option<String>,
    pub payment_method: Option<String>,
    pub tx_hash: Option<String>,
    pub seed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedPayment {
    Strk {
        amount: SwapAmount,
        tx_hash: Felt,
        raw_tx_hash: String,
        recipient_address: String,
    },
    TDust {
        amount: SwapAmount,
        seed: WalletSeed,
        recipient_address: String,
    },
}

impl ValidatedPayment {
    pub fn method(&self) -> PaymentMethod {
        match self {
            ValidatedPayment::Strk { .. } => PaymentMethod::Strk,
            ValidatedPayment::TDust { .. } => PaymentMethod::TDust,
        }
    }
}

impl PaymentRequest {
    pub fn validate(&self) -> BridgeResult<ValidatedPayment> {
        let (Some(amount), Some(recipient_address), Some(payment_method)) = (
            present(&self.amount),
            present(&self.recipient_address),
            present(&self.payment_method),
        ) else {
            return Err(BridgeError::missing_fields(
                "Missing required fields: amount, recipientAddress, paymentMethod",
            ));
        };
        match PaymentMethod::parse(payment_method)? {
            PaymentMethod::Strk => {
                let tx_hash = present(&self.tx_hash).ok_or_else(|| {
                    BridgeError::missing_fields("Missing required fields for STRK payment: txHash")
                })?;
                Ok(ValidatedPayment::Strk {
                    amount: SwapAmount::parse(amount)?,
                    tx_hash: parse_tx_hash(tx_hash)?,
                    raw_tx_hash: tx_hash.to_string(),
                    recipient_address: recipient_address.to_string(),
                })
            }
            PaymentMethod::TDust => {
                let seed = present(&self.seed).ok_or_else(|| {
                    BridgeError::missing_fields("Missing required field for tDUST payment: seed")
                })?;
                Ok(ValidatedPayment::TDust {
                    amount: SwapAmount::parse(amount)?,
                    seed: WalletSeed::parse(seed)?,
                    recipient_address: recipient_address.to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct GenerateWalletRequest {
    pub seed: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CheckBalanceRequest {
    pub seed: Option<String>,
}

impl CheckBalanceRequest {
    pub fn validate(&self) -> BridgeResult<WalletSeed> {
        let seed = present(&self.seed)
            .ok_or_else(|| BridgeError::missing_fields("Missing required field: seed"))?;
        WalletSeed::parse(seed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateWalletResponse {
    pub success: bool,
    pub midnight_address: Option<String>,
    // Only set when the bridge generated the seed itself
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub address: String,
    // micro-tDUST
    pub balance: String,
    pub formatted_balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub success: bool,
    pub message: String,
    pub strk_tx_hash: String,
    pub midnight_tx_id: Option<String>,
    pub amount: String,
    pub midnight_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strk_tx_hash: Option<String>,
    pub midnight_tx_id: String,
    pub amount: String,
    pub recipient_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
