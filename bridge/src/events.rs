// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Starknet transaction receipts and the ERC-20 `Transfer` events of the STRK
//! contract, as returned by `starknet_getTransactionReceipt`.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{felt_to_hex, format_units, STRK_DECIMALS};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use starknet::macros::selector;

pub const TRANSFER_EVENT_SELECTOR: Felt = selector!("Transfer");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "REVERTED")]
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalityStatus {
    #[serde(rename = "RECEIVED")]
    Received,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "ACCEPTED_ON_L2")]
    AcceptedOnL2,
    #[serde(rename = "ACCEPTED_ON_L1")]
    AcceptedOnL1,
    // PRE_CONFIRMED and whatever newer nodes report
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarknetEvent {
    pub from_address: Felt,
    #[serde(default)]
    pub keys: Vec<Felt>,
    #[serde(default)]
    pub data: Vec<Felt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: Felt,
    pub execution_status: Option<ExecutionStatus>,
    pub finality_status: FinalityStatus,
    #[serde(default)]
    pub revert_reason: Option<String>,
    #[serde(default)]
    pub events: Vec<StarknetEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    // Not yet final, keep polling
    Pending,
    Final,
    Reverted(String),
}

impl TransactionReceipt {
    pub fn status(&self) -> TransactionStatus {
        match (self.execution_status, self.finality_status) {
            (Some(ExecutionStatus::Reverted), _) => TransactionStatus::Reverted(
                self.revert_reason
                    .clone()
                    .unwrap_or_else(|| "unknown reason".to_string()),
            ),
            (
                Some(ExecutionStatus::Succeeded),
                FinalityStatus::AcceptedOnL2 | FinalityStatus::AcceptedOnL1,
            ) => TransactionStatus::Final,
            _ => TransactionStatus::Pending,
        }
    }

    pub fn strk_transfers(&self, token: &Felt) -> Vec<StrkTransfer> {
        self.events
            .iter()
            .filter(|event| &event.from_address == token)
            .filter_map(StrkTransfer::try_from_event)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrkTransfer {
    pub from: Felt,
    pub to: Felt,
    // wei. Transfers above u128::MAX are not representable and never match.
    pub value: u128,
}

impl StrkTransfer {
    pub fn try_from_event(event: &StarknetEvent) -> Option<Self> {
        if event.keys.first() != Some(&TRANSFER_EVENT_SELECTOR) {
            return None;
        }
        match (event.keys.as_slice(), event.data.as_slice()) {
            // Cairo 1: from and to are indexed
            ([_, from, to], [low, high, ..]) => Some(Self {
                from: *from,
                to: *to,
                value: u256_to_u128(low, high)?,
            }),
            // Cairo 0: everything lives in data
            ([_], [from, to, low, high, ..]) => Some(Self {
                from: *from,
                to: *to,
                value: u256_to_u128(low, high)?,
            }),
            _ => None,
        }
    }
}

fn u256_to_u128(low: &Felt, high: &Felt) -> Option<u128> {
    if *high != Felt::ZERO {
        return None;
    }
    u128::try_from(*low).ok()
}

/// Returns the transfer in `receipt` that pays exactly `amount` wei of `token`
/// to `recipient`, optionally coming from `sender`.
pub fn find_matching_transfer(
    receipt: &TransactionReceipt,
    token: &Felt,
    recipient: &Felt,
    amount: u128,
    sender: Option<&Felt>,
) -> BridgeResult<StrkTransfer> {
    let to_recipient: Vec<StrkTransfer> = receipt
        .strk_transfers(token)
        .into_iter()
        .filter(|transfer| &transfer.to == recipient)
        .collect();
    if to_recipient.is_empty() {
        return Err(BridgeError::TransferVerificationFailed(format!(
            "no STRK transfer to {} found in transaction {}",
            felt_to_hex(recipient),
            felt_to_hex(&receipt.transaction_hash)
        )));
    }
    let with_amount: Vec<&StrkTransfer> =
        to_recipient.iter().filter(|t| t.value == amount).collect();
    let Some(first) = with_amount.first() else {
        let found = to_recipient
            .iter()
            .map(|t| format_units(t.value, STRK_DECIMALS, STRK_DECIMALS as usize))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(BridgeError::TransferVerificationFailed(format!(
            "expected {} STRK, found {}",
            format_units(amount, STRK_DECIMALS, STRK_DECIMALS as usize),
            found
        )));
    };
    let Some(sender) = sender else {
        return Ok((*first).clone());
    };
    with_amount
        .iter()
        .find(|t| &t.from == sender)
        .map(|t| (*t).clone())
        .ok_or_else(|| {
            BridgeError::TransferVerificationFailed(format!(
                "transfer sent by {}, expected {}",
                felt_to_hex(&first.from),
                felt_to_hex(sender)
            ))
        })
}
