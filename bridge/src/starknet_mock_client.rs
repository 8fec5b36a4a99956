// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mock implementation of the Starknet client.

use crate::error::{BridgeError, BridgeResult};
use crate::events::TransactionReceipt;
use crate::starknet_client::StarknetClientInner;
use async_trait::async_trait;
use starknet::core::types::Felt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// Mock client used in test environments.
#[allow(clippy::type_complexity)]
#[derive(Clone, Debug)]
pub struct StarknetMockClient {
    chain_id: Felt,
    block_number: Arc<AtomicU64>,
    // Responses are consumed in order, the last one sticks.
    receipts: Arc<Mutex<HashMap<Felt, VecDeque<BridgeResult<Option<TransactionReceipt>>>>>>,
    receipt_requests: Arc<Mutex<HashMap<Felt, u64>>>,
    balances: Arc<Mutex<HashMap<(Felt, Felt), u128>>>,
    transfer_error: Arc<Mutex<Option<BridgeError>>>,
    sent_transfers: Arc<Mutex<Vec<(Felt, Felt, u128, Felt)>>>,
    next_tx_hash: Arc<AtomicU64>,
}

impl Default for StarknetMockClient {
    fn default() -> Self {
        Self {
            chain_id: Felt::from_bytes_be_slice(b"SN_SEPOLIA"),
            block_number: Arc::new(AtomicU64::new(100)),
            receipts: Default::default(),
            receipt_requests: Default::default(),
            balances: Default::default(),
            transfer_error: Default::default(),
            sent_transfers: Default::default(),
            next_tx_hash: Arc::new(AtomicU64::new(0xf000)),
        }
    }
}

impl StarknetMockClient {
    pub fn add_receipt_response(
        &self,
        tx_hash: Felt,
        response: BridgeResult<Option<TransactionReceipt>>,
    ) {
        self.receipts
            .lock()
            .unwrap()
            .entry(tx_hash)
            .or_default()
            .push_back(response);
    }

    pub fn receipt_requests(&self, tx_hash: &Felt) -> u64 {
        self.receipt_requests
            .lock()
            .unwrap()
            .get(tx_hash)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_balance(&self, token: Felt, account: Felt, balance: u128) {
        self.balances
            .lock()
            .unwrap()
            .insert((token, account), balance);
    }

    pub fn set_transfer_error(&self, error: Option<BridgeError>) {
        *self.transfer_error.lock().unwrap() = error;
    }

    // (token, recipient, amount, tx hash)
    pub fn sent_transfers(&self) -> Vec<(Felt, Felt, u128, Felt)> {
        self.sent_transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl StarknetClientInner for StarknetMockClient {
    async fn get_chain_id(&self) -> BridgeResult<Felt> {
        Ok(self.chain_id)
    }

    async fn get_block_number(&self) -> BridgeResult<u64> {
        Ok(self.block_number.load(Ordering::SeqCst))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &Felt,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        *self
            .receipt_requests
            .lock()
            .unwrap()
            .entry(*tx_hash)
            .or_default() += 1;
        let mut receipts = self.receipts.lock().unwrap();
        match receipts.get_mut(tx_hash) {
            None => Ok(None),
            Some(responses) if responses.len() > 1 => responses.pop_front().unwrap(),
            Some(responses) => responses.front().cloned().unwrap_or(Ok(None)),
        }
    }

    async fn get_erc20_balance(&self, token: &Felt, account: &Felt) -> BridgeResult<u128> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(*token, *account))
            .copied()
            .unwrap_or(0))
    }

    async fn transfer_erc20(
        &self,
        token: &Felt,
        recipient: &Felt,
        amount: u128,
    ) -> BridgeResult<Felt> {
        if let Some(error) = self.transfer_error.lock().unwrap().clone() {
            return Err(error);
        }
        let tx_hash = Felt::from(self.next_tx_hash.fetch_add(1, Ordering::SeqCst));
        self.sent_transfers
            .lock()
            .unwrap()
            .push((*token, *recipient, amount, tx_hash));
        Ok(tx_hash)
    }
}
