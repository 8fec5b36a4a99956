// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mock Midnight wallets used in tests.

use crate::error::{BridgeError, BridgeResult};
use crate::midnight_client::{MidnightWalletBuilder, MidnightWalletInner, WalletState};
use crate::types::WalletSeed;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[allow(clippy::type_complexity)]
#[derive(Clone, Debug)]
pub struct MidnightMockWallet {
    address: String,
    balance: Arc<Mutex<u128>>,
    // Scripted results of the next balance reads, `balance` once drained
    balance_reads: Arc<Mutex<VecDeque<BridgeResult<u128>>>>,
    transfers: Arc<Mutex<Vec<(String, u128, String)>>>,
    transfer_error: Arc<Mutex<Option<BridgeError>>>,
    next_tx_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl MidnightMockWallet {
    pub fn new(address: impl Into<String>, balance: u128) -> Self {
        Self {
            address: address.into(),
            balance: Arc::new(Mutex::new(balance)),
            balance_reads: Default::default(),
            transfers: Default::default(),
            transfer_error: Default::default(),
            next_tx_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
            broken: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn push_balances(&self, balances: impl IntoIterator<Item = u128>) {
        self.balance_reads
            .lock()
            .unwrap()
            .extend(balances.into_iter().map(Ok));
    }

    pub fn push_balance_error(&self) {
        self.balance_reads
            .lock()
            .unwrap()
            .push_back(Err(BridgeError::MidnightWalletError(
                "indexer unavailable".into(),
            )));
    }

    pub fn set_transfer_error(&self, error: Option<BridgeError>) {
        *self.transfer_error.lock().unwrap() = error;
    }

    // (receiver, micro amount, tx id)
    pub fn transfers(&self) -> Vec<(String, u128, String)> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // A broken wallet fails every call, like a proxy that exited.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check_usable(&self) -> BridgeResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(BridgeError::MidnightWalletError(
                "midnight-wallet-proxy exited".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MidnightWalletInner for MidnightMockWallet {
    async fn state(&self) -> BridgeResult<WalletState> {
        self.check_usable()?;
        let balance = match self.balance_reads.lock().unwrap().pop_front() {
            Some(scripted) => scripted?,
            None => *self.balance.lock().unwrap(),
        };
        Ok(WalletState {
            address: self.address.clone(),
            balance,
        })
    }

    async fn transfer(&self, receiver_address: &str, amount_micro: u128) -> BridgeResult<String> {
        self.check_usable()?;
        if let Some(error) = self.transfer_error.lock().unwrap().clone() {
            return Err(error);
        }
        {
            let mut balance = self.balance.lock().unwrap();
            *balance = balance.checked_sub(amount_micro).ok_or_else(|| {
                BridgeError::MidnightWalletError("Insufficient funds".to_string())
            })?;
        }
        let tx_id = format!(
            "00000000{:08x}",
            self.next_tx_id.fetch_add(1, Ordering::SeqCst)
        );
        self.transfers.lock().unwrap().push((
            receiver_address.to_string(),
            amount_micro,
            tx_id.clone(),
        ));
        Ok(tx_id)
    }

    async fn close(&self) -> BridgeResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MidnightMockBuilder {
    wallets: Arc<Mutex<HashMap<String, MidnightMockWallet>>>,
    built: Arc<Mutex<Vec<MidnightMockWallet>>>,
    build_error: Arc<Mutex<Option<BridgeError>>>,
}

impl MidnightMockBuilder {
    // Wallet handed out for `seed`. Unknown seeds get an empty wallet.
    pub fn add_wallet(&self, seed: &WalletSeed, wallet: MidnightMockWallet) {
        self.wallets
            .lock()
            .unwrap()
            .insert(seed.expose().to_string(), wallet);
    }

    pub fn set_build_error(&self, error: Option<BridgeError>) {
        *self.build_error.lock().unwrap() = error;
    }

    pub fn built_wallets(&self) -> Vec<MidnightMockWallet> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl MidnightWalletBuilder for MidnightMockBuilder {
    type Wallet = MidnightMockWallet;

    async fn build(&self, seed: &WalletSeed) -> BridgeResult<MidnightMockWallet> {
        if let Some(error) = self.build_error.lock().unwrap().clone() {
            return Err(error);
        }
        let wallet = self
            .wallets
            .lock()
            .unwrap()
            .get(seed.expose())
            .cloned()
            .unwrap_or_else(|| {
                MidnightMockWallet::new(
                    format!("mn_shield-addr_test1{}", &seed.expose()[..16]),
                    0,
                )
            });
        self.built.lock().unwrap().push(wallet.clone());
        Ok(wallet)
    }
}
