// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::config::BridgeNodeConfig;
use crate::types::WalletSeed;
use crate::wallet_env::{read_wallet_env, write_wallet_env};
use anyhow::anyhow;
use bridge_config::Config;
use std::path::Path;

// Write a bridge node config template with testnet defaults.
pub fn generate_bridge_node_config_and_write_to_file(path: &Path) -> Result<(), anyhow::Error> {
    BridgeNodeConfig::template().save(path)
}

// Generate a custodial wallet seed and write it to the dotenv file at `path`.
// An existing seed is never replaced unless `overwrite` is set.
pub fn generate_wallet_seed_and_write_to_file(
    path: &Path,
    overwrite: bool,
) -> Result<WalletSeed, anyhow::Error> {
    if !overwrite && read_wallet_env(path)?.seed.is_some() {
        return Err(anyhow!(
            "{} already holds a wallet seed, pass --overwrite to replace it",
            path.display()
        ));
    }
    let seed = WalletSeed::generate();
    write_wallet_env(path, &seed, None)?;
    Ok(seed)
}
