// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The dotenv file holding the custodial Midnight wallet seed.

use anyhow::{anyhow, Context};
use std::path::Path;

use crate::types::WalletSeed;

pub const WALLET_SEED_KEY: &str = "WALLET_SEED";
pub const WALLET_ADDRESS_KEY: &str = "WALLET_ADDRESS";

const HEADER: &str = "# Midnight Testnet Configuration\n\
                      # This seed phrase will be used for automated deployment\n";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalletEnv {
    pub seed: Option<WalletSeed>,
    pub address: Option<String>,
}

// A missing file is an empty env.
pub fn read_wallet_env(path: &Path) -> anyhow::Result<WalletEnv> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(WalletEnv::default()),
        Err(e) => return Err(anyhow!("Failed to read {}: {e}", path.display())),
    };
    let mut env = WalletEnv::default();
    for item in iter {
        let (key, value) = item.with_context(|| format!("Failed to parse {}", path.display()))?;
        match key.as_str() {
            WALLET_SEED_KEY if !value.trim().is_empty() => {
                env.seed = Some(
                    WalletSeed::parse(&value)
                        .with_context(|| format!("Invalid {WALLET_SEED_KEY} in {}", path.display()))?,
                );
            }
            WALLET_ADDRESS_KEY if !value.trim().is_empty() => env.address = Some(value),
            _ => {}
        }
    }
    Ok(env)
}

// Replaces the file. Other keys it held are dropped.
pub fn write_wallet_env(
    path: &Path,
    seed: &WalletSeed,
    address: Option<&str>,
) -> anyhow::Result<()> {
    let mut content = format!("{HEADER}{WALLET_SEED_KEY}={}\n", seed.expose());
    if let Some(address) = address {
        content.push_str(&format!("{WALLET_ADDRESS_KEY}={address}\n"));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions of {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_env_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".env");
        assert_eq!(read_wallet_env(&path).unwrap(), WalletEnv::default());

        let seed = WalletSeed::generate();
        write_wallet_env(&path, &seed, Some("mn_shield-addr_test1abc")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Midnight Testnet Configuration\n"));

        let env = read_wallet_env(&path).unwrap();
        assert_eq!(env.seed, Some(seed.clone()));
        assert_eq!(env.address.as_deref(), Some("mn_shield-addr_test1abc"));

        write_wallet_env(&path, &seed, None).unwrap();
        assert_eq!(read_wallet_env(&path).unwrap().address, None);
    }

    #[test]
    fn test_quoted_seed_and_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let seed = WalletSeed::generate();
        std::fs::write(
            &path,
            format!(
                "STARKNET_PRIVATE_KEY=0x1\n# comment\nWALLET_SEED=\"{}\"\nWALLET_ADDRESS=\n",
                seed.expose()
            ),
        )
        .unwrap();
        let env = read_wallet_env(&path).unwrap();
        assert_eq!(env.seed, Some(seed));
        assert_eq!(env.address, None);

        std::fs::write(&path, "WALLET_SEED=nothex\n").unwrap();
        assert!(read_wallet_env(&path).is_err());
    }
}
