// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Config file handling shared by the bridge node and the bridge cli.

use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

// Configs are stored as YAML when the file extension says so, JSON otherwise.
pub trait Config: Serialize + DeserializeOwned {
    fn persisted(self, path: &Path) -> PersistedConfig<Self>
    where
        Self: Sized,
    {
        PersistedConfig {
            inner: self,
            path: path.to_path_buf(),
        }
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;
        Ok(())
    }
}

pub struct PersistedConfig<C> {
    inner: C,
    path: PathBuf,
}

impl<C: Config> PersistedConfig<C> {
    pub fn read(&self) -> Result<C> {
        C::load(&self.path)
    }

    pub fn save(&self) -> Result<()> {
        self.inner.save(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub mod local_ip_utils {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

    // Asks the OS for a free port. The port is released before returning, so
    // it is only a best effort for tests.
    pub fn get_available_port(host: &IpAddr) -> u16 {
        TcpListener::bind(SocketAddr::new(*host, 0))
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .unwrap_or_else(|e| panic!("Failed to find an available port on {host}: {e}"))
    }

    pub fn localhost_for_testing() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct TestConfig {
        listen_port: u16,
        rpc_url: String,
    }

    impl Config for TestConfig {}

    #[test]
    fn test_yaml_and_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = TestConfig {
            listen_port: 3001,
            rpc_url: "http://127.0.0.1:5050".to_string(),
        };
        for name in ["config.yaml", "config.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(TestConfig::load(&path).unwrap(), config);
        }

        let yaml = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(yaml.contains("listen-port: 3001"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TestConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_persisted_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yml");
        let persisted = TestConfig {
            listen_port: 1,
            rpc_url: "x".to_string(),
        }
        .persisted(&path);
        persisted.save().unwrap();
        assert_eq!(persisted.read().unwrap().listen_port, 1);
        assert_eq!(persisted.path(), path.as_path());
    }
}
