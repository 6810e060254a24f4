use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::home::NodeHome;

pub const DEFAULT_CHAIN_ID: &str = "cintara_11001-1";
pub const DEFAULT_MONIKER: &str = "cintara-node";
pub const DEFAULT_HOME: &str = "/data/.tmp-cintarad";
pub const DEFAULT_NODE_BINARY: &str = "cintarad";
pub const DEFAULT_SETUP_PROGRAM: &str = "/opt/cintara-testnet-script/cintara_ubuntu_node.sh";
pub const DEFAULT_RPC_PORT: u16 = 26657;
pub const DEFAULT_P2P_PORT: u16 = 26656;
pub const DEFAULT_GRPC_PORT: u16 = 9090;
pub const DEFAULT_API_PORT: u16 = 1317;
pub const DEFAULT_SETUP_TIMEOUT_SECS: u64 = 600;

/// What the supervisor falls back to once bootstrapping has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Replace the process with an interactive shell for manual remediation
    Shell,
    /// Serve a static status response on the RPC port
    Placeholder,
}

/// Runtime configuration for one supervisor run, built once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub home: PathBuf,
    pub chain_id: String,
    pub moniker: String,
    #[serde(skip_serializing, default)]
    pub keyring_passphrase: String,
    pub node_binary: String,
    pub setup_program: PathBuf,
    pub setup_args: Vec<String>,
    pub setup_timeout_secs: u64,
    pub public_ip: Option<String>,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub grpc_port: u16,
    pub api_port: u16,
    pub persistent_peers: Vec<String>,
    pub fallback: FallbackMode,
    pub shell: PathBuf,
    pub verify_genesis: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(DEFAULT_HOME),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            moniker: DEFAULT_MONIKER.to_string(),
            keyring_passphrase: String::new(),
            node_binary: DEFAULT_NODE_BINARY.to_string(),
            setup_program: PathBuf::from(DEFAULT_SETUP_PROGRAM),
            setup_args: Vec::new(),
            setup_timeout_secs: DEFAULT_SETUP_TIMEOUT_SECS,
            public_ip: None,
            rpc_port: DEFAULT_RPC_PORT,
            p2p_port: DEFAULT_P2P_PORT,
            grpc_port: DEFAULT_GRPC_PORT,
            api_port: DEFAULT_API_PORT,
            persistent_peers: Vec::new(),
            fallback: FallbackMode::Placeholder,
            shell: PathBuf::from("/bin/bash"),
            verify_genesis: false,
        }
    }
}

impl BootstrapConfig {
    pub fn node_home(&self) -> NodeHome {
        NodeHome::new(&self.home)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }
}

/// Split a comma separated peer list, dropping empty entries
pub fn parse_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peers() {
        let peers = parse_peers(" abc@10.0.0.1:26656, ,def@node.example:26656,");
        assert_eq!(peers, vec!["abc@10.0.0.1:26656", "def@node.example:26656"]);
        assert!(parse_peers("").is_empty());
    }

    #[test]
    fn test_passphrase_not_serialized() {
        let config = BootstrapConfig {
            keyring_passphrase: "hunter2".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains(DEFAULT_CHAIN_ID));
    }
}
