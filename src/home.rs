// On-disk layout owned by the node binary
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

/// The node's home directory. This tool only checks for files here and
/// writes `config.toml`; everything else belongs to the node binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHome {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub genesis_path: PathBuf,
    pub data_dir: PathBuf,
}

#[derive(Deserialize)]
struct GenesisHeader {
    chain_id: String,
}

impl NodeHome {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let config_dir = root.join("config");
        Self {
            config_path: config_dir.join("config.toml"),
            genesis_path: config_dir.join("genesis.json"),
            data_dir: root.join("data"),
            root,
        }
    }

    /// Genesis presence is the only readiness signal
    pub fn is_initialized(&self) -> bool {
        self.genesis_path.is_file()
    }

    pub fn genesis_chain_id(&self) -> Result<String> {
        let raw = fs::read(&self.genesis_path)?;
        let header: GenesisHeader = serde_json::from_slice(&raw)?;
        Ok(header.chain_id)
    }

    pub fn verify_chain_id(&self, expected: &str) -> Result<()> {
        let found = self.genesis_chain_id()?;
        if found != expected {
            return Err(BootstrapError::GenesisMismatch {
                expected: expected.to_string(),
                found,
            });
        }
        Ok(())
    }
}

/// Resolve a binary name the way a shell would. Names containing a path
/// separator are checked directly, bare names are searched on `PATH`.
pub fn resolve_binary(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let home = NodeHome::new("/data/.tmp-cintarad");
        assert_eq!(home.config_path, PathBuf::from("/data/.tmp-cintarad/config/config.toml"));
        assert_eq!(home.genesis_path, PathBuf::from("/data/.tmp-cintarad/config/genesis.json"));
        assert_eq!(home.data_dir, PathBuf::from("/data/.tmp-cintarad/data"));
    }

    #[test]
    fn test_initialized_only_with_genesis() {
        let dir = TempDir::new().unwrap();
        let home = NodeHome::new(dir.path());
        assert!(!home.is_initialized());

        fs::create_dir_all(home.config_path.parent().unwrap()).unwrap();
        fs::write(&home.config_path, "").unwrap();
        assert!(!home.is_initialized());

        fs::write(&home.genesis_path, "not even json").unwrap();
        assert!(home.is_initialized());
    }

    #[test]
    fn test_verify_chain_id() {
        let dir = TempDir::new().unwrap();
        let home = NodeHome::new(dir.path());
        fs::create_dir_all(home.genesis_path.parent().unwrap()).unwrap();
        fs::write(&home.genesis_path, r#"{"chain_id":"cintara_11001-1","app_state":{}}"#).unwrap();

        assert_eq!(home.genesis_chain_id().unwrap(), "cintara_11001-1");
        assert!(home.verify_chain_id("cintara_11001-1").is_ok());
        assert!(matches!(
            home.verify_chain_id("other-1"),
            Err(BootstrapError::GenesisMismatch { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_binary() {
        use std::os::unix::fs::PermissionsExt;

        assert!(resolve_binary("sh").is_some());
        assert!(resolve_binary("definitely-not-a-real-binary-name").is_none());
        assert!(resolve_binary("").is_none());

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("node");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(resolve_binary(script.to_str().unwrap()).is_none());

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(resolve_binary(script.to_str().unwrap()), Some(script));
    }
}
