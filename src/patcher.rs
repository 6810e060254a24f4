// Line-oriented patching of the node's config.toml
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use log::{info, warn, error};
use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

/// RPC listen address written by `init`, loopback only
pub const DEFAULT_RPC_LADDR: &str = r#"laddr = "tcp://127.0.0.1:26657""#;
/// P2P listen address written by `init`
pub const DEFAULT_P2P_LADDR: &str = r#"laddr = "tcp://0.0.0.0:26656""#;

const P2P_SECTION: &str = "p2p";
const EXTERNAL_ADDRESS_KEY: &str = "external_address";
const PERSISTENT_PEERS_KEY: &str = "persistent_peers";
const BACKUP_SUFFIX: &str = ".backup";

/// Inputs for one patch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchParameters {
    pub config_path: PathBuf,
    pub public_ip: String,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub persistent_peers: Vec<String>,
}

/// How a single key assignment was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEdit {
    /// An existing assignment had its value replaced
    Overwritten,
    /// A new line was inserted after its anchor
    Inserted,
    /// Neither the key nor its insertion anchor exists, nothing was written
    AnchorMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub rpc_laddr_replaced: usize,
    pub p2p_laddr_replaced: usize,
    pub external_address: KeyEdit,
    pub persistent_peers: KeyEdit,
}

/// A TOML-like file held as ordered lines. Only the handful of keys the
/// patcher knows about are ever touched; everything else round-trips as is.
/// Lines are written back with the terminator the source used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<String>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(|l| l.to_string()).collect(),
            line_ending: if text.contains("\r\n") { "\r\n" } else { "\n" },
            trailing_newline: text.ends_with('\n'),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.line_ending);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.line_ending);
        }
        out
    }

    /// Apply all four substitutions in a single pass over the original lines.
    ///
    /// Every line is classified once against its original content, so a line
    /// rewritten by the RPC step is never picked up again by the P2P step.
    pub fn apply(&mut self, params: &PatchParameters) -> PatchReport {
        let rpc_laddr = format!(r#"laddr = "tcp://0.0.0.0:{}""#, params.rpc_port);
        let p2p_laddr = format!(r#"laddr = "tcp://0.0.0.0:{}""#, params.p2p_port);
        let external_value = format!("tcp://{}:{}", params.public_ip, params.p2p_port);
        let peers_value = params.persistent_peers.join(",");

        let mut rpc_laddr_replaced = 0;
        let mut p2p_laddr_replaced = 0;
        let mut p2p_header: Option<usize> = None;
        let mut external_line: Option<usize> = None;
        let mut peers_line: Option<usize> = None;

        let mut out = Vec::with_capacity(self.lines.len() + 2);

        for line in &self.lines {
            let trimmed = line.trim();
            let indent = leading_whitespace(line);

            if trimmed == DEFAULT_RPC_LADDR {
                out.push(format!("{}{}", indent, rpc_laddr));
                rpc_laddr_replaced += 1;
                continue;
            }
            if trimmed == DEFAULT_P2P_LADDR {
                out.push(format!("{}{}", indent, p2p_laddr));
                p2p_laddr_replaced += 1;
                continue;
            }
            if p2p_header.is_none() && is_section_header(trimmed, P2P_SECTION) {
                p2p_header = Some(out.len());
                out.push(line.clone());
                continue;
            }

            match assignment_key(trimmed) {
                Some(EXTERNAL_ADDRESS_KEY) if external_line.is_none() => {
                    external_line = Some(out.len());
                    out.push(assignment(indent, EXTERNAL_ADDRESS_KEY, &external_value));
                }
                Some(PERSISTENT_PEERS_KEY) if peers_line.is_none() => {
                    peers_line = Some(out.len());
                    out.push(assignment(indent, PERSISTENT_PEERS_KEY, &peers_value));
                }
                _ => out.push(line.clone()),
            }
        }

        let external_address = match (external_line, p2p_header) {
            (Some(_), _) => KeyEdit::Overwritten,
            (None, Some(header)) => {
                let at = header + 1;
                out.insert(at, assignment("", EXTERNAL_ADDRESS_KEY, &external_value));
                external_line = Some(at);
                // shift the peers index if it sat below the insertion point
                if let Some(idx) = peers_line.as_mut() {
                    if *idx >= at {
                        *idx += 1;
                    }
                }
                KeyEdit::Inserted
            }
            (None, None) => KeyEdit::AnchorMissing,
        };

        let persistent_peers = match (peers_line, external_line) {
            (Some(_), _) => KeyEdit::Overwritten,
            (None, Some(anchor)) => {
                out.insert(anchor + 1, assignment("", PERSISTENT_PEERS_KEY, &peers_value));
                KeyEdit::Inserted
            }
            (None, None) => KeyEdit::AnchorMissing,
        };

        self.lines = out;

        PatchReport {
            rpc_laddr_replaced,
            p2p_laddr_replaced,
            external_address,
            persistent_peers,
        }
    }
}

/// Sibling backup path, e.g. `config.toml` -> `config.toml.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

/// Patch the config file in place, keeping a copy of the previous content
/// next to it. Fails without touching the filesystem if the file is absent.
pub fn patch_config(params: &PatchParameters) -> Result<PatchReport> {
    let path = &params.config_path;

    if !path.is_file() {
        error!("❌ Config file not found: {}", path.display());
        error!("   Run node initialization first so the config directory exists");
        return Err(BootstrapError::ConfigFileMissing(path.clone()));
    }

    let backup = backup_path(path);
    fs::copy(path, &backup)?;
    info!("💾 Backed up {} to {}", path.display(), backup.display());

    let text = fs::read_to_string(path)?;
    let mut document = ConfigDocument::parse(&text);
    let report = document.apply(params);
    fs::write(path, document.render())?;

    info!(
        "🔧 Patched {}: rpc laddr x{}, p2p laddr x{}, external_address {:?}, persistent_peers {:?}",
        path.display(),
        report.rpc_laddr_replaced,
        report.p2p_laddr_replaced,
        report.external_address,
        report.persistent_peers,
    );
    if report.external_address == KeyEdit::AnchorMissing {
        warn!("⚠️  No [p2p] section in {}, external_address was not set", path.display());
    }
    if report.persistent_peers == KeyEdit::AnchorMissing {
        warn!("⚠️  No anchor for persistent_peers in {}, peers were not set", path.display());
    }

    Ok(report)
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn is_section_header(trimmed: &str, name: &str) -> bool {
    if trimmed.starts_with("[[") {
        return false;
    }
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|inner| inner.trim() == name)
        .unwrap_or(false)
}

fn assignment_key(trimmed: &str) -> Option<&str> {
    if trimmed.starts_with('#') || trimmed.starts_with('[') {
        return None;
    }
    trimmed.split_once('=').map(|(key, _)| key.trim())
}

fn assignment(indent: &str, key: &str, value: &str) -> String {
    format!(r#"{}{} = "{}""#, indent, key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FRESH_CONFIG: &str = r#"# node config
proxy_app = "tcp://127.0.0.1:26658"

[rpc]
laddr = "tcp://127.0.0.1:26657"
cors_allowed_origins = []

[p2p]
laddr = "tcp://0.0.0.0:26656"
seeds = ""
"#;

    fn params(path: PathBuf, peers: &[&str]) -> PatchParameters {
        PatchParameters {
            config_path: path,
            public_ip: "1.2.3.4".to_string(),
            rpc_port: 26657,
            p2p_port: 26656,
            persistent_peers: peers.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fresh_config_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, FRESH_CONFIG);

        let report = patch_config(&params(path.clone(), &["a@b:26656"])).unwrap();
        assert_eq!(report.rpc_laddr_replaced, 1);
        assert_eq!(report.p2p_laddr_replaced, 1);
        assert_eq!(report.external_address, KeyEdit::Inserted);
        assert_eq!(report.persistent_peers, KeyEdit::Inserted);

        let patched = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = patched.lines().collect();
        let p2p = lines.iter().position(|l| *l == "[p2p]").unwrap();

        assert_eq!(lines[4], r#"laddr = "tcp://0.0.0.0:26657""#);
        assert_eq!(lines[p2p + 1], r#"external_address = "tcp://1.2.3.4:26656""#);
        assert_eq!(lines[p2p + 2], r#"persistent_peers = "a@b:26656""#);
        assert_eq!(lines[p2p + 3], r#"laddr = "tcp://0.0.0.0:26656""#);
        assert!(!patched.contains(DEFAULT_RPC_LADDR));
        assert!(patched.ends_with('\n'));
    }

    #[test]
    fn test_custom_ports_replace_defaults() {
        let mut doc = ConfigDocument::parse(FRESH_CONFIG);
        let mut p = params(PathBuf::from("unused"), &[]);
        p.rpc_port = 36657;
        p.p2p_port = 36656;

        doc.apply(&p);
        let rendered = doc.render();

        assert!(rendered.contains(r#"laddr = "tcp://0.0.0.0:36657""#));
        assert!(rendered.contains(r#"laddr = "tcp://0.0.0.0:36656""#));
        assert!(rendered.contains(r#"external_address = "tcp://1.2.3.4:36656""#));
        assert!(rendered.contains(r#"persistent_peers = """#));
        assert!(!rendered.contains(DEFAULT_RPC_LADDR));
        assert!(!rendered.contains(DEFAULT_P2P_LADDR));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, FRESH_CONFIG);
        let p = params(path.clone(), &["a@b:26656", "c@d:26656"]);

        patch_config(&p).unwrap();
        let once = fs::read(&path).unwrap();
        let report = patch_config(&p).unwrap();
        let twice = fs::read(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(report.external_address, KeyEdit::Overwritten);
        assert_eq!(report.persistent_peers, KeyEdit::Overwritten);
    }

    #[test]
    fn test_existing_external_address_overwritten() {
        let config = "[p2p]\n  external_address = \"tcp://9.9.9.9:1\"\n  persistent_peers = \"\"\nladdr = \"tcp://0.0.0.0:26656\"\n";
        let mut doc = ConfigDocument::parse(config);

        let report = doc.apply(&params(PathBuf::from("unused"), &["x@y:26656"]));
        assert_eq!(report.external_address, KeyEdit::Overwritten);
        assert_eq!(report.persistent_peers, KeyEdit::Overwritten);

        let externals: Vec<&String> = doc
            .lines()
            .iter()
            .filter(|l| l.trim_start().starts_with(EXTERNAL_ADDRESS_KEY))
            .collect();
        assert_eq!(externals.len(), 1);
        assert_eq!(externals[0], r#"  external_address = "tcp://1.2.3.4:26656""#);
        assert_eq!(doc.lines()[2], r#"  persistent_peers = "x@y:26656""#);
    }

    #[test]
    fn test_empty_external_address_overwritten() {
        let config = "[p2p]\nexternal_address = \"\"\n";
        let mut doc = ConfigDocument::parse(config);
        doc.apply(&params(PathBuf::from("unused"), &["a@b:26656"]));

        assert_eq!(
            doc.lines(),
            &[
                "[p2p]".to_string(),
                r#"external_address = "tcp://1.2.3.4:26656""#.to_string(),
                r#"persistent_peers = "a@b:26656""#.to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_keys_first_match_wins() {
        let config = "[p2p]\nexternal_address = \"a\"\nexternal_address = \"b\"\n";
        let mut doc = ConfigDocument::parse(config);
        doc.apply(&params(PathBuf::from("unused"), &[]));

        assert_eq!(doc.lines()[1], r#"external_address = "tcp://1.2.3.4:26656""#);
        assert_eq!(doc.lines()[2], r#"persistent_peers = """#);
        assert_eq!(doc.lines()[3], r#"external_address = "b""#);
    }

    #[test]
    fn test_peers_below_insertion_point_stay_in_place() {
        let config = "[p2p]\nseeds = \"\"\npersistent_peers = \"old@peer:1\"\n";
        let mut doc = ConfigDocument::parse(config);
        let report = doc.apply(&params(PathBuf::from("unused"), &["new@peer:2"]));

        assert_eq!(report.external_address, KeyEdit::Inserted);
        assert_eq!(report.persistent_peers, KeyEdit::Overwritten);
        assert_eq!(doc.lines()[1], r#"external_address = "tcp://1.2.3.4:26656""#);
        assert_eq!(doc.lines()[3], r#"persistent_peers = "new@peer:2""#);
        assert_eq!(doc.lines().len(), 4);
    }

    #[test]
    fn test_missing_p2p_section_leaves_keys_absent() {
        let config = "[rpc]\nladdr = \"tcp://127.0.0.1:26657\"\n";
        let mut doc = ConfigDocument::parse(config);
        let report = doc.apply(&params(PathBuf::from("unused"), &["a@b:26656"]));

        assert_eq!(report.rpc_laddr_replaced, 1);
        assert_eq!(report.external_address, KeyEdit::AnchorMissing);
        assert_eq!(report.persistent_peers, KeyEdit::AnchorMissing);
        assert_eq!(doc.lines().len(), 2);
    }

    #[test]
    fn test_comments_are_not_keys() {
        let config = "[p2p]\n# external_address = \"\"\n";
        let mut doc = ConfigDocument::parse(config);
        let report = doc.apply(&params(PathBuf::from("unused"), &[]));

        assert_eq!(report.external_address, KeyEdit::Inserted);
        assert_eq!(doc.lines()[1], r#"external_address = "tcp://1.2.3.4:26656""#);
        assert_eq!(doc.lines()[3], "# external_address = \"\"");
    }

    #[test]
    fn test_missing_file_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let result = patch_config(&params(path.clone(), &[]));
        assert!(matches!(result, Err(BootstrapError::ConfigFileMissing(p)) if p == path));
        assert!(!path.exists());
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_backup_holds_most_recent_original() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, FRESH_CONFIG);
        let backup = dir.path().join("config.toml.backup");
        assert_eq!(backup_path(&path), backup);

        patch_config(&params(path.clone(), &[])).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), FRESH_CONFIG);

        let after_first = fs::read_to_string(&path).unwrap();
        patch_config(&params(path.clone(), &["a@b:26656"])).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), after_first);
    }

    #[test]
    fn test_render_preserves_missing_trailing_newline() {
        let doc = ConfigDocument::parse("a = 1\nb = 2");
        assert_eq!(doc.render(), "a = 1\nb = 2");
        assert_eq!(ConfigDocument::parse("").render(), "");
    }

    #[test]
    fn test_crlf_line_endings_survive_patch() {
        let dir = TempDir::new().unwrap();
        let crlf = FRESH_CONFIG.replace('\n', "\r\n");
        assert_eq!(ConfigDocument::parse(&crlf).render(), crlf);

        let path = write_config(&dir, &crlf);
        patch_config(&params(path.clone(), &[])).unwrap();

        let patched = fs::read_to_string(&path).unwrap();
        assert_eq!(patched.matches('\n').count(), patched.matches("\r\n").count());
        assert!(patched.contains("[p2p]\r\nexternal_address = \"tcp://1.2.3.4:26656\"\r\n"));
        assert!(patched.ends_with("\r\n"));
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), crlf);
    }
}
