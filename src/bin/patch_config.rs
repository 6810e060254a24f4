// Positional config patcher, drop-in for the old update-config script
use clap::Parser;
use std::path::PathBuf;

use cintara_bootstrap::config::parse_peers;
use cintara_bootstrap::patcher::{patch_config, PatchParameters};

#[derive(Parser)]
#[command(name = "patch-config")]
#[command(about = "Point a node's config.toml at its public address and peers")]
struct Cli {
    config_path: PathBuf,
    public_ip: String,
    rpc_port: u16,
    p2p_port: u16,
    /// Comma separated id@host:port list
    #[arg(long, env = "PERSISTENT_PEERS", default_value = "")]
    peers: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    println!("🔧 Updating {}", cli.config_path.display());

    let report = patch_config(&PatchParameters {
        config_path: cli.config_path,
        public_ip: cli.public_ip.clone(),
        rpc_port: cli.rpc_port,
        p2p_port: cli.p2p_port,
        persistent_peers: parse_peers(&cli.peers),
    })?;

    println!("✅ RPC listening on 0.0.0.0:{}", cli.rpc_port);
    println!("✅ P2P listening on 0.0.0.0:{}", cli.p2p_port);
    println!("📡 External address: tcp://{}:{} ({:?})", cli.public_ip, cli.p2p_port, report.external_address);
    println!("👥 Persistent peers: {:?}", report.persistent_peers);

    Ok(())
}
