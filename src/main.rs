use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use log::info;

use cintara_bootstrap::config::{
    parse_peers, BootstrapConfig, FallbackMode, DEFAULT_API_PORT, DEFAULT_CHAIN_ID,
    DEFAULT_GRPC_PORT, DEFAULT_HOME, DEFAULT_MONIKER, DEFAULT_NODE_BINARY, DEFAULT_P2P_PORT,
    DEFAULT_RPC_PORT, DEFAULT_SETUP_PROGRAM, DEFAULT_SETUP_TIMEOUT_SECS,
};
use cintara_bootstrap::patcher::{patch_config, PatchParameters};
use cintara_bootstrap::placeholder::{PlaceholderServer, PlaceholderStatus};
use cintara_bootstrap::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "cintara-bootstrap")]
#[command(about = "Cintara node bootstrap, config patching and supervision")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the node home if needed, then exec the node
    Start(NodeArgs),
    /// Rewrite listen addresses and peers in config.toml
    Patch {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, env = "PUBLIC_IP")]
        public_ip: String,
        #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
        rpc_port: u16,
        #[arg(long, default_value_t = DEFAULT_P2P_PORT)]
        p2p_port: u16,
        #[arg(long, env = "PERSISTENT_PEERS")]
        peers: Option<String>,
    },
    /// Print the state of the node home as JSON
    Status(NodeArgs),
    /// Serve the degraded-mode status response on the RPC port
    Placeholder {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "started manually")]
        reason: String,
    },
}

#[derive(Args)]
struct NodeArgs {
    #[arg(long, env = "NODE_HOME", default_value = DEFAULT_HOME)]
    home: PathBuf,
    #[arg(long, env = "CHAIN_ID", default_value = DEFAULT_CHAIN_ID)]
    chain_id: String,
    #[arg(long, env = "MONIKER", default_value = DEFAULT_MONIKER)]
    moniker: String,
    #[arg(long, env = "KEYRING_PASSPHRASE", default_value = "", hide_env_values = true)]
    keyring_passphrase: String,
    #[arg(long, env = "NODE_BINARY", default_value = DEFAULT_NODE_BINARY)]
    node_binary: String,
    #[arg(long, env = "SETUP_PROGRAM", default_value = DEFAULT_SETUP_PROGRAM)]
    setup_program: PathBuf,
    /// Extra arguments passed to the setup program
    #[arg(long = "setup-arg")]
    setup_args: Vec<String>,
    #[arg(long, env = "SETUP_TIMEOUT_SECS", default_value_t = DEFAULT_SETUP_TIMEOUT_SECS)]
    setup_timeout_secs: u64,
    #[arg(long, env = "PUBLIC_IP")]
    public_ip: Option<String>,
    #[arg(long, env = "RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    rpc_port: u16,
    #[arg(long, env = "P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    p2p_port: u16,
    #[arg(long, env = "GRPC_PORT", default_value_t = DEFAULT_GRPC_PORT)]
    grpc_port: u16,
    #[arg(long, env = "API_PORT", default_value_t = DEFAULT_API_PORT)]
    api_port: u16,
    /// Comma separated id@host:port list
    #[arg(long, env = "PERSISTENT_PEERS")]
    peers: Option<String>,
    #[arg(long, env = "FALLBACK_MODE", value_enum, default_value_t = FallbackMode::Placeholder)]
    fallback: FallbackMode,
    #[arg(long, env = "FALLBACK_SHELL", default_value = "/bin/bash")]
    shell: PathBuf,
    /// Also require genesis.json to carry the configured chain id
    #[arg(long, env = "VERIFY_GENESIS")]
    verify_genesis: bool,
}

impl From<NodeArgs> for BootstrapConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            home: args.home,
            chain_id: args.chain_id,
            moniker: args.moniker,
            keyring_passphrase: args.keyring_passphrase,
            node_binary: args.node_binary,
            setup_program: args.setup_program,
            setup_args: args.setup_args,
            setup_timeout_secs: args.setup_timeout_secs,
            public_ip: args.public_ip,
            rpc_port: args.rpc_port,
            p2p_port: args.p2p_port,
            grpc_port: args.grpc_port,
            api_port: args.api_port,
            persistent_peers: args.peers.as_deref().map(parse_peers).unwrap_or_default(),
            fallback: args.fallback,
            shell: args.shell,
            verify_genesis: args.verify_genesis,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start(node) => {
            start_node(node.into()).await?;
        }
        Commands::Patch {
            config,
            public_ip,
            rpc_port,
            p2p_port,
            peers,
        } => {
            let report = patch_config(&PatchParameters {
                config_path: config,
                public_ip,
                rpc_port,
                p2p_port,
                persistent_peers: peers.as_deref().map(parse_peers).unwrap_or_default(),
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status(node) => {
            let supervisor = Supervisor::new(node.into());
            let report = supervisor.assess().report(supervisor.home());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Placeholder { node, host, reason } => {
            let config: BootstrapConfig = node.into();
            let status = PlaceholderStatus::from_config(&config, reason);
            PlaceholderServer::new(host, config.rpc_port, status).start().await?;
        }
    }

    Ok(())
}

async fn start_node(config: BootstrapConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 Bootstrapping Cintara node: {}", config.moniker);
    println!("⛓️  Chain ID: {}", config.chain_id);
    println!("💾 Home: {}", config.home.display());
    println!("🌐 RPC: {}  P2P: {}", config.rpc_port, config.p2p_port);

    if config.persistent_peers.is_empty() {
        info!("No persistent peers configured");
    } else {
        info!("Persistent peers: {}", config.persistent_peers.join(","));
    }

    Supervisor::new(config).ensure_running().await?;

    Ok(())
}
