// Node bootstrap supervisor: initialize if needed, then hand the process to the node
use std::path::{Path, PathBuf};
use log::{info, warn, error};
use serde::Serialize;

use crate::config::{BootstrapConfig, FallbackMode};
use crate::error::{BootstrapError, Result};
use crate::home::{resolve_binary, NodeHome};
use crate::patcher::{patch_config, PatchParameters, PatchReport};
use crate::placeholder::{PlaceholderServer, PlaceholderStatus};
use crate::setup::{run_strategies, SetupAnswers, SetupInvocation, SetupStrategy};

#[derive(Debug)]
pub enum NodeState {
    /// No genesis file in the home directory
    Uninitialized,
    /// Setup wizard is being driven
    Initializing,
    /// Genesis present and the node binary resolves
    Ready { binary: PathBuf },
    /// Terminal for this run, needs a human or a container restart
    Degraded { reason: BootstrapError },
}

/// Serializable snapshot of a state for the `status` command
#[derive(Debug, Serialize)]
pub struct StateReport {
    pub state: &'static str,
    pub home: NodeHome,
    pub binary: Option<PathBuf>,
    pub reason: Option<String>,
}

impl NodeState {
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Uninitialized => "uninitialized",
            NodeState::Initializing => "initializing",
            NodeState::Ready { .. } => "ready",
            NodeState::Degraded { .. } => "degraded",
        }
    }

    pub fn report(&self, home: &NodeHome) -> StateReport {
        StateReport {
            state: self.name(),
            home: home.clone(),
            binary: match self {
                NodeState::Ready { binary } => Some(binary.clone()),
                _ => None,
            },
            reason: match self {
                NodeState::Degraded { reason } => Some(reason.to_string()),
                _ => None,
            },
        }
    }
}

/// Everything done before the process is replaced by the node
#[derive(Debug)]
pub struct HandOff {
    /// Set when a public IP was configured and `config.toml` got patched
    pub patch: Option<PatchReport>,
    pub args: Vec<String>,
}

pub struct Supervisor {
    config: BootstrapConfig,
    home: NodeHome,
    strategies: Vec<SetupStrategy>,
}

impl Supervisor {
    pub fn new(config: BootstrapConfig) -> Self {
        let home = config.node_home();
        Self {
            config,
            home,
            strategies: SetupStrategy::ALL.to_vec(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<SetupStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn home(&self) -> &NodeHome {
        &self.home
    }

    /// Classify the home directory without running anything
    pub fn assess(&self) -> NodeState {
        if !self.home.is_initialized() {
            return NodeState::Uninitialized;
        }

        if self.config.verify_genesis {
            if let Err(reason) = self.home.verify_chain_id(&self.config.chain_id) {
                return NodeState::Degraded { reason };
            }
        }

        match resolve_binary(&self.config.node_binary) {
            Some(binary) => NodeState::Ready { binary },
            None => NodeState::Degraded {
                reason: BootstrapError::BinaryMissing(self.config.node_binary.clone()),
            },
        }
    }

    /// Drive the home directory to `Ready` or `Degraded` and return that state
    pub async fn settle(&self) -> NodeState {
        let state = self.assess();
        info!("🔍 Node home {} is {}", self.home.root.display(), state.name());

        if !matches!(state, NodeState::Uninitialized) {
            return state;
        }

        let initializing = NodeState::Initializing;
        log_transition(&state, &initializing);

        let answers = SetupAnswers::from_config(&self.config);
        let invocation = SetupInvocation::from_config(&self.config);

        let settled = match run_strategies(&self.strategies, &invocation, &answers, &self.home).await {
            Ok(_) => match self.assess() {
                NodeState::Uninitialized => NodeState::Degraded {
                    reason: BootstrapError::SetupExhausted {
                        attempts: self.strategies.len(),
                    },
                },
                other => other,
            },
            Err(reason) => NodeState::Degraded { reason },
        };

        log_transition(&initializing, &settled);
        settled
    }

    /// Only returns on failure: success replaces the process with the node,
    /// degradation replaces it with a shell or serves the placeholder forever
    pub async fn ensure_running(&self) -> Result<()> {
        match self.settle().await {
            NodeState::Ready { binary } => self.hand_off(&binary),
            NodeState::Degraded { reason } => self.degrade(reason).await,
            other => {
                // settle never yields these
                warn!("⚠️  Unexpected supervisor state {}", other.name());
                Ok(())
            }
        }
    }

    /// Patch `config.toml` when a public IP is configured and build the
    /// node's start arguments
    pub fn prepare_hand_off(&self) -> Result<HandOff> {
        let patch = match &self.config.public_ip {
            Some(public_ip) => Some(patch_config(&PatchParameters {
                config_path: self.home.config_path.clone(),
                public_ip: public_ip.clone(),
                rpc_port: self.config.rpc_port,
                p2p_port: self.config.p2p_port,
                persistent_peers: self.config.persistent_peers.clone(),
            })?),
            None => None,
        };

        Ok(HandOff {
            patch,
            args: start_args(&self.config),
        })
    }

    fn hand_off(&self, binary: &Path) -> Result<()> {
        let hand_off = self.prepare_hand_off().map_err(|e| {
            error!("❌ Node not started: {}", e);
            e
        })?;

        info!("🚀 Handing off to {} {}", binary.display(), hand_off.args.join(" "));

        exec_replace(binary, &hand_off.args).map_err(|e| {
            error!("❌ Failed to exec {}: {}", binary.display(), e);
            e
        })
    }

    async fn degrade(&self, reason: BootstrapError) -> Result<()> {
        error!("❌ Node cannot start: {}", reason);

        match self.config.fallback {
            FallbackMode::Shell => {
                warn!("🐚 Dropping to {} for manual setup", self.config.shell.display());
                exec_replace(&self.config.shell, &[])
            }
            FallbackMode::Placeholder => {
                warn!("🩺 Serving placeholder status on port {} until restarted", self.config.rpc_port);
                let status = PlaceholderStatus::from_config(&self.config, reason.to_string());
                PlaceholderServer::new("0.0.0.0".to_string(), self.config.rpc_port, status)
                    .start()
                    .await?;
                Ok(())
            }
        }
    }
}

/// Arguments for the node's `start` command
pub fn start_args(config: &BootstrapConfig) -> Vec<String> {
    vec![
        "start".to_string(),
        "--home".to_string(),
        config.home.to_string_lossy().to_string(),
        "--rpc.laddr".to_string(),
        format!("tcp://0.0.0.0:{}", config.rpc_port),
        "--grpc.address".to_string(),
        format!("0.0.0.0:{}", config.grpc_port),
        "--api.address".to_string(),
        format!("tcp://0.0.0.0:{}", config.api_port),
    ]
}

fn log_transition(from: &NodeState, to: &NodeState) {
    info!("🔁 Supervisor state: {} -> {}", from.name(), to.name());
}

#[cfg(unix)]
fn exec_replace(program: &Path, args: &[String]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    // exec only comes back on failure
    let err = std::process::Command::new(program).args(args).exec();
    Err(err.into())
}

#[cfg(not(unix))]
fn exec_replace(program: &Path, args: &[String]) -> Result<()> {
    let status = std::process::Command::new(program).args(args).status()?;
    std::process::exit(status.code().unwrap_or(1));
}
