// Best-effort non-interactive completion of the node's setup wizard
pub mod prompts;

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use log::{debug, info, warn, error};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use crate::home::NodeHome;
use prompts::PromptResponder;

const HEREDOC_DELIMITER: &str = "CINTARA_SETUP_EOF";

/// Values typed into the wizard
#[derive(Debug, Clone)]
pub struct SetupAnswers {
    pub moniker: String,
    pub passphrase: String,
}

impl SetupAnswers {
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            moniker: config.moniker.clone(),
            passphrase: config.keyring_passphrase.clone(),
        }
    }

    /// Answer sequence for wizards read line by line: node name,
    /// confirmation, passphrase, passphrase confirmation
    pub fn script(&self) -> String {
        format!("{}\ny\n{}\n{}\n", self.moniker, self.passphrase, self.passphrase)
    }
}

/// How to launch the setup program
#[derive(Debug, Clone)]
pub struct SetupInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl SetupInvocation {
    pub fn from_config(config: &BootstrapConfig) -> Self {
        let home = config.home.to_string_lossy().to_string();
        Self {
            program: config.setup_program.clone(),
            args: config.setup_args.clone(),
            env: vec![
                ("CHAIN_ID".to_string(), config.chain_id.clone()),
                ("MONIKER".to_string(), config.moniker.clone()),
                ("NODE_HOME".to_string(), home.clone()),
                ("DAEMON_HOME".to_string(), home),
                ("KEYRING_PASSPHRASE".to_string(), config.keyring_passphrase.clone()),
            ],
            timeout: config.setup_timeout(),
        }
    }

    fn command<S: AsRef<OsStr>>(&self, program: S) -> Command {
        let mut command = Command::new(program);
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        command.stderr(Stdio::inherit());
        command.kill_on_drop(true);
        // own group, so anything the wizard starts can be stopped with it
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    fn program_command(&self) -> Command {
        let mut command = self.command(&self.program);
        command.args(&self.args);
        command
    }

    /// `program args...` quoted for `sh -c`
    fn shell_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| shell_quote(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kills the whole process group of a setup attempt when dropped, which
/// happens on completion and when the attempt's timeout fires.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            // ESRCH just means the group already exited
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!("setup process group {} not signalled: {}", pgid, e);
            }
        }
    }
}

/// One way of getting answers into the wizard. The wizard's prompt order is
/// not stable across releases, so several are tried in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStrategy {
    /// Write the whole answer script to stdin up front
    PipedInput,
    /// Watch stdout and answer each prompt as it shows up
    ScriptedExpect,
    /// Let `sh` feed the answers through a heredoc
    Heredoc,
}

impl SetupStrategy {
    pub const ALL: [SetupStrategy; 3] = [
        SetupStrategy::PipedInput,
        SetupStrategy::ScriptedExpect,
        SetupStrategy::Heredoc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SetupStrategy::PipedInput => "piped-input",
            SetupStrategy::ScriptedExpect => "scripted-expect",
            SetupStrategy::Heredoc => "heredoc",
        }
    }

    /// Run the wizard once. Success only means the program exited cleanly,
    /// callers still check the home directory for the genesis file.
    pub async fn attempt(&self, invocation: &SetupInvocation, answers: &SetupAnswers) -> Result<()> {
        let run = async {
            match self {
                SetupStrategy::PipedInput => run_piped(invocation, answers).await,
                SetupStrategy::ScriptedExpect => run_expect(invocation, answers).await,
                SetupStrategy::Heredoc => run_heredoc(invocation, answers).await,
            }
        };

        let status = match timeout(invocation.timeout, run).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(BootstrapError::SetupStrategyFailed {
                    strategy: self.name(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BootstrapError::SetupStrategyFailed {
                    strategy: self.name(),
                    reason: format!("timed out after {}s", invocation.timeout.as_secs()),
                })
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(BootstrapError::SetupStrategyFailed {
                strategy: self.name(),
                reason: format!("setup program exited with {}", status),
            })
        }
    }
}

/// Try each strategy in order until the genesis file shows up.
/// Returns the strategy that got there.
pub async fn run_strategies(
    strategies: &[SetupStrategy],
    invocation: &SetupInvocation,
    answers: &SetupAnswers,
    home: &NodeHome,
) -> Result<SetupStrategy> {
    for (i, strategy) in strategies.iter().enumerate() {
        info!(
            "🧙 Setup attempt {}/{} using {} ({})",
            i + 1,
            strategies.len(),
            strategy.name(),
            invocation.program.display()
        );

        let outcome = strategy.attempt(invocation, answers).await;

        if home.is_initialized() {
            if let Err(e) = outcome {
                warn!("⚠️  {} but genesis is present, continuing", e);
            }
            info!("✅ Setup completed via {}", strategy.name());
            return Ok(*strategy);
        }

        let failure = match outcome {
            Err(e) => e,
            Ok(()) => BootstrapError::SetupStrategyFailed {
                strategy: strategy.name(),
                reason: format!("no genesis file at {}", home.genesis_path.display()),
            },
        };
        error!("❌ {}", failure);
    }

    Err(BootstrapError::SetupExhausted {
        attempts: strategies.len(),
    })
}

async fn run_piped(invocation: &SetupInvocation, answers: &SetupAnswers) -> Result<ExitStatus> {
    let mut child = invocation
        .program_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .spawn()?;
    let _group = ProcessGroup::of(&child);

    if let Some(mut stdin) = child.stdin.take() {
        // the wizard may exit before consuming every answer
        if let Err(e) = stdin.write_all(answers.script().as_bytes()).await {
            debug!("setup program closed stdin early: {}", e);
        }
    }

    Ok(child.wait().await?)
}

async fn run_expect(invocation: &SetupInvocation, answers: &SetupAnswers) -> Result<ExitStatus> {
    let mut child = invocation
        .program_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    let _group = ProcessGroup::of(&child);

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("setup program has no stdin pipe"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("setup program has no stdout pipe"))?;

    let mut responder = PromptResponder::new(answers);
    let mut buf = [0u8; 1024];

    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let chunk = String::from_utf8_lossy(&buf[..n]);
        debug!("setup> {}", chunk.trim_end());

        if let Some(reply) = responder.feed(&chunk) {
            stdin.write_all(reply.as_bytes()).await?;
            stdin.flush().await?;
        }
    }

    drop(stdin);
    Ok(child.wait().await?)
}

async fn run_heredoc(invocation: &SetupInvocation, answers: &SetupAnswers) -> Result<ExitStatus> {
    // exec so the wizard itself is the child, not a shell wrapped around it
    let script = format!(
        "exec {} <<'{delim}'\n{}{delim}\n",
        invocation.shell_line(),
        answers.script(),
        delim = HEREDOC_DELIMITER,
    );

    let mut child = invocation
        .command("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .spawn()?;
    let _group = ProcessGroup::of(&child);

    Ok(child.wait().await?)
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
