//! Child process execution for the provisioning cycle.
//!
//! Each phase is one child process. stdout and stderr are read concurrently
//! into a single buffer in arrival order, the way a terminal would show
//! them, and the buffer is attached verbatim to the error when the phase
//! fails.
//!
//! On unix every phase runs in its own process group, so an abort reaches
//! the provider plugins terraform started as well as terraform itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, PteraformError, Result};

use super::context::ExecutionContext;
use super::phase::Phase;

/// Default executable name, resolved through `PATH` by the OS.
pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";

/// Read size for the stdout/stderr pumps.
const PIPE_CHUNK: usize = 8 * 1024;

/// Time an aborted phase gets to exit after SIGTERM before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Which terraform executable to run and the extra environment it gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformBinary {
    /// Program name or path. A bare name is looked up on `PATH`.
    pub program: PathBuf,
    /// Extra environment variables set on every invocation.
    pub env: BTreeMap<String, String>,
}

impl Default for TerraformBinary {
    fn default() -> Self {
        Self::new(DEFAULT_TERRAFORM_BINARY)
    }
}

impl TerraformBinary {
    /// Creates a binary reference with no extra environment.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: BTreeMap::new(),
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Output of a successful phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutput {
    /// Phase that ran.
    pub phase: Phase,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Runs a single provisioning phase in a working directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `phase` in `working_dir`. `args` are appended to the apply
    /// command line and are empty for init.
    ///
    /// # Errors
    ///
    /// Returns a process error if the phase cannot be started or exits
    /// unsuccessfully, and a cancellation error if `ctx` fires first.
    async fn run(
        &self,
        working_dir: &Path,
        phase: Phase,
        args: &[String],
        ctx: &ExecutionContext,
    ) -> Result<PhaseOutput>;
}

#[async_trait]
impl<T: ProcessRunner + ?Sized> ProcessRunner for Arc<T> {
    async fn run(
        &self,
        working_dir: &Path,
        phase: Phase,
        args: &[String],
        ctx: &ExecutionContext,
    ) -> Result<PhaseOutput> {
        (**self).run(working_dir, phase, args, ctx).await
    }
}

/// Runs the full cycle: init, then apply with `args`.
///
/// Apply only runs if init succeeded. Nothing is retried.
///
/// # Errors
///
/// Returns the first phase failure unchanged.
pub async fn provision<R: ProcessRunner + ?Sized>(
    runner: &R,
    working_dir: &Path,
    args: &[String],
    ctx: &ExecutionContext,
) -> Result<Vec<PhaseOutput>> {
    let mut outputs = Vec::with_capacity(Phase::CYCLE.len());

    for phase in Phase::CYCLE {
        let phase_args: &[String] = match phase {
            Phase::Init => &[],
            Phase::Apply => args,
        };
        outputs.push(runner.run(working_dir, phase, phase_args, ctx).await?);
    }

    Ok(outputs)
}

/// [`ProcessRunner`] that spawns the terraform binary.
#[derive(Debug, Clone, Default)]
pub struct TerraformRunner {
    binary: TerraformBinary,
}

impl TerraformRunner {
    /// Creates a runner for the given binary.
    #[must_use]
    pub const fn new(binary: TerraformBinary) -> Self {
        Self { binary }
    }

    /// The binary this runner invokes.
    #[must_use]
    pub const fn binary(&self) -> &TerraformBinary {
        &self.binary
    }

    fn command(&self, working_dir: &Path, argv: &[String]) -> Command {
        let mut command = Command::new(&self.binary.program);
        command
            .args(argv)
            .current_dir(working_dir)
            .envs(&self.binary.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }
}

#[async_trait]
impl ProcessRunner for TerraformRunner {
    async fn run(
        &self,
        working_dir: &Path,
        phase: Phase,
        args: &[String],
        ctx: &ExecutionContext,
    ) -> Result<PhaseOutput> {
        if let Some(reason) = ctx.check() {
            return Err(PteraformError::cancelled(format!("terraform {phase}"), reason));
        }

        let argv = phase.command_line(args);
        info!("Running terraform {} in {}", phase, working_dir.display());
        debug!("argv: {:?}", argv);

        let mut child = self.command(working_dir, &argv).spawn().map_err(|e| {
            ProcessError::SpawnFailed {
                phase,
                program: self.binary.program.display().to_string(),
                message: e.to_string(),
            }
        })?;
        let pid = child.id();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, tx.clone())));
        }
        drop(tx);

        let waited = tokio::select! {
            biased;
            reason = ctx.done() => Err(reason),
            status = child.wait() => Ok(status),
        };

        let status = match waited {
            Ok(status) => status.map_err(|e| ProcessError::WaitFailed {
                phase,
                message: e.to_string(),
            })?,
            Err(reason) => {
                warn!("terraform {} in {} aborted: {}", phase, working_dir.display(), reason);
                stop_process_tree(&mut child, pid).await;
                for handle in &pumps {
                    handle.abort();
                }
                return Err(PteraformError::cancelled(format!("terraform {phase}"), reason));
            }
        };

        let combined = tokio::select! {
            biased;
            reason = ctx.done() => {
                // terraform exited but something it started still holds the pipes.
                kill_stragglers(pid);
                for handle in &pumps {
                    handle.abort();
                }
                return Err(PteraformError::cancelled(format!("terraform {phase}"), reason));
            }
            combined = collect(&mut rx) => combined,
        };
        let output = String::from_utf8_lossy(&combined).into_owned();

        if status.success() {
            info!("terraform {} in {} succeeded", phase, working_dir.display());
            Ok(PhaseOutput { phase, output })
        } else {
            warn!("terraform {} in {} failed: {}", phase, working_dir.display(), status);
            Err(ProcessError::Failed {
                phase,
                status: status.to_string(),
                output,
            }
            .into())
        }
    }
}

/// Stops an aborted phase: SIGTERM to its process group, a grace period,
/// then SIGKILL to whatever is left. The child itself is always reaped.
async fn stop_process_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        signal_group(pid, Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            debug!("terraform ignored SIGTERM for {:?}", KILL_GRACE);
        }
        signal_group(pid, Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = (pid, KILL_GRACE);

    if let Err(e) = child.kill().await {
        debug!("kill after abort: {e}");
    }
}

/// Kills what remains of the process group of an exited phase.
fn kill_stragglers(pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: Signal) {
    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // ESRCH means the group is already gone.
    if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
        debug!("{:?} to process group {}: {}", signal, pgid, e);
    }
}

/// Forwards everything read from `reader` into `sink` until EOF.
async fn pump<R>(mut reader: R, sink: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PIPE_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                if sink.send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("pipe read failed: {e}");
                return;
            }
        }
    }
}

/// Concatenates chunks until every sender is gone.
async fn collect(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut combined = Vec::new();
    while let Some(chunk) = rx.recv().await {
        combined.extend_from_slice(&chunk);
    }
    combined
}
