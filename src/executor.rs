//! Execution pipeline.
//!
//! Runs a compiled binary through the chosen backend under its resource
//! ceilings and a wall-clock timeout. In isolated mode the in-sandbox
//! `timeout(1)` is the primary supervisor and the watchdog here only
//! backstops it (ceiling + epsilon); in fallback mode the watchdog is
//! the sole enforcer and tears down the whole process group.
//!
//! Each call is independent: a fresh process, a fresh stdin copy, no
//! state carried from the previous run of the same identifier.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::backend::{ExecutionResult, ExitKind, IsolationBackend, SandboxMode};
use crate::config::Config;
use crate::error::ExecError;
use crate::registry::ArtifactRegistry;
use crate::workspace::Workspace;

/// Exit code GNU `timeout(1)` reports when it had to stop the command.
const TIMEOUT_EXIT_CODE: i32 = 124;

pub struct Executor {
    workspace: Workspace,
    registry: Arc<ArtifactRegistry>,
    backend: Arc<dyn IsolationBackend>,
    config: Config,
}

impl Executor {
    pub fn new(
        workspace: Workspace,
        registry: Arc<ArtifactRegistry>,
        backend: Arc<dyn IsolationBackend>,
        config: Config,
    ) -> Self {
        Self {
            workspace,
            registry,
            backend,
            config,
        }
    }

    /// Run the compiled binary for `id`, feeding it `stdin`.
    ///
    /// Precondition: the artifact for `id` has status `Compiled`, else
    /// `ExecError::NotCompiled` without touching the sandbox.
    pub async fn execute(&self, id: &str, stdin: &str) -> Result<ExecutionResult, ExecError> {
        if self.registry.get_compiled(id).await.is_none() {
            return Err(ExecError::NotCompiled);
        }

        // Keep the captured stdin on disk next to the other artifacts;
        // overwritten on every run, removed by cleanup.
        if !stdin.is_empty() {
            self.workspace.write_stdin(id, stdin).await?;
        }

        let mut cmd = self.backend.run_command(&self.workspace, id);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(id = %id, stdin_len = stdin.len(), "Running binary");
        let mut child = cmd.spawn()?;

        // Feed stdin and close the pipe so the program sees EOF
        if let Some(mut child_stdin) = child.stdin.take() {
            child_stdin.write_all(stdin.as_bytes()).await?;
            drop(child_stdin);
        }

        // Take pipe handles out so `child` stays free for kill-on-timeout
        let mut child_stdout = child.stdout.take().ok_or_else(stdio_gone)?;
        let mut child_stderr = child.stderr.take().ok_or_else(stdio_gone)?;

        let read_all = async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let (r1, r2) = tokio::join!(
                child_stdout.read_to_end(&mut stdout_buf),
                child_stderr.read_to_end(&mut stderr_buf),
            );
            r1?;
            r2?;
            Ok::<_, std::io::Error>((stdout_buf, stderr_buf))
        };

        // In isolated mode the container's own supervisor fires first;
        // the watchdog only catches a wedged supervisor.
        let deadline = match self.backend.mode() {
            SandboxMode::Isolated => self.config.exec_timeout + self.config.watchdog_epsilon,
            SandboxMode::LocalFallback => self.config.exec_timeout,
        };

        let (stdout_buf, stderr_buf) =
            match tokio::time::timeout(deadline, read_all).await {
                Ok(bufs) => bufs?,
                Err(_) => {
                    info!(id = %id, "Execution hit the wall-clock ceiling");
                    self.backend.kill_execution(id, &mut child).await;
                    return Ok(ExecutionResult {
                        stdout: String::new(),
                        stderr: String::new(),
                        status: ExitKind::Timeout,
                    });
                }
            };

        let status = child.wait().await?;
        let kind = classify(status, self.backend.mode());

        debug!(id = %id, status = ?kind, "Execution completed");
        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            status: kind,
        })
    }
}

fn stdio_gone() -> std::io::Error {
    std::io::Error::other("child stdio handles unavailable")
}

fn classify(status: std::process::ExitStatus, mode: SandboxMode) -> ExitKind {
    if status.success() {
        return ExitKind::Success;
    }

    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    match status.code() {
        // The in-container supervisor stopped the run at the ceiling
        Some(TIMEOUT_EXIT_CODE) if mode == SandboxMode::Isolated => ExitKind::Timeout,
        code => ExitKind::RuntimeFailure { code, signal },
    }
}
