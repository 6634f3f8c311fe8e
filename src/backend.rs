//! Isolation backend selection and the execution strategy trait.
//!
//! The backend is chosen exactly once at process startup: if the Docker
//! CLI answers a version probe, everything runs inside the runner image;
//! otherwise the daemon falls back to direct host execution with a
//! warning. The chosen strategy value is passed explicitly into each
//! pipeline and never re-evaluated per request. The only per-call probe
//! is debugger availability, checked on every debug-session start.

mod docker;
mod local;

pub use docker::DockerBackend;
pub use local::LocalBackend;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::Config;
use crate::workspace::Workspace;

/// Compiler invocation pinned for every submission: language standard,
/// warnings, optimization, debug symbols (so GDB sessions work later),
/// and an explicit language since sources are stored as `<id>.src`.
pub const COMPILE_FLAGS: [&str; 6] = ["-std=c++17", "-Wall", "-O2", "-g", "-x", "c++"];

/// Which isolation strategy the daemon runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Docker container with resource ceilings and no network.
    Isolated,
    /// Direct host execution; only the watchdog limits the process.
    LocalFallback,
}

/// Result of running a compiled binary to completion.
///
/// Transient: produced and returned, never stored. stdout and stderr
/// are captured on separate channels and never interleaved.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitKind,
}

/// Classification of how an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code zero.
    Success,
    /// Non-zero exit code or terminating signal.
    RuntimeFailure {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Stopped by the supervisor or the watchdog at the wall-clock
    /// ceiling.
    Timeout,
}

/// Strategy for compiling, running and debugging inside (or outside)
/// the sandbox.
///
/// Implementations build the concrete process invocations; the
/// pipelines own spawning, I/O wiring and the timeout watchdog.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    fn mode(&self) -> SandboxMode;

    /// Compiler invocation turning `<id>.src` into `<id>.bin`.
    fn compile_command(&self, workspace: &Workspace, id: &str) -> Command;

    /// Invocation that runs `<id>.bin` under this backend's ceilings.
    fn run_command(&self, workspace: &Workspace, id: &str) -> Command;

    /// Interactive debugger invocation attached to `<id>.bin`.
    fn debugger_command(&self, workspace: &Workspace, session_id: &str, id: &str) -> Command;

    /// Whether the debugger tool is reachable right now. Probed on every
    /// debug-session start, never cached.
    async fn debugger_available(&self) -> bool;

    /// Hard-stop a running execution and all its descendants.
    async fn kill_execution(&self, id: &str, child: &mut Child);
}

/// Probe for the isolated backend once, at startup.
///
/// Failure to detect Docker is non-fatal: the daemon falls open to
/// direct host execution and keeps serving.
pub async fn probe(config: &Config) -> Arc<dyn IsolationBackend> {
    let docker = Command::new("docker")
        .arg("--version")
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false);

    if docker {
        info!("Docker is available, using isolated execution");
        Arc::new(DockerBackend::new(config.clone()))
    } else {
        warn!("Docker not available, falling back to direct host execution (less secure)");
        Arc::new(LocalBackend::new())
    }
}
