//! Docker-backed isolation.
//!
//! The workdir is bind-mounted at `/code` inside short-lived containers.
//! Run containers are named after the request identifier so a timed-out
//! execution can be torn down by name, descendants included. The
//! in-container `timeout(1)` is the primary supervisor for executions;
//! the pipeline's watchdog only backstops it.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{IsolationBackend, SandboxMode, COMPILE_FLAGS};
use crate::config::Config;
use crate::workspace::Workspace;

pub struct DockerBackend {
    config: Config,
}

impl DockerBackend {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn mount_arg(workspace: &Workspace) -> String {
        format!("{}:/code", workspace.root().display())
    }
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    fn mode(&self) -> SandboxMode {
        SandboxMode::Isolated
    }

    fn compile_command(&self, workspace: &Workspace, id: &str) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "-v"])
            .arg(Self::mount_arg(workspace))
            .arg("--name")
            .arg(format!("cpp-compile-{id}"))
            .arg(&self.config.docker_image)
            .arg("g++")
            .args(COMPILE_FLAGS)
            .arg(format!("/code/{id}.src"))
            .arg("-o")
            .arg(format!("/code/{id}.bin"));
        cmd
    }

    fn run_command(&self, workspace: &Workspace, id: &str) -> Command {
        let limits = &self.config.limits;
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "-i", "-v"])
            .arg(Self::mount_arg(workspace))
            .arg("--name")
            .arg(format!("cpp-run-{id}"))
            .arg(format!("--memory={}m", limits.memory_mb))
            .arg(format!("--cpus={}", limits.cpu_share))
            .arg(format!("--pids-limit={}", limits.pids_limit))
            .arg("--network=none")
            .arg("--ulimit")
            .arg(format!("nproc={}", limits.nproc))
            .arg("--ulimit")
            .arg(format!("nofile={}", limits.nofile))
            .arg(&self.config.docker_image)
            .arg("timeout")
            .arg(format!("{}s", self.config.timeout_seconds()))
            .arg(format!("/code/{id}.bin"));
        cmd
    }

    fn debugger_command(&self, workspace: &Workspace, session_id: &str, id: &str) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "-i", "-v"])
            .arg(Self::mount_arg(workspace))
            .arg("--name")
            .arg(format!("cpp-debug-{session_id}"))
            // ptrace is blocked by the default seccomp profile
            .arg("--security-opt=seccomp=unconfined")
            .arg(&self.config.docker_image)
            .args(["gdb", "-q"])
            .arg(format!("/code/{id}.bin"));
        cmd
    }

    async fn debugger_available(&self) -> bool {
        Command::new("docker")
            .args(["run", "--rm"])
            .arg(&self.config.docker_image)
            .args(["gdb", "--version"])
            .stdin(Stdio::null())
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn kill_execution(&self, id: &str, child: &mut Child) {
        let name = format!("cpp-run-{id}");
        debug!(container = %name, "Removing timed-out container");
        let _ = Command::new("docker")
            .args(["rm", "-f"])
            .arg(&name)
            .output()
            .await;
        let _ = child.kill().await;
    }
}
