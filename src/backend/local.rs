//! Direct host execution fallback.
//!
//! Used when the Docker probe fails at startup. No filesystem or network
//! isolation applies; the wall-clock watchdog is the only ceiling, and a
//! timed-out run is torn down by signalling its whole process group.

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{IsolationBackend, SandboxMode, COMPILE_FLAGS};
use crate::workspace::Workspace;

#[derive(Debug, Default, Clone)]
pub struct LocalBackend {}

impl LocalBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl IsolationBackend for LocalBackend {
    fn mode(&self) -> SandboxMode {
        SandboxMode::LocalFallback
    }

    fn compile_command(&self, workspace: &Workspace, id: &str) -> Command {
        let mut cmd = Command::new("g++");
        cmd.args(COMPILE_FLAGS)
            .arg(workspace.source_path(id))
            .arg("-o")
            .arg(workspace.binary_path(id));
        cmd
    }

    fn run_command(&self, workspace: &Workspace, id: &str) -> Command {
        let mut cmd = Command::new(workspace.binary_path(id));
        // Lead a fresh process group so the watchdog can kill every
        // descendant, not just the direct child.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn debugger_command(&self, workspace: &Workspace, _session_id: &str, id: &str) -> Command {
        let mut cmd = Command::new("gdb");
        cmd.arg("-q").arg(workspace.binary_path(id));
        cmd
    }

    async fn debugger_available(&self) -> bool {
        Command::new("gdb")
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[allow(unsafe_code)]
    async fn kill_execution(&self, id: &str, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            debug!(id = %id, pid, "Killing timed-out process group");
            // pid == pgid because run_command spawns with process_group(0)
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        debug!(id = %id, "Killing timed-out process");
        let _ = child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_command_targets_workspace_paths() {
        let backend = LocalBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().to_path_buf()).unwrap();

        let cmd = backend.compile_command(&ws, "abc");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.iter().any(|a| a.ends_with("abc.src")));
        assert!(args.iter().any(|a| a.ends_with("abc.bin")));
        assert!(args.contains(&"-g".to_string()));
    }

    #[test]
    fn debugger_is_quiet_gdb() {
        let backend = LocalBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().to_path_buf()).unwrap();

        let cmd = backend.debugger_command(&ws, "sess", "abc");
        assert_eq!(cmd.as_std().get_program().to_string_lossy(), "gdb");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-q");
    }
}
