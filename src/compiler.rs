//! Compile pipeline.
//!
//! Allocates a fresh identifier per submission, persists the source to
//! the workspace and drives the toolchain through the chosen backend.
//! Compile failure is reported synchronously, no retries; the
//! toolchain's diagnostics travel back verbatim.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::IsolationBackend;
use crate::error::CompileError;
use crate::registry::{ArtifactRegistry, ArtifactStatus, CompilationArtifact};
use crate::workspace::Workspace;

pub struct Compiler {
    workspace: Workspace,
    registry: Arc<ArtifactRegistry>,
    backend: Arc<dyn IsolationBackend>,
}

impl Compiler {
    pub fn new(
        workspace: Workspace,
        registry: Arc<ArtifactRegistry>,
        backend: Arc<dyn IsolationBackend>,
    ) -> Self {
        Self {
            workspace,
            registry,
            backend,
        }
    }

    /// Compile submitted source, registering the artifact under a fresh
    /// identifier. On success the artifact is `Compiled`; a rejected
    /// source stays registered as `Failed` so later operations report it
    /// as not compiled.
    pub async fn compile(&self, source: &str) -> Result<CompilationArtifact, CompileError> {
        let id = Uuid::new_v4().to_string();
        let source_path = self.workspace.write_source(&id, source).await?;

        let mut artifact = CompilationArtifact {
            id: id.clone(),
            source_path,
            binary_path: self.workspace.binary_path(&id),
            status: ArtifactStatus::Pending,
            created_at: Instant::now(),
        };
        self.registry.insert(artifact.clone()).await;

        debug!(id = %id, source_len = source.len(), "Invoking compiler");
        let output = match self
            .backend
            .compile_command(&self.workspace, &id)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.registry.set_status(&id, ArtifactStatus::Failed).await;
                return Err(CompileError::ToolMissing);
            }
            Err(e) => {
                self.registry.set_status(&id, ArtifactStatus::Failed).await;
                return Err(e.into());
            }
        };

        if output.status.success() {
            self.registry.set_status(&id, ArtifactStatus::Compiled).await;
            artifact.status = ArtifactStatus::Compiled;
            info!(id = %id, "Compilation succeeded");
            Ok(artifact)
        } else {
            let diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            self.registry.set_status(&id, ArtifactStatus::Failed).await;
            debug!(id = %id, "Compiler rejected source");
            Err(CompileError::DiagnosticFailure(diagnostics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SandboxMode;
    use async_trait::async_trait;
    use tokio::process::{Child, Command};

    /// Backend whose "compiler" is an arbitrary shell snippet.
    struct FakeToolchain(&'static str);

    #[async_trait]
    impl IsolationBackend for FakeToolchain {
        fn mode(&self) -> SandboxMode {
            SandboxMode::LocalFallback
        }

        fn compile_command(&self, _workspace: &Workspace, _id: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", self.0]);
            cmd
        }

        fn run_command(&self, workspace: &Workspace, id: &str) -> Command {
            Command::new(workspace.binary_path(id))
        }

        fn debugger_command(&self, _ws: &Workspace, _sid: &str, _id: &str) -> Command {
            Command::new("true")
        }

        async fn debugger_available(&self) -> bool {
            true
        }

        async fn kill_execution(&self, _id: &str, child: &mut Child) {
            let _ = child.kill().await;
        }
    }

    /// Backend pointing at a binary that does not exist.
    struct MissingToolchain;

    #[async_trait]
    impl IsolationBackend for MissingToolchain {
        fn mode(&self) -> SandboxMode {
            SandboxMode::LocalFallback
        }

        fn compile_command(&self, _workspace: &Workspace, _id: &str) -> Command {
            Command::new("/nonexistent/g++")
        }

        fn run_command(&self, workspace: &Workspace, id: &str) -> Command {
            Command::new(workspace.binary_path(id))
        }

        fn debugger_command(&self, _ws: &Workspace, _sid: &str, _id: &str) -> Command {
            Command::new("true")
        }

        async fn debugger_available(&self) -> bool {
            false
        }

        async fn kill_execution(&self, _id: &str, child: &mut Child) {
            let _ = child.kill().await;
        }
    }

    fn compiler(backend: Arc<dyn IsolationBackend>) -> (tempfile::TempDir, Arc<ArtifactRegistry>, Compiler) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().to_path_buf()).unwrap();
        let registry = Arc::new(ArtifactRegistry::new());
        let compiler = Compiler::new(ws, Arc::clone(&registry), backend);
        (dir, registry, compiler)
    }

    #[tokio::test]
    async fn success_registers_compiled_artifact() {
        let (_dir, registry, compiler) = compiler(Arc::new(FakeToolchain("exit 0")));

        let artifact = compiler.compile("int main() { return 0; }").await.unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Compiled);
        assert!(artifact.source_path.exists());
        assert!(registry.get_compiled(&artifact.id).await.is_some());
    }

    #[tokio::test]
    async fn diagnostics_travel_verbatim() {
        let (_dir, _registry, compiler) =
            compiler(Arc::new(FakeToolchain("echo 'boom: expected ;' >&2; exit 1")));

        let err = compiler.compile("int main() { return").await.unwrap_err();
        match err {
            CompileError::DiagnosticFailure(text) => {
                assert!(text.contains("boom: expected ;"));
            }
            other => panic!("expected DiagnosticFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_toolchain() {
        let (_dir, _registry, compiler) = compiler(Arc::new(MissingToolchain));

        let err = compiler.compile("int main() {}").await.unwrap_err();
        assert!(matches!(err, CompileError::ToolMissing));
    }

    // Full-toolchain property: needs a host g++, skipped otherwise
    // (same gating the upstream sandbox tests use).
    #[tokio::test]
    async fn real_gxx_roundtrip() {
        let have_gxx = Command::new("g++")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !have_gxx {
            return;
        }

        let (_dir, registry, compiler) =
            compiler(Arc::new(crate::backend::LocalBackend::new()));

        let artifact = compiler.compile("int main() { return 0; }").await.unwrap();
        assert!(artifact.binary_path.exists());
        assert!(registry.get_compiled(&artifact.id).await.is_some());

        let err = compiler.compile("int main() { return").await.unwrap_err();
        match err {
            CompileError::DiagnosticFailure(text) => assert!(text.contains("error")),
            other => panic!("expected DiagnosticFailure, got {other:?}"),
        }
    }
}
