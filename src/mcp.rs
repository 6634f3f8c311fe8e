//! MCP boundary for the playground pipelines.
//!
//! Thin layer: parses tool parameters, delegates to the compile/execute/
//! debug pipelines and renders the structured response bodies as JSON
//! tool content. All orchestration logic lives below this module.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{ExitKind, IsolationBackend};
use crate::compiler::Compiler;
use crate::config::Config;
use crate::debugger::{DebugSessionManager, OutputChunk};
use crate::error::{CompileError, DebugError, ExecError};
use crate::executor::Executor;
use crate::registry::ArtifactRegistry;
use crate::workspace::Workspace;

/// MCP server exposing compile, execute, cleanup and debug tools.
#[derive(Clone)]
pub struct PlaygroundServer {
    config: Config,
    workspace: Workspace,
    registry: Arc<ArtifactRegistry>,
    compiler: Arc<Compiler>,
    executor: Arc<Executor>,
    debugger: Arc<DebugSessionManager>,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompileParams {
    /// The C++ source code to compile.
    #[schemars(description = "The C++ source code to compile")]
    pub code: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteParams {
    /// Identifier returned by a successful compile.
    #[schemars(description = "Identifier returned by a successful compile")]
    pub id: String,

    /// Standard input fed to the program.
    #[schemars(description = "Standard input fed to the program")]
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CleanupParams {
    /// Identifier whose ephemeral artifacts should be deleted.
    #[schemars(description = "Identifier whose ephemeral artifacts should be deleted")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DebugStartParams {
    /// Identifier returned by a successful compile.
    #[schemars(description = "Identifier returned by a successful compile")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DebugCommandParams {
    /// Debug session identifier.
    #[schemars(description = "Debug session identifier")]
    pub session_id: String,

    /// GDB command to send.
    #[schemars(description = "GDB command to send")]
    pub command: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DebugSessionParams {
    /// Debug session identifier.
    #[schemars(description = "Debug session identifier")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompileResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugStartResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugCommandResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Vec<OutputChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugPollResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Vec<OutputChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugEndResponse {
    success: bool,
    message: String,
}

#[tool_router]
impl PlaygroundServer {
    pub fn new(config: Config, workspace: Workspace, backend: Arc<dyn IsolationBackend>) -> Self {
        let registry = Arc::new(ArtifactRegistry::new());
        let compiler = Arc::new(Compiler::new(
            workspace.clone(),
            Arc::clone(&registry),
            Arc::clone(&backend),
        ));
        let executor = Arc::new(Executor::new(
            workspace.clone(),
            Arc::clone(&registry),
            Arc::clone(&backend),
            config.clone(),
        ));
        let debugger = Arc::new(DebugSessionManager::new(
            workspace.clone(),
            Arc::clone(&registry),
            backend,
            config.clone(),
        ));
        Self {
            config,
            workspace,
            registry,
            compiler,
            executor,
            debugger,
            tool_router: Self::tool_router(),
        }
    }

    /// Compile C++ source, returning an identifier for later execution
    /// or debugging.
    #[tool(description = "Compile C++ source code in the sandbox")]
    async fn compile(
        &self,
        Parameters(params): Parameters<CompileParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.compiler.compile(&params.code).await {
            Ok(artifact) => render(true, &CompileResponse {
                success: true,
                id: Some(artifact.id),
                message: "Compilation successful".to_string(),
                error: None,
            }),
            Err(CompileError::DiagnosticFailure(text)) => render(false, &CompileResponse {
                success: false,
                id: None,
                message: "Compilation error".to_string(),
                error: Some(text),
            }),
            Err(CompileError::ToolMissing) => render(false, &CompileResponse {
                success: false,
                id: None,
                message: "Compiler toolchain is not available".to_string(),
                error: None,
            }),
            Err(e) => render(false, &CompileResponse {
                success: false,
                id: None,
                message: "Server error during compilation".to_string(),
                error: Some(e.to_string()),
            }),
        }
    }

    /// Run a compiled program under the sandbox ceilings.
    #[tool(description = "Execute a compiled program with optional stdin")]
    async fn execute(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.executor.execute(&params.id, &params.input).await {
            Ok(result) => match result.status {
                ExitKind::Success => render(true, &ExecuteResponse {
                    success: true,
                    output: Some(result.stdout),
                    message: None,
                    error: non_empty(result.stderr),
                }),
                ExitKind::Timeout => render(false, &ExecuteResponse {
                    success: false,
                    output: None,
                    message: Some(format!(
                        "Execution timed out (limit: {} seconds)",
                        self.config.timeout_seconds()
                    )),
                    error: None,
                }),
                ExitKind::RuntimeFailure { .. } => render(false, &ExecuteResponse {
                    success: false,
                    output: None,
                    message: Some("Execution error".to_string()),
                    error: non_empty(result.stderr),
                }),
            },
            Err(ExecError::NotCompiled) => render(false, &ExecuteResponse {
                success: false,
                output: None,
                message: Some(
                    "No compiled output found. Please compile the code first.".to_string(),
                ),
                error: None,
            }),
            Err(e) => render(false, &ExecuteResponse {
                success: false,
                output: None,
                message: Some("Server error during execution".to_string()),
                error: Some(e.to_string()),
            }),
        }
    }

    /// Delete the ephemeral files for an identifier.
    #[tool(description = "Delete the ephemeral files for an identifier")]
    async fn cleanup(
        &self,
        Parameters(params): Parameters<CleanupParams>,
    ) -> Result<CallToolResult, McpError> {
        let _ = self.registry.remove(&params.id).await;
        self.workspace.remove(&params.id).await;
        render(true, &CleanupResponse { success: true })
    }

    /// Start an interactive debug session against a compiled program.
    #[tool(description = "Start a GDB session against a compiled program")]
    async fn debug_start(
        &self,
        Parameters(params): Parameters<DebugStartParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.debugger.start(&params.id).await {
            Ok(session_id) => render(true, &DebugStartResponse {
                success: true,
                session_id: Some(session_id),
                message: "Debug session started".to_string(),
            }),
            Err(e) => render(false, &DebugStartResponse {
                success: false,
                session_id: None,
                message: debug_error_message(&e),
            }),
        }
    }

    /// Send one GDB command and return the settled output.
    #[tool(description = "Send a command to a debug session")]
    async fn debug_send_command(
        &self,
        Parameters(params): Parameters<DebugCommandParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .debugger
            .send_command(&params.session_id, &params.command)
            .await
        {
            Ok(output) => render(true, &DebugCommandResponse {
                success: true,
                output: Some(output),
                command: Some(params.command),
                message: None,
            }),
            Err(e) => render(false, &DebugCommandResponse {
                success: false,
                output: None,
                command: None,
                message: Some(debug_error_message(&e)),
            }),
        }
    }

    /// Snapshot a debug session's liveness and buffered output.
    #[tool(description = "Poll the current state of a debug session")]
    async fn debug_poll(
        &self,
        Parameters(params): Parameters<DebugSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.debugger.poll_state(&params.session_id).await {
            Ok(snapshot) => render(true, &DebugPollResponse {
                success: true,
                is_active: Some(snapshot.is_active),
                output: Some(snapshot.output),
                last_command: snapshot.last_command,
                message: None,
            }),
            Err(e) => render(false, &DebugPollResponse {
                success: false,
                is_active: None,
                output: None,
                last_command: None,
                message: Some(debug_error_message(&e)),
            }),
        }
    }

    /// End a debug session.
    #[tool(description = "End a debug session")]
    async fn debug_end(
        &self,
        Parameters(params): Parameters<DebugSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.debugger.end(&params.session_id).await {
            Ok(()) => render(true, &DebugEndResponse {
                success: true,
                message: "Debug session ended".to_string(),
            }),
            Err(e) => render(false, &DebugEndResponse {
                success: false,
                message: debug_error_message(&e),
            }),
        }
    }
}

#[tool_handler]
impl ServerHandler for PlaygroundServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cpp-playground".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Compile, run and debug C++ programs in an isolated sandbox.\n\
                 \n\
                 Workflow:\n\
                 - compile { code } -> { success, id }\n\
                 - execute { id, input } -> { success, output }\n\
                 - debug_start { id } -> { success, sessionId }\n\
                 - debug_send_command { session_id, command } -> settled output\n\
                 - debug_poll { session_id } -> { isActive, output, lastCommand }\n\
                 - debug_end { session_id }\n\
                 - cleanup { id } when done"
                    .to_string(),
            ),
        }
    }
}

/// Boundary messages for the debug error taxonomy.
fn debug_error_message(error: &DebugError) -> String {
    match error {
        DebugError::NotCompiled => {
            "No compiled output found. Please compile the code first.".to_string()
        }
        DebugError::ToolMissing => {
            "GDB debugger is not installed. Please install GDB to use debugging features."
                .to_string()
        }
        DebugError::SessionNotFound => "Debug session not found".to_string(),
        DebugError::SessionInactive => "Debug session is not active".to_string(),
        DebugError::SpawnFailure(e) => format!("Failed to start debugger: {e}"),
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn render<T: Serialize>(success: bool, body: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string(body)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(if success {
        CallToolResult::success(vec![Content::text(text)])
    } else {
        CallToolResult::error(vec![Content::text(text)])
    })
}

/// Serve the playground server over stdio.
pub async fn serve_stdio(
    config: Config,
    workspace: Workspace,
    backend: Arc<dyn IsolationBackend>,
) -> anyhow::Result<()> {
    let server = PlaygroundServer::new(config, workspace, backend);

    info!("Starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SandboxMode;
    use crate::debugger::StreamKind;
    use async_trait::async_trait;
    use tokio::process::{Child, Command};

    #[derive(Clone)]
    struct MockBackend;

    #[async_trait]
    impl IsolationBackend for MockBackend {
        fn mode(&self) -> SandboxMode {
            SandboxMode::LocalFallback
        }

        fn compile_command(&self, _ws: &Workspace, _id: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "exit 0"]);
            cmd
        }

        fn run_command(&self, ws: &Workspace, id: &str) -> Command {
            Command::new(ws.binary_path(id))
        }

        fn debugger_command(&self, _ws: &Workspace, _sid: &str, _id: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "cat"]);
            cmd
        }

        async fn debugger_available(&self) -> bool {
            true
        }

        async fn kill_execution(&self, _id: &str, child: &mut Child) {
            let _ = child.kill().await;
        }
    }

    fn server() -> (tempfile::TempDir, PlaygroundServer) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().to_path_buf()).unwrap();
        let server = PlaygroundServer::new(Config::default(), ws, Arc::new(MockBackend));
        (dir, server)
    }

    #[tokio::test]
    async fn compile_succeeds() {
        let (_dir, server) = server();
        let result = server
            .compile(Parameters(CompileParams {
                code: "int main() { return 0; }".to_string(),
            }))
            .await
            .unwrap();

        assert!(!result.is_error.unwrap_or(false));
    }

    #[tokio::test]
    async fn execute_unknown_id_is_structured_failure() {
        let (_dir, server) = server();
        let result = server
            .execute(Parameters(ExecuteParams {
                id: "missing".to_string(),
                input: String::new(),
            }))
            .await
            .unwrap();

        assert!(result.is_error.unwrap_or(false));
    }

    #[tokio::test]
    async fn cleanup_always_succeeds() {
        let (_dir, server) = server();
        let result = server
            .cleanup(Parameters(CleanupParams {
                id: "ghost".to_string(),
            }))
            .await
            .unwrap();

        assert!(!result.is_error.unwrap_or(false));
    }

    #[tokio::test]
    async fn debug_poll_unknown_session_is_error() {
        let (_dir, server) = server();
        let result = server
            .debug_poll(Parameters(DebugSessionParams {
                session_id: "nope".to_string(),
            }))
            .await
            .unwrap();

        assert!(result.is_error.unwrap_or(false));
    }

    #[test]
    fn compile_response_shape() {
        let resp = CompileResponse {
            success: true,
            id: Some("abc".to_string()),
            message: "Compilation successful".to_string(),
            error: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"success":true,"id":"abc","message":"Compilation successful"}"#
        );
    }

    #[test]
    fn timeout_message_quotes_configured_limit() {
        let config = Config::default();
        let message = format!(
            "Execution timed out (limit: {} seconds)",
            config.timeout_seconds()
        );
        assert_eq!(message, "Execution timed out (limit: 10 seconds)");
    }

    #[test]
    fn debug_error_messages() {
        assert_eq!(
            debug_error_message(&DebugError::SessionNotFound),
            "Debug session not found"
        );
        assert_eq!(
            debug_error_message(&DebugError::SessionInactive),
            "Debug session is not active"
        );
        assert!(debug_error_message(&DebugError::ToolMissing).contains("GDB"));
        assert!(debug_error_message(&DebugError::NotCompiled).contains("compile the code first"));
    }

    #[test]
    fn output_chunks_serialize_with_stream_tag() {
        let chunk = OutputChunk {
            stream: StreamKind::Stderr,
            content: "warning\n".to_string(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json, r#"{"type":"stderr","content":"warning\n"}"#);
    }

    #[test]
    fn poll_response_uses_camel_case() {
        let resp = DebugPollResponse {
            success: true,
            is_active: Some(true),
            output: Some(vec![]),
            last_command: Some("break main".to_string()),
            message: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"isActive\":true"));
        assert!(json.contains("\"lastCommand\":\"break main\""));
    }
}
