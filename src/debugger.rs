//! Interactive GDB session state machine.
//!
//! Each session owns exactly one debugger subprocess. Inbound output is
//! consumed by detached reader tasks that append chunks, tagged by
//! stream, to the session buffer; a waiter task owns the child handle,
//! flips the session to `Ended` the moment the process exits and carries
//! the forced-kill trigger used by `end()`. Callers observe a session
//! exclusively through point-in-time snapshots (`poll_state`) and the
//! post-settle buffer returned by `send_command`.
//!
//! The debugger's output is not framed or correlated to a command by any
//! sentinel: a command's reply is whatever accumulated during the settle
//! window after it was written. Callers must read one command's result
//! before issuing the next, or outputs may interleave and be
//! misattributed. That ordering is a caller contract, not an internal
//! lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::IsolationBackend;
use crate::config::Config;
use crate::error::DebugError;
use crate::registry::ArtifactRegistry;
use crate::workspace::Workspace;

/// Commands issued right after the debugger starts: no pager prompts,
/// structured value printing.
const BASELINE_COMMANDS: [&str; 2] = ["set pagination off", "set print pretty on"];

/// Lifecycle of a debug session.
///
/// `Active` jumps straight to `Ended` on unexpected subprocess
/// termination, bypassing `Ending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Active,
    Ending,
    Ended,
}

/// Origin stream of one output chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One chunk of debugger output, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    #[serde(rename = "type")]
    pub stream: StreamKind,
    pub content: String,
}

/// Snapshot returned by `poll_state`.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub is_active: bool,
    pub output: Vec<OutputChunk>,
    pub last_command: Option<String>,
}

/// Session state shared with the reader and waiter tasks.
struct SessionShared {
    state: Mutex<SessionState>,
    output: Mutex<Vec<OutputChunk>>,
    last_command: Mutex<Option<String>>,
}

/// A live debug session bound to one compiled artifact.
pub struct DebugSession {
    pub id: String,
    pub artifact_id: String,
    stdin: Mutex<ChildStdin>,
    shared: Arc<SessionShared>,
    /// Consumed by `end()`. The kill routes through the waiter task that
    /// owns this session's child, so it can never hit a process spawned
    /// later under a reused identifier; if the child exits before the
    /// grace period the receiver is gone and the send is a no-op.
    kill_trigger: Mutex<Option<oneshot::Sender<()>>>,
}

/// Manages the lifecycle of interactive debug sessions.
///
/// Thread-safe: one `RwLock` for the session map, per-session mutexes
/// for the outbound pipe and the shared buffer. Command issuance within
/// a session is serialized by the caller per the module contract.
pub struct DebugSessionManager {
    workspace: Workspace,
    registry: Arc<ArtifactRegistry>,
    backend: Arc<dyn IsolationBackend>,
    config: Config,
    sessions: RwLock<HashMap<String, Arc<DebugSession>>>,
}

impl DebugSessionManager {
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
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn a debugger attached to the compiled artifact `artifact_id`
    /// and return the new session identifier.
    ///
    /// Requires the artifact to be `Compiled` and the debugger tool to
    /// answer its availability probe; neither failure spawns a process.
    pub async fn start(&self, artifact_id: &str) -> Result<String, DebugError> {
        if self.registry.get_compiled(artifact_id).await.is_none() {
            return Err(DebugError::NotCompiled);
        }
        if !self.backend.debugger_available().await {
            return Err(DebugError::ToolMissing);
        }

        let session_id = Uuid::new_v4().to_string();
        let mut cmd = self
            .backend
            .debugger_command(&self.workspace, &session_id, artifact_id);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(DebugError::SpawnFailure)?;

        let stdin = child.stdin.take().ok_or_else(|| pipe_gone("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| pipe_gone("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| pipe_gone("stderr"))?;

        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState::Starting),
            output: Mutex::new(Vec::new()),
            last_command: Mutex::new(None),
        });

        spawn_reader(Arc::clone(&shared), stdout, StreamKind::Stdout);
        spawn_reader(Arc::clone(&shared), stderr, StreamKind::Stderr);

        // The waiter owns the child: it reaps on natural exit, performs
        // the forced kill when end()'s grace period fires, and flips the
        // session to Ended either way so the very next poll sees it.
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        {
            let shared = Arc::clone(&shared);
            let sid = session_id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => {
                        debug!(session = %sid, ?status, "Debugger exited");
                    }
                    Ok(()) = &mut kill_rx => {
                        debug!(session = %sid, "Grace period elapsed, killing debugger");
                        let _ = child.kill().await;
                    }
                }
                *shared.state.lock().await = SessionState::Ended;
            });
        }

        *shared.state.lock().await = SessionState::Active;

        let session = Arc::new(DebugSession {
            id: session_id.clone(),
            artifact_id: artifact_id.to_string(),
            stdin: Mutex::new(stdin),
            shared,
            kill_trigger: Mutex::new(Some(kill_tx)),
        });
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);

        info!(session = %session_id, artifact = %artifact_id, "Debug session started");

        for setup in BASELINE_COMMANDS {
            if let Err(e) = self.send_command(&session_id, setup).await {
                warn!(session = %session_id, error = %e, "Baseline debugger setup failed");
            }
        }

        Ok(session_id)
    }

    /// Write one command to the debugger and return the output that
    /// accumulated during the settle window.
    ///
    /// Clears any unread output from the previous command first; each
    /// call's snapshot reflects only what arrived after its own write.
    pub async fn send_command(
        &self,
        session_id: &str,
        command: &str,
    ) -> Result<Vec<OutputChunk>, DebugError> {
        let session = self
            .get(session_id)
            .await
            .ok_or(DebugError::SessionNotFound)?;
        if *session.shared.state.lock().await != SessionState::Active {
            return Err(DebugError::SessionInactive);
        }

        session.shared.output.lock().await.clear();

        {
            let mut stdin = session.stdin.lock().await;
            // A closed pipe means the subprocess is gone; the waiter task
            // flips the state, this call just reports it
            stdin
                .write_all(format!("{command}\n").as_bytes())
                .await
                .map_err(|_| DebugError::SessionInactive)?;
            stdin.flush().await.map_err(|_| DebugError::SessionInactive)?;
        }
        *session.shared.last_command.lock().await = Some(command.to_string());

        tokio::time::sleep(self.config.settle_delay).await;

        let output = session.shared.output.lock().await.clone();
        Ok(output)
    }

    /// Read-only point-in-time snapshot of a session.
    ///
    /// Polling this is the caller's sole mechanism for discovering
    /// unsolicited termination: an unexpected subprocess death is
    /// visible on the very next call.
    pub async fn poll_state(&self, session_id: &str) -> Result<SessionSnapshot, DebugError> {
        let session = self
            .get(session_id)
            .await
            .ok_or(DebugError::SessionNotFound)?;

        let state = *session.shared.state.lock().await;
        let output = session.shared.output.lock().await.clone();
        let last_command = session.shared.last_command.lock().await.clone();
        Ok(SessionSnapshot {
            is_active: state == SessionState::Active,
            output,
            last_command,
        })
    }

    /// End a session: ask the debugger to quit, arm the forced kill, and
    /// drop the session record.
    ///
    /// The record is removed unconditionally before returning, whether or
    /// not the subprocess has actually exited; the forced-kill timer runs
    /// detached so this call returns promptly.
    pub async fn end(&self, session_id: &str) -> Result<(), DebugError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or(DebugError::SessionNotFound)?;

        let mut state = session.shared.state.lock().await;
        if *state == SessionState::Active {
            *state = SessionState::Ending;
            drop(state);

            // Quit plus the confirmation GDB may ask for
            {
                let mut stdin = session.stdin.lock().await;
                let _ = stdin.write_all(b"quit\ny\n").await;
                let _ = stdin.flush().await;
            }

            if let Some(kill_tx) = session.kill_trigger.lock().await.take() {
                let grace = self.config.kill_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    // No-op if the waiter already saw the process exit
                    let _ = kill_tx.send(());
                });
            }
        }

        info!(session = %session_id, "Debug session ended");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Option<Arc<DebugSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Number of live session records.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn pipe_gone(which: &str) -> DebugError {
    DebugError::SpawnFailure(std::io::Error::other(format!(
        "debugger {which} handle unavailable"
    )))
}

fn spawn_reader<R>(shared: Arc<SessionShared>, mut pipe: R, stream: StreamKind)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let content = String::from_utf8_lossy(&buf[..n]).into_owned();
                    shared
                        .output
                        .lock()
                        .await
                        .push(OutputChunk { stream, content });
                }
            }
        }
    });
}
