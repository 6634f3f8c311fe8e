//! Typed error taxonomy for the compile, execute and debug pipelines.
//!
//! Every variant is surfaced to the boundary as a structured failure
//! response; nothing is silently swallowed except best-effort file
//! deletion during cleanup, which logs and continues.

use thiserror::Error;

/// Failures of the compile pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The compiler toolchain (or the sandbox wrapping it) could not be
    /// spawned at all.
    #[error("compiler toolchain is not available")]
    ToolMissing,

    /// The compiler ran and rejected the source. Carries the toolchain's
    /// diagnostic output verbatim.
    #[error("compilation failed")]
    DiagnosticFailure(String),

    /// Workspace I/O failed before the toolchain could run.
    #[error("workspace i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the execution pipeline.
///
/// Timeout and non-zero exits are not errors here: they are carried as
/// the exit classification on [`crate::backend::ExecutionResult`].
#[derive(Debug, Error)]
pub enum ExecError {
    /// The identifier has no artifact with status `Compiled`.
    #[error("no compiled binary for this identifier")]
    NotCompiled,

    /// Spawning or wiring the sandboxed process failed.
    #[error("execution i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the debug session state machine.
#[derive(Debug, Error)]
pub enum DebugError {
    /// The identifier has no artifact with status `Compiled`.
    #[error("no compiled binary for this identifier")]
    NotCompiled,

    /// The debugger tool did not answer the per-call availability probe.
    #[error("debugger is not installed")]
    ToolMissing,

    /// No session record for this session identifier.
    #[error("debug session not found")]
    SessionNotFound,

    /// The session exists but its subprocess is no longer accepting
    /// commands.
    #[error("debug session is not active")]
    SessionInactive,

    /// The debugger subprocess could not be spawned.
    #[error("failed to spawn debugger: {0}")]
    SpawnFailure(#[source] std::io::Error),
}
