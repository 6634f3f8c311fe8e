//! cpp-playground daemon
//!
//! MCP server that compiles, runs and debugs submitted C++ programs
//! inside a Docker sandbox, falling back to direct host execution when
//! Docker is unavailable.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cpp_playground_daemon::{backend, config::Config, mcp, workspace::Workspace};

#[derive(Parser, Debug)]
#[command(name = "cpp-playground-daemon")]
#[command(about = "MCP server for sandboxed C++ compilation, execution and debugging")]
struct Args {
    /// Run in stdio mode (for MCP clients)
    #[arg(long)]
    stdio: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for MCP protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let workspace = Workspace::new(config.workdir.clone())
        .context("Failed to prepare the workspace directory")?;

    // Sandbox mode is fixed here for the process lifetime
    let backend = backend::probe(&config).await;

    info!(
        mode = ?backend.mode(),
        workdir = %workspace.root().display(),
        "Daemon initialized"
    );

    if args.stdio {
        mcp::serve_stdio(config, workspace, backend).await?;
    } else {
        anyhow::bail!("Only --stdio mode is currently supported");
    }

    Ok(())
}
