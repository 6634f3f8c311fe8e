//! cpp-playground daemon library
//!
//! This crate provides the core functionality for the cpp-playground daemon:
//! - Sandbox backend probing and selection (Docker vs direct host)
//! - Compile and execution pipelines over per-identifier ephemeral artifacts
//! - Interactive GDB session state machine with poll-based snapshots
//! - MCP server exposing the pipelines as tools

pub mod backend;
pub mod compiler;
pub mod config;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod mcp;
pub mod registry;
pub mod workspace;
