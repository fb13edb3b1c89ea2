// src/errors.rs

//! Crate-wide error types.
//!
//! - [`EngineError`] covers the resolution core (discovery, execution).
//! - [`NodedagError`] wraps everything the binary and config layers can hit.

use thiserror::Error;

use crate::types::NodeName;

/// Errors raised while resolving a node graph.
///
/// Structural errors (`CycleDetected`, `MissingParameter`, `UnknownNode`) are
/// detected before or while committing a node; `NodeExecutionFailed` comes
/// from a node's own process routine. Cancellation is not an error and is
/// reported through [`crate::engine::RunResult::Cancelled`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("cycle detected: connecting '{from}' into '{to}' closes a loop")]
    CycleDetected { from: NodeName, to: NodeName },

    #[error("node '{node}' has no parameter named '{port}'")]
    MissingParameter { node: NodeName, port: String },

    #[error("node '{node}' failed: {message}")]
    NodeExecutionFailed { node: NodeName, message: String },

    #[error("unknown node: {0}")]
    UnknownNode(NodeName),
}

#[derive(Error, Debug)]
pub enum NodedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Engine error: {0}")]
    EngineError(#[from] EngineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NodedagError>;
