// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{RawWorkflowConfig, WorkflowConfig};
use crate::config::validate::validate_config;
use crate::errors::Result;
use crate::flow::NodeRegistry;

/// Read and deserialize a workflow file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawWorkflowConfig = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        nodes = config.node.len(),
        connections = config.connection.len(),
        "workflow file parsed"
    );
    Ok(config)
}

/// Load a workflow and validate it against the built-in `core` library.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowConfig> {
    let raw = load_from_path(&path)?;
    WorkflowConfig::try_from(raw)
}

/// Load a workflow and validate it against a custom registry.
pub fn load_with_registry(
    path: impl AsRef<Path>,
    registry: &NodeRegistry,
) -> Result<WorkflowConfig> {
    let raw = load_from_path(&path)?;
    validate_config(&raw, registry)?;
    Ok(WorkflowConfig::new_unchecked(
        raw.config,
        raw.node,
        raw.connection,
    ))
}
