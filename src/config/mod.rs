// src/config/mod.rs

//! Workflow file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate nodes, ports and connections against a node registry
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_with_registry};
pub use model::{ConfigSection, ConnectionConfig, NodeConfig, RawWorkflowConfig, WorkflowConfig};
pub use validate::{dependency_order, validate_config};
