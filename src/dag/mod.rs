// src/dag/mod.rs

//! Dependency DAG for a single resolution run.
//!
//! - [`graph`] holds the in-degree tracking DAG that is drained as nodes
//!   resolve.
//! - [`discovery`] walks a node host from the requested root and fills the
//!   DAG with every upstream dependency.

pub mod discovery;
pub mod graph;

pub use discovery::{DiscoveryOutcome, discover};
pub use graph::DependencyGraph;
