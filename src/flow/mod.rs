// src/flow/mod.rs

//! Reference node host.
//!
//! - [`library`] defines node kinds, the built-in `core` library and the
//!   registry that answers "which library owns this node type".
//! - [`graph`] holds [`FlowGraph`], an in-memory node graph with a connection
//!   table that implements [`crate::exec::NodeHost`].

pub mod graph;
pub mod library;

pub use graph::{Connection, FlowGraph, FlowNode};
pub use library::{CORE_LIBRARY, NodeInvocation, NodeKind, NodeRegistry, PortSpec};
