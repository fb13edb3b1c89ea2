// src/exec/host.rs

//! Node capability protocol.
//!
//! The engine never owns nodes. Everything it needs to know about a node, and
//! every way it can drive one, goes through [`NodeHost`]. Production hosts
//! wrap their own node graph; [`crate::flow::FlowGraph`] is the in-crate
//! reference implementation used by the CLI and the tests.

use anyhow::Result;

use crate::errors::EngineError;
use crate::exec::routine::ProcessRoutine;
use crate::types::{NodeOutputs, PortName, PortRef, Position, ResolutionState, Value};

pub trait NodeHost {
    /// Whether a node with this name exists.
    fn contains_node(&self, node: &str) -> bool;

    fn resolution_state(&self, node: &str) -> ResolutionState;

    fn set_resolution_state(&mut self, node: &str, state: ResolutionState);

    /// Input ports of `node`, in a stable order.
    fn input_ports(&self, node: &str) -> Vec<PortName>;

    /// Source feeding the given input port, if it is connected.
    fn upstream_of(&self, node: &str, port: &str) -> Option<PortRef>;

    /// Every target fed by the given output port.
    fn downstream_of(&self, node: &str, port: &str) -> Vec<PortRef>;

    /// Start the node's process routine from its current input values.
    fn start_process(&mut self, node: &str) -> Result<Box<dyn ProcessRoutine>>;

    /// Output values currently stored on the node.
    fn output_values(&self, node: &str) -> NodeOutputs;

    /// Store produced outputs.
    ///
    /// Must fail with [`EngineError::MissingParameter`] if an output names a
    /// port the node does not have.
    fn set_output_values(&mut self, node: &str, outputs: NodeOutputs) -> Result<(), EngineError>;

    fn clear_output_values(&mut self, node: &str);

    /// Write a propagated value into an input port.
    fn set_input_value(&mut self, node: &str, port: &str, value: Value) -> Result<(), EngineError>;

    /// Layout position, used only by layout-based heuristics.
    fn position(&self, _node: &str) -> Option<Position> {
        None
    }

    fn node_type(&self, node: &str) -> String;

    /// Declared type of a port, if the host tracks one.
    fn port_type(&self, _node: &str, _port: &str) -> Option<String> {
        None
    }

    /// Name of the library that provides `node_type`.
    fn lookup_owner(&self, _node_type: &str) -> Option<String> {
        None
    }
}
