// src/flow/graph.rs

use anyhow::Result as AnyResult;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::errors::{EngineError, NodedagError, Result};
use crate::exec::{NodeHost, ProcessRoutine};
use crate::flow::library::{NodeInvocation, NodeKind, NodeRegistry};
use crate::types::{
    NodeName, NodeOutputs, PortDirection, PortName, PortRef, Position, ResolutionState, Value,
};

/// A node instance living in a [`FlowGraph`].
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub name: NodeName,
    pub node_type: String,
    pub position: Option<Position>,
    pub state: ResolutionState,
    /// Current input and property values.
    values: IndexMap<PortName, Value>,
    /// Outputs from the last successful run.
    outputs: NodeOutputs,
}

impl FlowNode {
    pub fn value(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    pub fn output(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port)
    }
}

/// Directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from: PortRef,
    pub to: PortRef,
}

/// In-memory node graph with a connection table.
///
/// This is the reference [`NodeHost`]: it owns node instances, their values
/// and the connections between them, and builds process routines through the
/// [`NodeRegistry`].
///
/// Construction enforces the port rules (connections go from an output to an
/// input, and an input has at most one upstream) but deliberately does not
/// reject cycles; those are reported by the engine when a run discovers them.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    registry: NodeRegistry,
    nodes: IndexMap<NodeName, FlowNode>,
    connections: Vec<Connection>,
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new(NodeRegistry::with_core_library())
    }
}

impl FlowGraph {
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry,
            nodes: IndexMap::new(),
            connections: Vec::new(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    /// Create a node of a registered type. Properties start at their
    /// declared defaults.
    pub fn add_node(&mut self, name: &str, node_type: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(NodedagError::ConfigError(format!(
                "node '{name}' already exists"
            )));
        }
        let kind = self.registry.kind(node_type).ok_or_else(|| {
            NodedagError::ConfigError(format!(
                "node '{name}' has unknown type '{node_type}'"
            ))
        })?;

        let values = kind
            .ports()
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();

        self.nodes.insert(
            name.to_string(),
            FlowNode {
                name: name.to_string(),
                node_type: node_type.to_string(),
                position: None,
                state: ResolutionState::Unresolved,
                values,
                outputs: NodeOutputs::new(),
            },
        );
        Ok(())
    }

    pub fn set_position(&mut self, node: &str, position: Position) -> Result<()> {
        self.node_mut(node)?.position = Some(position);
        Ok(())
    }

    /// Set an input or property value directly.
    ///
    /// The node and everything downstream of it go back to `Unresolved`.
    pub fn set_param(&mut self, node: &str, port: &str, value: Value) -> Result<()> {
        let kind = self.kind_of(node).ok_or_else(|| unknown_node(node))?;
        let accepts = kind.port_spec(port, PortDirection::Property).is_some()
            || kind.port_spec(port, PortDirection::Input).is_some();
        if !accepts {
            return Err(NodedagError::ConfigError(format!(
                "node '{node}' has no input or property named '{port}'"
            )));
        }
        self.node_mut(node)?.values.insert(port.to_string(), value);
        self.invalidate(node);
        Ok(())
    }

    /// Connect an output port to an input port.
    ///
    /// The target node and everything downstream of it go back to
    /// `Unresolved`.
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<()> {
        let from_kind = self.kind_of(&from.node).ok_or_else(|| unknown_node(&from.node))?;
        if from_kind.port_spec(&from.port, PortDirection::Output).is_none() {
            return Err(NodedagError::ConfigError(format!(
                "connection source {from} is not an output port"
            )));
        }
        let to_kind = self.kind_of(&to.node).ok_or_else(|| unknown_node(&to.node))?;
        if to_kind.port_spec(&to.port, PortDirection::Input).is_none() {
            return Err(NodedagError::ConfigError(format!(
                "connection target {to} is not an input port"
            )));
        }
        if let Some(existing) = self.connections.iter().find(|c| c.to == to) {
            return Err(NodedagError::ConfigError(format!(
                "input {to} is already connected to {}",
                existing.from
            )));
        }

        debug!(%from, %to, "flow: connection added");
        let target = to.node.clone();
        self.connections.push(Connection { from, to });
        self.invalidate(&target);
        Ok(())
    }

    /// Mark `node` and its transitive downstream nodes `Unresolved`.
    fn invalidate(&mut self, node: &str) {
        let mut pending = IndexSet::from([node.to_string()]);
        let mut idx = 0;
        while let Some(current) = pending.get_index(idx).cloned() {
            idx += 1;
            for c in self.connections.iter().filter(|c| c.from.node == current) {
                pending.insert(c.to.node.clone());
            }
        }

        for name in &pending {
            if let Some(n) = self.nodes.get_mut(name) {
                if n.state == ResolutionState::Resolved {
                    debug!(node = %name, "flow: cached result invalidated");
                    n.state = ResolutionState::Unresolved;
                }
            }
        }
    }

    pub fn node(&self, name: &str) -> Option<&FlowNode> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn input_value(&self, node: &str, port: &str) -> Option<&Value> {
        self.nodes.get(node).and_then(|n| n.value(port))
    }

    pub fn output_value(&self, node: &str, port: &str) -> Option<&Value> {
        self.nodes.get(node).and_then(|n| n.output(port))
    }

    fn kind_of(&self, node: &str) -> Option<&NodeKind> {
        self.nodes
            .get(node)
            .and_then(|n| self.registry.kind(&n.node_type))
    }

    fn node_mut(&mut self, node: &str) -> Result<&mut FlowNode> {
        self.nodes.get_mut(node).ok_or_else(|| unknown_node(node))
    }
}

fn unknown_node(node: &str) -> NodedagError {
    NodedagError::ConfigError(format!("unknown node '{node}'"))
}

impl NodeHost for FlowGraph {
    fn contains_node(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    fn resolution_state(&self, node: &str) -> ResolutionState {
        self.nodes.get(node).map(|n| n.state).unwrap_or_default()
    }

    fn set_resolution_state(&mut self, node: &str, state: ResolutionState) {
        let always_rerun = self.kind_of(node).is_some_and(|k| k.is_always_rerun());
        if let Some(n) = self.nodes.get_mut(node) {
            n.state = if state == ResolutionState::Resolved && always_rerun {
                debug!(node, "flow: side-effecting node returns to Unresolved");
                ResolutionState::Unresolved
            } else {
                state
            };
        }
    }

    fn input_ports(&self, node: &str) -> Vec<PortName> {
        self.kind_of(node)
            .map(|k| {
                k.ports()
                    .iter()
                    .filter(|p| p.direction == PortDirection::Input)
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upstream_of(&self, node: &str, port: &str) -> Option<PortRef> {
        self.connections
            .iter()
            .find(|c| c.to.node == node && c.to.port == port)
            .map(|c| c.from.clone())
    }

    fn downstream_of(&self, node: &str, port: &str) -> Vec<PortRef> {
        self.connections
            .iter()
            .filter(|c| c.from.node == node && c.from.port == port)
            .map(|c| c.to.clone())
            .collect()
    }

    fn start_process(&mut self, node: &str) -> AnyResult<Box<dyn ProcessRoutine>> {
        let flow_node = self
            .nodes
            .get(node)
            .ok_or_else(|| anyhow::anyhow!("unknown node '{node}'"))?;
        let kind = self
            .registry
            .kind(&flow_node.node_type)
            .ok_or_else(|| anyhow::anyhow!("node type '{}' is not registered", flow_node.node_type))?;

        let invocation = NodeInvocation {
            node: node.to_string(),
            values: flow_node.values.clone(),
        };
        kind.start(&invocation)
    }

    fn output_values(&self, node: &str) -> NodeOutputs {
        self.nodes
            .get(node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    fn set_output_values(&mut self, node: &str, outputs: NodeOutputs) -> std::result::Result<(), EngineError> {
        let kind = self
            .kind_of(node)
            .ok_or_else(|| EngineError::UnknownNode(node.to_string()))?;
        if let Some(port) = outputs
            .keys()
            .find(|port| kind.port_spec(port, PortDirection::Output).is_none())
        {
            return Err(EngineError::MissingParameter {
                node: node.to_string(),
                port: port.clone(),
            });
        }

        if let Some(n) = self.nodes.get_mut(node) {
            n.outputs.extend(outputs);
        }
        Ok(())
    }

    fn clear_output_values(&mut self, node: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.outputs.clear();
        }
    }

    fn set_input_value(&mut self, node: &str, port: &str, value: Value) -> std::result::Result<(), EngineError> {
        let has_input = self
            .kind_of(node)
            .ok_or_else(|| EngineError::UnknownNode(node.to_string()))?
            .port_spec(port, PortDirection::Input)
            .is_some();
        if !has_input {
            return Err(EngineError::MissingParameter {
                node: node.to_string(),
                port: port.to_string(),
            });
        }

        if let Some(n) = self.nodes.get_mut(node) {
            n.values.insert(port.to_string(), value);
        }
        Ok(())
    }

    fn position(&self, node: &str) -> Option<Position> {
        self.nodes.get(node).and_then(|n| n.position)
    }

    fn node_type(&self, node: &str) -> String {
        self.nodes
            .get(node)
            .map(|n| n.node_type.clone())
            .unwrap_or_default()
    }

    fn port_type(&self, node: &str, port: &str) -> Option<String> {
        let kind = self.kind_of(node)?;
        [PortDirection::Input, PortDirection::Property, PortDirection::Output]
            .into_iter()
            .find_map(|dir| kind.port_spec(port, dir))
            .map(|p| p.type_name.clone())
    }

    fn lookup_owner(&self, node_type: &str) -> Option<String> {
        self.registry.lookup_owner(node_type).map(str::to_string)
    }
}
