use nodedag::flow::{FlowGraph, NodeKind, NodeRegistry};
use nodedag::types::PortRef;
use serde_json::Value;

/// Builder for `FlowGraph` to simplify test setup.
///
/// Every call panics on invalid input; tests want the failure at the line
/// that built the bad graph.
pub struct FlowGraphBuilder {
    graph: FlowGraph,
}

impl FlowGraphBuilder {
    /// Graph backed by the built-in `core` library.
    pub fn new() -> Self {
        Self {
            graph: FlowGraph::default(),
        }
    }

    pub fn with_registry(registry: NodeRegistry) -> Self {
        Self {
            graph: FlowGraph::new(registry),
        }
    }

    /// Register an extra node kind under the `test` library.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.graph.registry_mut().register("test", kind);
        self
    }

    pub fn node(mut self, name: &str, node_type: &str) -> Self {
        self.graph
            .add_node(name, node_type)
            .unwrap_or_else(|e| panic!("add_node({name}, {node_type}): {e}"));
        self
    }

    /// A `constant` node holding `value`.
    pub fn constant(self, name: &str, value: Value) -> Self {
        self.node(name, "constant").param(name, "value", value)
    }

    pub fn param(mut self, node: &str, port: &str, value: Value) -> Self {
        self.graph
            .set_param(node, port, value)
            .unwrap_or_else(|e| panic!("set_param({node}.{port}): {e}"));
        self
    }

    pub fn position(mut self, node: &str, x: f64, y: f64) -> Self {
        self.graph
            .set_position(node, (x, y))
            .unwrap_or_else(|e| panic!("set_position({node}): {e}"));
        self
    }

    /// Connect `"node.port"` to `"node.port"`.
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.graph
            .connect(port_ref(from), port_ref(to))
            .unwrap_or_else(|e| panic!("connect({from} -> {to}): {e}"));
        self
    }

    pub fn build(self) -> FlowGraph {
        self.graph
    }
}

impl Default for FlowGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn port_ref(s: &str) -> PortRef {
    let (node, port) = s
        .rsplit_once('.')
        .unwrap_or_else(|| panic!("'{s}' is not of the form node.port"));
    PortRef::new(node, port)
}

/// `constant(value) -> multiply(factor) -> multiply(factor) ...`, with `len`
/// multiply stages named `s1..=sN`. The constant is `s0`.
pub fn multiply_chain(len: usize, value: i64, factor: i64) -> FlowGraph {
    let mut builder = FlowGraphBuilder::new().constant("s0", Value::from(value));
    for i in 1..=len {
        let name = format!("s{i}");
        let from = if i == 1 {
            "s0.value".to_string()
        } else {
            format!("s{}.result", i - 1)
        };
        builder = builder
            .node(&name, "multiply")
            .param(&name, "factor", Value::from(factor))
            .connect(&from, &format!("{name}.value"));
    }
    builder.build()
}
