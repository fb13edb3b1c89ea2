// src/config/model.rs

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::errors::{NodedagError, Result};
use crate::flow::{FlowGraph, NodeRegistry};
use crate::priority::HeuristicWeights;
use crate::types::{PortRef, Value};

/// Workflow file exactly as deserialized, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 1
///
/// [config.heuristics]
/// direct_successor = 1.0
///
/// [node.A]
/// type = "constant"
/// position = [0.0, 0.0]
/// params = { value = 5 }
///
/// [node.B]
/// type = "multiply"
///
/// [[connection]]
/// from = "A.value"
/// to = "B.value"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowConfig {
    #[serde(default)]
    pub config: ConfigSection,

    /// All nodes from `[node.<name>]`, keyed by node name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,

    /// All `[[connection]]` entries, in file order.
    #[serde(default)]
    pub connection: Vec<ConnectionConfig>,
}

/// A validated workflow. Only obtainable through `TryFrom<RawWorkflowConfig>`
/// or the loader.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
    pub connection: Vec<ConnectionConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConfigSection {
    /// How many nodes the engine keeps in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// `[config.heuristics]`: weights of the built-in ordering heuristics.
    #[serde(default)]
    pub heuristics: HeuristicWeights,
}

fn default_max_concurrency() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            heuristics: HeuristicWeights::default(),
        }
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Registered node type, e.g. `"multiply"`.
    #[serde(rename = "type")]
    pub node_type: String,

    /// Layout position, used by the ordering heuristics.
    #[serde(default)]
    pub position: Option<[f64; 2]>,

    /// Initial input and property values.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
}

/// `[[connection]]` entry: `"node.port"` on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,
}

impl ConnectionConfig {
    pub fn source(&self) -> Result<PortRef> {
        parse_port_ref(&self.from)
    }

    pub fn target(&self) -> Result<PortRef> {
        parse_port_ref(&self.to)
    }
}

/// Split `"node.port"` at its last dot.
pub fn parse_port_ref(s: &str) -> Result<PortRef> {
    match s.rsplit_once('.') {
        Some((node, port)) if !node.is_empty() && !port.is_empty() => Ok(PortRef::new(node, port)),
        _ => Err(NodedagError::ConfigError(format!(
            "'{s}' is not a port reference of the form \"node.port\""
        ))),
    }
}

impl WorkflowConfig {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        node: BTreeMap<String, NodeConfig>,
        connection: Vec<ConnectionConfig>,
    ) -> Self {
        Self {
            config,
            node,
            connection,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_concurrency: self.config.max_concurrency,
            heuristics: self.config.heuristics,
        }
    }

    /// Instantiate the workflow as a [`FlowGraph`] backed by `registry`.
    pub fn build_flow_graph(&self, registry: NodeRegistry) -> Result<FlowGraph> {
        let mut graph = FlowGraph::new(registry);
        for (name, node) in &self.node {
            graph.add_node(name, &node.node_type)?;
            if let Some([x, y]) = node.position {
                graph.set_position(name, (x, y))?;
            }
            for (port, value) in &node.params {
                graph.set_param(name, port, value.clone())?;
            }
        }
        for connection in &self.connection {
            graph.connect(connection.source()?, connection.target()?)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_refs_split_on_the_last_dot() {
        let r = parse_port_ref("stage.one.value").unwrap();
        assert_eq!(r, PortRef::new("stage.one", "value"));
        assert!(parse_port_ref("nodot").is_err());
        assert!(parse_port_ref(".value").is_err());
        assert!(parse_port_ref("node.").is_err());
    }

    #[test]
    fn sections_default_when_absent() {
        let raw: RawWorkflowConfig = toml::from_str(
            r#"
            [node.A]
            type = "constant"
            "#,
        )
        .unwrap();
        assert_eq!(raw.config, ConfigSection::default());
        assert!(raw.connection.is_empty());
        assert!(raw.node["A"].params.is_empty());
        assert_eq!(raw.node["A"].position, None);
    }
}
