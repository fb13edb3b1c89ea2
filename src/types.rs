// src/types.rs

//! Shared vocabulary types for nodes, ports and values.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Canonical node name type used throughout the engine.
pub type NodeName = String;

/// Canonical port (parameter) name type.
pub type PortName = String;

/// Values carried between ports.
pub type Value = serde_json::Value;

/// Output values produced by one node, keyed by output port, in the order the
/// node produced them.
pub type NodeOutputs = IndexMap<PortName, Value>;

/// Layout coordinates of a node in the host's editor space.
pub type Position = (f64, f64);

/// Lifecycle of a node within a run.
///
/// Within a single run states only move forward. A node with side effects may
/// push itself back to `Unresolved` after running so the next run executes it
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    #[default]
    Unresolved,
    Resolving,
    Resolved,
}

/// Direction of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    Property,
}

/// One end of a connection: a node plus one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeName,
    pub port: PortName,
}

impl PortRef {
    pub fn new(node: impl Into<NodeName>, port: impl Into<PortName>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Short type label for a value, used in `ValueUpdated` notifications when
/// the host has no declared port type.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
