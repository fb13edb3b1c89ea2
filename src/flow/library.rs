// src/flow/library.rs

//! Node kinds and the registry that maps node types to the library that
//! provides them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde_json::json;
use tracing::info;

use crate::exec::ProcessRoutine;
use crate::exec::routine::{after_job, immediate};
use crate::types::{NodeName, NodeOutputs, PortDirection, PortName, Value};

/// Name of the library holding the built-in node kinds.
pub const CORE_LIBRARY: &str = "core";

/// Declared parameter slot of a node kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub name: PortName,
    pub direction: PortDirection,
    pub type_name: String,
    pub default: Option<Value>,
}

/// Snapshot of a node's input and property values handed to its behaviour.
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    pub node: NodeName,
    pub values: IndexMap<PortName, Value>,
}

impl NodeInvocation {
    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port).filter(|v| !v.is_null())
    }

    pub fn require(&self, port: &str) -> Result<&Value> {
        self.get(port)
            .ok_or_else(|| anyhow!("input '{port}' of node '{}' has no value", self.node))
    }

    pub fn number(&self, port: &str) -> Result<f64> {
        let value = self.require(port)?;
        value
            .as_f64()
            .with_context(|| format!("input '{port}' of node '{}' is not a number: {value}", self.node))
    }
}

type Behaviour = Arc<dyn Fn(&NodeInvocation) -> Result<Box<dyn ProcessRoutine>> + Send + Sync>;

fn no_outputs(_: &NodeInvocation) -> Result<Box<dyn ProcessRoutine>> {
    Ok(immediate(|| Ok(NodeOutputs::new())))
}

/// A node type: its ports plus the behaviour that builds a process routine.
#[derive(Clone)]
pub struct NodeKind {
    type_name: String,
    ports: Vec<PortSpec>,
    behaviour: Behaviour,
    always_rerun: bool,
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKind")
            .field("type_name", &self.type_name)
            .field("ports", &self.ports)
            .field("always_rerun", &self.always_rerun)
            .finish_non_exhaustive()
    }
}

impl NodeKind {
    /// A kind with no ports whose routine produces no outputs.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ports: Vec::new(),
            behaviour: Arc::new(no_outputs),
            always_rerun: false,
        }
    }

    pub fn input(self, name: &str, type_name: &str) -> Self {
        self.port(name, PortDirection::Input, type_name, None)
    }

    pub fn output(self, name: &str, type_name: &str) -> Self {
        self.port(name, PortDirection::Output, type_name, None)
    }

    pub fn property(self, name: &str, type_name: &str, default: Value) -> Self {
        self.port(name, PortDirection::Property, type_name, Some(default))
    }

    fn port(
        mut self,
        name: &str,
        direction: PortDirection,
        type_name: &str,
        default: Option<Value>,
    ) -> Self {
        self.ports.push(PortSpec {
            name: name.to_string(),
            direction,
            type_name: type_name.to_string(),
            default,
        });
        self
    }

    /// Behaviour that builds an arbitrary routine.
    pub fn routine<F>(mut self, build: F) -> Self
    where
        F: Fn(&NodeInvocation) -> Result<Box<dyn ProcessRoutine>> + Send + Sync + 'static,
    {
        self.behaviour = Arc::new(build);
        self
    }

    /// Behaviour that computes outputs in a single step.
    pub fn compute<F>(self, compute: F) -> Self
    where
        F: Fn(&NodeInvocation) -> Result<NodeOutputs> + Send + Sync + 'static,
    {
        let compute = Arc::new(compute);
        self.routine(move |inv| {
            let compute = Arc::clone(&compute);
            let inv = inv.clone();
            Ok(immediate(move || compute(&inv)))
        })
    }

    /// Mark the kind as side-effecting: after resolving, its nodes drop back
    /// to `Unresolved` so every run executes them again.
    pub fn always_rerun(mut self) -> Self {
        self.always_rerun = true;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    /// Port with this name and direction. A property and an output may share
    /// a name (e.g. `constant.value`), so lookups are always directional.
    pub fn port_spec(&self, name: &str, direction: PortDirection) -> Option<&PortSpec> {
        self.ports
            .iter()
            .find(|p| p.name == name && p.direction == direction)
    }

    pub fn is_always_rerun(&self) -> bool {
        self.always_rerun
    }

    pub fn start(&self, invocation: &NodeInvocation) -> Result<Box<dyn ProcessRoutine>> {
        (self.behaviour)(invocation)
    }
}

#[derive(Debug, Clone)]
struct RegisteredKind {
    library: String,
    kind: NodeKind,
}

/// Registry of node kinds, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    kinds: IndexMap<String, RegisteredKind>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `core` library.
    pub fn with_core_library() -> Self {
        let mut registry = Self::new();
        for kind in core_kinds() {
            registry.register(CORE_LIBRARY, kind);
        }
        registry
    }

    /// Register `kind` as provided by `library`. A later registration of the
    /// same type name replaces the earlier one.
    pub fn register(&mut self, library: &str, kind: NodeKind) {
        self.kinds.insert(
            kind.type_name.clone(),
            RegisteredKind {
                library: library.to_string(),
                kind,
            },
        );
    }

    pub fn kind(&self, type_name: &str) -> Option<&NodeKind> {
        self.kinds.get(type_name).map(|r| &r.kind)
    }

    pub fn lookup_owner(&self, type_name: &str) -> Option<&str> {
        self.kinds.get(type_name).map(|r| r.library.as_str())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(|s| s.as_str())
    }
}

fn single_output(port: &str, value: Value) -> NodeOutputs {
    let mut out = NodeOutputs::new();
    out.insert(port.to_string(), value);
    out
}

/// Keep integers integral when both operands were integers.
fn number_value(result: f64, integral: bool) -> Value {
    if integral && result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        json!(result as i64)
    } else {
        json!(result)
    }
}

fn is_integral(values: &[&Value]) -> bool {
    values.iter().all(|v| v.is_i64() || v.is_u64())
}

fn core_kinds() -> Vec<NodeKind> {
    vec![
        NodeKind::new("constant")
            .property("value", "any", Value::Null)
            .output("value", "any")
            .compute(|inv| {
                let value = inv.values.get("value").cloned().unwrap_or(Value::Null);
                Ok(single_output("value", value))
            }),
        NodeKind::new("add")
            .input("a", "float")
            .input("b", "float")
            .output("sum", "float")
            .compute(|inv| {
                let integral = is_integral(&[inv.require("a")?, inv.require("b")?]);
                let sum = inv.number("a")? + inv.number("b")?;
                Ok(single_output("sum", number_value(sum, integral)))
            }),
        NodeKind::new("multiply")
            .input("value", "float")
            .property("factor", "float", json!(1))
            .output("result", "float")
            .compute(|inv| {
                let integral = is_integral(&[inv.require("value")?, inv.require("factor")?]);
                let product = inv.number("value")? * inv.number("factor")?;
                Ok(single_output("result", number_value(product, integral)))
            }),
        NodeKind::new("delay")
            .input("value", "any")
            .property("ms", "int", json!(10))
            .output("value", "any")
            .routine(|inv| {
                let ms = inv.get("ms").and_then(Value::as_u64).unwrap_or(10);
                let value = inv.values.get("value").cloned().unwrap_or(Value::Null);
                Ok(after_job(
                    async move { tokio::time::sleep(Duration::from_millis(ms)).await },
                    move || Ok(single_output("value", value)),
                ))
            }),
        NodeKind::new("print")
            .input("value", "any")
            .always_rerun()
            .compute(|inv| {
                let value = inv.values.get("value").cloned().unwrap_or(Value::Null);
                info!(node = %inv.node, %value, "print");
                Ok(NodeOutputs::new())
            }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Step;

    fn invocation(pairs: &[(&str, Value)]) -> NodeInvocation {
        NodeInvocation {
            node: "n".into(),
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    fn run_to_done(mut routine: Box<dyn ProcessRoutine>) -> NodeOutputs {
        loop {
            match routine.step().unwrap() {
                Step::Done(out) => return out,
                Step::Continue | Step::Suspend(_) => {}
            }
        }
    }

    #[test]
    fn core_library_owns_builtin_kinds() {
        let registry = NodeRegistry::with_core_library();
        assert_eq!(registry.lookup_owner("multiply"), Some(CORE_LIBRARY));
        assert_eq!(registry.lookup_owner("nope"), None);
        assert!(registry.kind("print").unwrap().is_always_rerun());
    }

    #[test]
    fn multiply_keeps_integers_integral() {
        let registry = NodeRegistry::with_core_library();
        let kind = registry.kind("multiply").unwrap();
        let routine = kind
            .start(&invocation(&[("value", json!(5)), ("factor", json!(2))]))
            .unwrap();
        assert_eq!(run_to_done(routine)["result"], json!(10));
    }

    #[test]
    fn add_reports_missing_inputs() {
        let registry = NodeRegistry::with_core_library();
        let kind = registry.kind("add").unwrap();
        let mut routine = kind.start(&invocation(&[("a", json!(1))])).unwrap();
        let err = routine.step().unwrap_err();
        assert!(err.to_string().contains("input 'b'"));
    }

    #[tokio::test]
    async fn delay_suspends_on_a_timer() {
        let registry = NodeRegistry::with_core_library();
        let kind = registry.kind("delay").unwrap();
        let mut routine = kind
            .start(&invocation(&[("value", json!("x")), ("ms", json!(1))]))
            .unwrap();
        match routine.step().unwrap() {
            Step::Suspend(job) => job.await,
            other => panic!("expected suspension, got {other:?}"),
        }
        match routine.step().unwrap() {
            Step::Done(out) => assert_eq!(out["value"], json!("x")),
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
