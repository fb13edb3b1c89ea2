//! Scripted node kinds for driving the engine through specific paths.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use nodedag::exec::routine::after_job;
use nodedag::flow::NodeKind;
use nodedag::types::NodeOutputs;
use serde_json::Value;
use tokio::sync::Notify;

/// Shared, cloneable record of which nodes ran, in order.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node: &str) {
        self.entries.lock().unwrap().push(node.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, node: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|n| *n == node).count()
    }
}

fn out(value: Value) -> NodeOutputs {
    let mut outputs = NodeOutputs::new();
    outputs.insert("out".to_string(), value);
    outputs
}

/// Ports `in` (input) and `out` (output). Records the node name in `log` and
/// passes `in` through to `out` (null when unconnected).
pub fn recording_kind(type_name: &str, log: RunLog) -> NodeKind {
    NodeKind::new(type_name)
        .input("in", "any")
        .output("out", "any")
        .compute(move |inv| {
            log.record(&inv.node);
            Ok(out(inv.values.get("in").cloned().unwrap_or(Value::Null)))
        })
}

/// Ports `a`, `b` (inputs) and `out`. Records the node name; `out` is the
/// list of both inputs.
pub fn recording_join_kind(type_name: &str, log: RunLog) -> NodeKind {
    NodeKind::new(type_name)
        .input("a", "any")
        .input("b", "any")
        .output("out", "any")
        .compute(move |inv| {
            log.record(&inv.node);
            let a = inv.values.get("a").cloned().unwrap_or(Value::Null);
            let b = inv.values.get("b").cloned().unwrap_or(Value::Null);
            Ok(out(Value::Array(vec![a, b])))
        })
}

/// Like [`recording_kind`], but the routine suspends until `gate` is
/// notified. A gate that is never opened keeps the node parked forever.
pub fn gated_kind(type_name: &str, log: RunLog, gate: Arc<Notify>) -> NodeKind {
    NodeKind::new(type_name)
        .input("in", "any")
        .output("out", "any")
        .routine(move |inv| {
            log.record(&inv.node);
            let gate = Arc::clone(&gate);
            let value = inv.values.get("in").cloned().unwrap_or(Value::Null);
            Ok(after_job(
                async move { gate.notified().await },
                move || Ok(out(value)),
            ))
        })
}

/// A kind whose routine always fails with `message`.
pub fn failing_kind(type_name: &str, message: &str) -> NodeKind {
    let message = message.to_string();
    NodeKind::new(type_name)
        .input("in", "any")
        .output("out", "any")
        .compute(move |_| Err(anyhow!("{message}")))
}

/// A kind that reports a value for an output port it never declared.
pub fn undeclared_output_kind(type_name: &str) -> NodeKind {
    NodeKind::new(type_name)
        .output("out", "any")
        .compute(|_| {
            let mut outputs = NodeOutputs::new();
            outputs.insert("ghost".to_string(), Value::from(1));
            Ok(outputs)
        })
}
