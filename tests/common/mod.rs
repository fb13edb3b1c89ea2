#![allow(dead_code)]

use std::sync::Arc;

use nodedag::engine::{Engine, EngineOptions};
use nodedag::events::{NodeEvent, VecSink};
use nodedag::priority::HeuristicWeights;

pub use nodedag_test_utils::{init_tracing, with_timeout};

/// Engine with FIFO ordering and a recording sink.
pub fn fifo_engine(max_concurrency: usize) -> (Engine, VecSink) {
    let sink = VecSink::new();
    let options = EngineOptions {
        max_concurrency,
        heuristics: HeuristicWeights::none(),
    };
    (Engine::new(options, Arc::new(sink.clone())), sink)
}

/// Compact `kind:node` labels for asserting on event order.
pub fn labels(events: &[NodeEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            let kind = match e {
                NodeEvent::FocusChanged { .. } => "focus",
                NodeEvent::NodeStarted { .. } => "started",
                NodeEvent::NodeFinished { .. } => "finished",
                NodeEvent::NodeResolved { .. } => "resolved",
                NodeEvent::ValueUpdated { .. } => "value",
            };
            format!("{kind}:{}", e.node())
        })
        .collect()
}

/// Only the events of one kind, as `node` names.
pub fn nodes_with(events: &[NodeEvent], kind: &str) -> Vec<String> {
    labels(events)
        .into_iter()
        .filter_map(|l| l.strip_prefix(&format!("{kind}:")).map(str::to_string))
        .collect()
}
