// src/engine/mod.rs

//! Resolution engine.
//!
//! A run moves through three states:
//! - `EvaluateParameters`: discover the root's dependencies into a DAG;
//! - `ExecuteNodes`: drain the DAG in priority order, stepping each node's
//!   process routine and pushing its outputs downstream;
//! - `Complete`: the DAG is empty.
//!
//! The synchronous states live in [`core`] on top of the generic harness in
//! [`fsm`]; per-run data lives in [`context`]. The async shell that awaits
//! suspended routines and honours cancellation is [`runtime::Engine`].

use crate::priority::HeuristicWeights;
use crate::types::NodeName;

pub mod context;
pub mod core;
pub mod fsm;
pub mod runtime;

pub use context::{Focus, Phase, ResolutionContext};
pub use runtime::Engine;

/// Engine options shared by every run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// How many nodes may be in flight at once.
    pub max_concurrency: usize,
    pub heuristics: HeuristicWeights,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            heuristics: HeuristicWeights::default(),
        }
    }
}

/// How a call to the engine ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// The DAG was drained. `executed` lists nodes whose routines ran, in
    /// completion order.
    Completed { executed: Vec<NodeName> },
    /// A node completed while the engine was paused. `next` is the node the
    /// queue would pick next, if one is already ready.
    Paused {
        executed: Vec<NodeName>,
        next: Option<NodeName>,
    },
    /// The run was cancelled; no outputs of interrupted nodes were committed.
    Cancelled,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed { .. })
    }

    /// Nodes executed so far; empty for a cancelled run.
    pub fn executed(&self) -> &[NodeName] {
        match self {
            RunResult::Completed { executed } | RunResult::Paused { executed, .. } => executed,
            RunResult::Cancelled => &[],
        }
    }
}
