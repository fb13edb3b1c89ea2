// src/engine/context.rs

//! Per-run mutable state.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dag::DependencyGraph;
use crate::exec::{NodeHost, PendingJob, ProcessRoutine, RoutineState};
use crate::priority::PriorityQueue;
use crate::types::{NodeName, NodeOutputs, ResolutionState};

/// Which state-machine phase a run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No run in progress.
    #[default]
    Idle,
    /// Building the DAG.
    EvaluateParameters,
    /// Draining the DAG.
    ExecuteNodes,
    /// The DAG has been fully drained.
    Complete,
}

/// A node selected for resolution, with its suspendable process state.
pub struct Focus {
    pub node: NodeName,
    pub state: RoutineState,
    pub(crate) routine: Option<Box<dyn ProcessRoutine>>,
    pub(crate) job: Option<PendingJob>,
    /// Outputs produced by the routine but not yet committed.
    pub scheduled_value: Option<NodeOutputs>,
}

impl Focus {
    pub fn new(node: impl Into<NodeName>) -> Self {
        Self {
            node: node.into(),
            state: RoutineState::Idle,
            routine: None,
            job: None,
            scheduled_value: None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.state == RoutineState::Suspended
    }
}

impl fmt::Debug for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Focus")
            .field("node", &self.node)
            .field("state", &self.state)
            .field("has_routine", &self.routine.is_some())
            .field("has_job", &self.job.is_some())
            .field("scheduled_value", &self.scheduled_value)
            .finish()
    }
}

/// The full mutable state of one resolution run.
///
/// One context belongs to one run at a time. Nodes themselves live in the
/// host and survive [`ResolutionContext::reset`].
#[derive(Debug)]
pub struct ResolutionContext {
    pub(crate) dag: DependencyGraph,
    pub(crate) root: Option<NodeName>,
    pub(crate) foci: Vec<Focus>,
    pub(crate) paused: bool,
    /// Set when a node completed while paused; the driver yields control.
    pub(crate) pause_pending: bool,
    pub(crate) phase: Phase,
    pub(crate) cancel: CancellationToken,
    pub(crate) queue: PriorityQueue,
    /// Nodes whose routines ran in this run, in completion order.
    pub(crate) executed: Vec<NodeName>,
}

impl ResolutionContext {
    pub fn new(queue: PriorityQueue) -> Self {
        Self {
            dag: DependencyGraph::new(),
            root: None,
            foci: Vec::new(),
            paused: false,
            pause_pending: false,
            phase: Phase::Idle,
            cancel: CancellationToken::new(),
            queue,
            executed: Vec::new(),
        }
    }

    pub fn dag(&self) -> &DependencyGraph {
        &self.dag
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn foci(&self) -> &[Focus] {
        &self.foci
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn executed(&self) -> &[NodeName] {
        &self.executed
    }

    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether a run has started and not yet completed.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::EvaluateParameters | Phase::ExecuteNodes)
    }

    pub(crate) fn is_focused(&self, node: &str) -> bool {
        self.foci.iter().any(|f| f.node == node)
    }

    /// Prepare for a new run rooted at `root`.
    pub(crate) fn begin(&mut self, root: &str) {
        self.reset();
        self.root = Some(root.to_string());
        self.phase = Phase::EvaluateParameters;
    }

    /// Whether the driver has nothing to do until a suspended job resolves.
    pub(crate) fn should_wait(&self, max_concurrency: usize) -> bool {
        if self.foci.is_empty() || !self.foci.iter().all(Focus::is_suspended) {
            return false;
        }
        if self.foci.len() >= max_concurrency {
            return true;
        }
        !self
            .dag
            .get_ready_nodes()
            .iter()
            .any(|n| !self.is_focused(n))
    }

    /// Put every node with in-flight work back to `Unresolved`.
    pub(crate) fn demote_in_flight<H: NodeHost + ?Sized>(&self, host: &mut H) {
        for focus in &self.foci {
            if host.resolution_state(&focus.node) == ResolutionState::Resolving {
                debug!(node = %focus.node, "returning interrupted node to Unresolved");
                host.set_resolution_state(&focus.node, ResolutionState::Unresolved);
            }
        }
    }

    /// Clear the DAG and per-node transient buffers.
    ///
    /// Suspended routines and pending jobs are dropped. A cancel token that
    /// has fired is replaced so the next run starts clean; the paused flag and
    /// the queue's heuristics are kept.
    pub fn reset(&mut self) {
        self.dag.clear();
        self.root = None;
        self.foci.clear();
        self.pause_pending = false;
        self.phase = Phase::Idle;
        self.queue.clear();
        self.executed.clear();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }
}
