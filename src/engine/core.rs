// src/engine/core.rs

//! Pure core of the resolution engine.
//!
//! The states in this module are synchronous: they build the DAG, pick ready
//! nodes, step process routines and commit their outputs. Whenever every
//! active routine is parked on a pending job they return control, and the
//! async shell ([`crate::engine::runtime`]) awaits the jobs.
//!
//! The core never sleeps, spawns or awaits, so it can be driven to
//! completion in unit tests for any graph whose routines do not suspend.

use tracing::{debug, info, trace, warn};

use crate::dag::{DiscoveryOutcome, discover};
use crate::engine::context::{Focus, Phase, ResolutionContext};
use crate::engine::fsm::{State, Transition};
use crate::errors::EngineError;
use crate::events::{EventSink, NodeEvent};
use crate::exec::{NodeHost, RoutineState, Step};
use crate::types::{NodeOutputs, ResolutionState, value_type_name};

/// Everything a state needs during one update.
pub struct RunCtx<'a, H: ?Sized> {
    pub ctx: &'a mut ResolutionContext,
    pub host: &'a mut H,
    pub sink: &'a dyn EventSink,
    pub max_concurrency: usize,
}

pub type EngineTransition<'a, H> = Transition<RunCtx<'a, H>, EngineError>;

/// Build the DAG for the run's root. Entered once per run.
#[derive(Debug)]
pub struct EvaluateParameters;

/// Drain the DAG: focus ready nodes, step their routines, commit outputs.
#[derive(Debug)]
pub struct ExecuteNodes;

/// The DAG is empty.
#[derive(Debug)]
pub struct Complete;

impl<'a, H: NodeHost + ?Sized> State<RunCtx<'a, H>, EngineError> for EvaluateParameters {
    fn name(&self) -> &'static str {
        "evaluate_parameters"
    }

    fn on_enter(&mut self, run: &mut RunCtx<'a, H>) -> EngineTransition<'a, H> {
        run.ctx.phase = Phase::EvaluateParameters;
        let Some(root) = run.ctx.root.clone() else {
            return Ok(Some(Box::new(Complete)));
        };

        // The requested node always runs again, even if it resolved before.
        run.host
            .set_resolution_state(&root, ResolutionState::Unresolved);

        match discover(&*run.host, &root, &mut run.ctx.dag, &run.ctx.cancel)? {
            DiscoveryOutcome::Complete => {
                info!(
                    root = %root,
                    nodes = run.ctx.dag.len(),
                    "dependency graph built"
                );
                Ok(Some(Box::new(ExecuteNodes)))
            }
            // The shell notices the fired token and abandons the run.
            DiscoveryOutcome::Cancelled => Ok(None),
        }
    }

    fn on_update(&mut self, _run: &mut RunCtx<'a, H>) -> EngineTransition<'a, H> {
        Ok(Some(Box::new(ExecuteNodes)))
    }
}

impl<'a, H: NodeHost + ?Sized> State<RunCtx<'a, H>, EngineError> for ExecuteNodes {
    fn name(&self) -> &'static str {
        "execute_nodes"
    }

    fn on_enter(&mut self, run: &mut RunCtx<'a, H>) -> EngineTransition<'a, H> {
        run.ctx.phase = Phase::ExecuteNodes;
        Ok(None)
    }

    fn on_update(&mut self, run: &mut RunCtx<'a, H>) -> EngineTransition<'a, H> {
        if run.ctx.cancel.is_cancelled() {
            return Ok(None);
        }
        if run.ctx.dag.is_empty() && run.ctx.foci.is_empty() {
            return Ok(Some(Box::new(Complete)));
        }

        enqueue_ready(run);
        fill_foci(run);

        let mut kept = Vec::with_capacity(run.ctx.foci.len());
        let mut result = Ok(None);
        let mut halted = false;

        for mut focus in std::mem::take(&mut run.ctx.foci) {
            if halted || focus.is_suspended() {
                kept.push(focus);
                continue;
            }
            match advance(run, &mut focus) {
                Ok(Advance::Completed) => {
                    if run.ctx.paused {
                        run.ctx.pause_pending = true;
                        halted = true;
                    }
                }
                Ok(Advance::Parked) => kept.push(focus),
                Ok(Advance::Cancelled) => {
                    kept.push(focus);
                    halted = true;
                }
                Err(err) => {
                    kept.push(focus);
                    result = Err(err);
                    halted = true;
                }
            }
        }

        run.ctx.foci = kept;
        result
    }
}

impl<'a, H: NodeHost + ?Sized> State<RunCtx<'a, H>, EngineError> for Complete {
    fn name(&self) -> &'static str {
        "complete"
    }

    fn on_enter(&mut self, run: &mut RunCtx<'a, H>) -> EngineTransition<'a, H> {
        run.ctx.phase = Phase::Complete;
        info!(
            root = run.ctx.root.as_deref().unwrap_or_default(),
            executed = run.ctx.executed.len(),
            "resolution complete"
        );
        Ok(None)
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// How far one focus got during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    /// Outputs committed, node marked processed.
    Completed,
    /// Routine is waiting on a pending job.
    Parked,
    /// The cancel token fired before the outputs were committed.
    Cancelled,
}

/// Offer every ready, not yet focused node to the priority queue.
fn enqueue_ready<H: NodeHost + ?Sized>(run: &mut RunCtx<'_, H>) {
    for node in run.ctx.dag.get_ready_nodes() {
        if run.ctx.is_focused(&node) || run.ctx.queue.contains(&node) {
            continue;
        }
        let position = run.host.position(&node);
        if run.ctx.queue.add_node(&node, position) {
            trace!(node = %node, "node ready");
        }
    }
}

/// Pull nodes from the queue until the concurrency limit is reached.
fn fill_foci<H: NodeHost + ?Sized>(run: &mut RunCtx<'_, H>) {
    let limit = run.max_concurrency.max(1);
    while run.ctx.foci.len() < limit {
        let Some(node) = run.ctx.queue.get_next_node() else {
            break;
        };
        debug!(node = %node, "focus changed");
        run.sink.emit(NodeEvent::FocusChanged { node: node.clone() });
        run.ctx.foci.push(Focus::new(node));
    }
}

/// Drive one focus as far as it can go without awaiting.
fn advance<H: NodeHost + ?Sized>(
    run: &mut RunCtx<'_, H>,
    focus: &mut Focus,
) -> Result<Advance, EngineError> {
    if focus.state == RoutineState::Idle {
        if run.host.resolution_state(&focus.node) == ResolutionState::Resolved {
            debug!(node = %focus.node, "node already resolved; propagating cached outputs");
            let outputs = run.host.output_values(&focus.node);
            propagate(run, &focus.node, &outputs)?;
            finish(run, &focus.node);
            return Ok(Advance::Completed);
        }
        start(run, focus)?;
    }

    if focus.state == RoutineState::Running {
        loop {
            if run.ctx.cancel.is_cancelled() {
                return Ok(Advance::Cancelled);
            }
            let Some(routine) = focus.routine.as_mut() else {
                break;
            };
            match routine.step() {
                Ok(Step::Continue) => continue,
                Ok(Step::Suspend(job)) => {
                    trace!(node = %focus.node, "routine suspended on a pending job");
                    focus.job = Some(job);
                    focus.state = RoutineState::Suspended;
                    return Ok(Advance::Parked);
                }
                Ok(Step::Done(outputs)) => {
                    focus.scheduled_value = Some(outputs);
                    focus.state = RoutineState::Done;
                    break;
                }
                Err(err) => {
                    focus.state = RoutineState::Failed;
                    warn!(node = %focus.node, error = %format!("{err:#}"), "node routine failed");
                    return Err(EngineError::NodeExecutionFailed {
                        node: focus.node.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }
    }

    if focus.state != RoutineState::Done {
        return Ok(Advance::Parked);
    }
    if run.ctx.cancel.is_cancelled() {
        return Ok(Advance::Cancelled);
    }

    let outputs = focus.scheduled_value.take().unwrap_or_default();
    focus.routine = None;
    commit(run, &focus.node, outputs)?;
    Ok(Advance::Completed)
}

fn start<H: NodeHost + ?Sized>(
    run: &mut RunCtx<'_, H>,
    focus: &mut Focus,
) -> Result<(), EngineError> {
    let node = focus.node.clone();
    run.host.clear_output_values(&node);
    run.sink.emit(NodeEvent::NodeStarted { node: node.clone() });
    run.host
        .set_resolution_state(&node, ResolutionState::Resolving);

    let routine = run.host.start_process(&node).map_err(|err| {
        focus.state = RoutineState::Failed;
        EngineError::NodeExecutionFailed {
            node: node.clone(),
            message: format!("{err:#}"),
        }
    })?;
    debug!(node = %node, "process routine started");
    focus.routine = Some(routine);
    focus.state = RoutineState::Running;
    Ok(())
}

/// Store outputs, announce them, push them downstream and retire the node.
fn commit<H: NodeHost + ?Sized>(
    run: &mut RunCtx<'_, H>,
    node: &str,
    outputs: NodeOutputs,
) -> Result<(), EngineError> {
    run.host.set_output_values(node, outputs.clone())?;

    let node_type = run.host.node_type(node);
    let owner = run.host.lookup_owner(&node_type);
    run.sink.emit(NodeEvent::NodeFinished {
        node: node.to_string(),
    });
    run.sink.emit(NodeEvent::NodeResolved {
        node: node.to_string(),
        node_type,
        owner,
        outputs: outputs.clone(),
    });
    run.host
        .set_resolution_state(node, ResolutionState::Resolved);
    info!(node, outputs = outputs.len(), "node resolved");

    propagate(run, node, &outputs)?;
    run.ctx.executed.push(node.to_string());
    finish(run, node);
    Ok(())
}

/// Push every output value into each connected downstream input.
fn propagate<H: NodeHost + ?Sized>(
    run: &mut RunCtx<'_, H>,
    node: &str,
    outputs: &NodeOutputs,
) -> Result<(), EngineError> {
    for (port, value) in outputs {
        for target in run.host.downstream_of(node, port) {
            run.host
                .set_input_value(&target.node, &target.port, value.clone())?;
            let value_type = run
                .host
                .port_type(&target.node, &target.port)
                .unwrap_or_else(|| value_type_name(value).to_string());
            trace!(from = %format!("{node}.{port}"), to = %target, "value propagated");
            run.sink.emit(NodeEvent::ValueUpdated {
                node: target.node,
                port: target.port,
                value_type,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// Remove a node from the DAG and let the queue re-score around it.
fn finish<H: NodeHost + ?Sized>(run: &mut RunCtx<'_, H>, node: &str) {
    let successors = run.ctx.dag.successors(node);
    run.ctx.dag.mark_processed(node);
    run.ctx.queue.update_on_node_complete(node, successors);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::fsm::StateMachine;
    use crate::events::VecSink;
    use crate::flow::FlowGraph;
    use crate::priority::PriorityQueue;
    use crate::types::PortRef;

    fn chain() -> FlowGraph {
        let mut g = FlowGraph::default();
        g.add_node("a", "constant").unwrap();
        g.set_param("a", "value", json!(4)).unwrap();
        g.add_node("b", "multiply").unwrap();
        g.set_param("b", "factor", json!(3)).unwrap();
        g.connect(PortRef::new("a", "value"), PortRef::new("b", "value"))
            .unwrap();
        g
    }

    fn drain(
        ctx: &mut ResolutionContext,
        host: &mut FlowGraph,
        sink: &VecSink,
    ) -> Result<(), EngineError> {
        let mut run = RunCtx {
            ctx,
            host,
            sink,
            max_concurrency: 1,
        };
        let mut machine: StateMachine<RunCtx<'_, FlowGraph>, EngineError> =
            StateMachine::start(Box::new(EvaluateParameters), &mut run)?;
        while !machine.is_terminal() {
            machine.update(&mut run)?;
        }
        Ok(())
    }

    #[test]
    fn core_drains_a_synchronous_chain() {
        let mut host = chain();
        let sink = VecSink::new();
        let mut ctx = ResolutionContext::new(PriorityQueue::new());
        ctx.begin("b");

        drain(&mut ctx, &mut host, &sink).unwrap();

        assert_eq!(ctx.phase(), Phase::Complete);
        assert!(ctx.dag().is_empty());
        assert_eq!(ctx.executed(), ["a", "b"]);
        assert_eq!(host.output_value("b", "result"), Some(&json!(12)));
        assert_eq!(sink.started_nodes(), vec!["a", "b"]);
    }

    #[test]
    fn resolved_upstream_is_propagated_without_rerunning() {
        let mut host = chain();
        let sink = VecSink::new();
        let mut ctx = ResolutionContext::new(PriorityQueue::new());
        ctx.begin("b");
        drain(&mut ctx, &mut host, &sink).unwrap();
        sink.clear();

        ctx.begin("b");
        drain(&mut ctx, &mut host, &sink).unwrap();

        assert_eq!(sink.started_nodes(), vec!["b"]);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            NodeEvent::ValueUpdated { node, port, .. } if node == "b" && port == "value"
        )));
    }

    #[test]
    fn commit_emits_finished_before_resolved() {
        let mut host = chain();
        let sink = VecSink::new();
        let mut ctx = ResolutionContext::new(PriorityQueue::new());
        ctx.begin("a");
        drain(&mut ctx, &mut host, &sink).unwrap();

        let kinds: Vec<&'static str> = sink
            .events()
            .iter()
            .map(|e| match e {
                NodeEvent::FocusChanged { .. } => "focus",
                NodeEvent::NodeStarted { .. } => "started",
                NodeEvent::NodeFinished { .. } => "finished",
                NodeEvent::NodeResolved { .. } => "resolved",
                NodeEvent::ValueUpdated { .. } => "value",
            })
            .collect();
        assert_eq!(kinds, vec!["focus", "started", "finished", "resolved", "value"]);
    }
}
