// src/dag/discovery.rs

//! Dependency discovery.
//!
//! Starting from the requested root, walk input ports depth-first in the
//! host's port order. Every connected upstream node becomes a DAG node with an
//! edge `upstream -> current`, and its own inputs are discovered before the
//! walk moves on to the next port.
//!
//! Cycles are detected against the set of nodes currently on the discovery
//! stack, not against everything seen so far, so diamond fan-in (two inputs
//! sharing one upstream) stays legal.
//!
//! Upstream nodes that are already `Resolved` keep their cached outputs and
//! are not re-executed, but their inputs are still followed (without touching
//! the DAG) so a cycle running through a cached node is reported too.

use std::collections::HashSet;

use indexmap::IndexSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::dag::DependencyGraph;
use crate::errors::EngineError;
use crate::exec::NodeHost;
use crate::types::{NodeName, ResolutionState};

/// How a discovery pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The whole dependency graph of the root is in the DAG.
    Complete,
    /// The run's cancel token fired mid-walk; the DAG is partial.
    Cancelled,
}

/// Populate `dag` with the transitive dependencies of `root`.
///
/// Upstream nodes that are already `Resolved` (from an earlier run) are added
/// so their cached outputs can be propagated. Their own inputs are only
/// checked for cycles; nothing behind them enters the DAG.
pub fn discover<H: NodeHost + ?Sized>(
    host: &H,
    root: &str,
    dag: &mut DependencyGraph,
    cancel: &CancellationToken,
) -> Result<DiscoveryOutcome, EngineError> {
    if !host.contains_node(root) {
        return Err(EngineError::UnknownNode(root.to_string()));
    }

    dag.add_node(root);

    let mut walker = Walker {
        host,
        dag,
        cancel,
        ancestors: IndexSet::new(),
        finished: HashSet::new(),
        checked: HashSet::new(),
    };

    let outcome = walker.visit(root)?;
    debug!(
        root,
        nodes = walker.dag.len(),
        ?outcome,
        "discovery: dependency walk finished"
    );
    Ok(outcome)
}

struct Walker<'a, H: ?Sized> {
    host: &'a H,
    dag: &'a mut DependencyGraph,
    cancel: &'a CancellationToken,
    /// Nodes on the current discovery path, root first.
    ancestors: IndexSet<NodeName>,
    /// Nodes whose inputs have been fully discovered.
    finished: HashSet<NodeName>,
    /// Nodes behind a resolved upstream that were walked for cycles only.
    checked: HashSet<NodeName>,
}

impl<H: NodeHost + ?Sized> Walker<'_, H> {
    fn visit(&mut self, node: &str) -> Result<DiscoveryOutcome, EngineError> {
        self.ancestors.insert(node.to_string());

        for port in self.host.input_ports(node) {
            if self.cancel.is_cancelled() {
                warn!(node, "discovery: cancellation observed; abandoning walk");
                return Ok(DiscoveryOutcome::Cancelled);
            }

            let Some(upstream) = self.host.upstream_of(node, &port) else {
                continue;
            };
            let up = upstream.node;

            if self.ancestors.contains(&up) {
                warn!(from = %up, to = node, "discovery: back-edge closes a cycle");
                return Err(EngineError::CycleDetected {
                    from: up,
                    to: node.to_string(),
                });
            }
            if !self.host.contains_node(&up) {
                return Err(EngineError::UnknownNode(up));
            }

            self.dag.add_node(&up);
            self.dag.add_edge(&up, node)?;
            trace!(from = %up, to = node, port = %port, "discovery: dependency recorded");

            if self.finished.contains(&up) {
                continue;
            }
            if self.host.resolution_state(&up) == ResolutionState::Resolved {
                debug!(node = %up, "discovery: upstream already resolved; reusing its outputs");
                let outcome = self.check(&up)?;
                self.finished.insert(up);
                if outcome == DiscoveryOutcome::Cancelled {
                    return Ok(DiscoveryOutcome::Cancelled);
                }
                continue;
            }

            if self.visit(&up)? == DiscoveryOutcome::Cancelled {
                return Ok(DiscoveryOutcome::Cancelled);
            }
        }

        self.ancestors.shift_remove(node);
        self.finished.insert(node.to_string());
        Ok(DiscoveryOutcome::Complete)
    }

    /// Follow the inputs of `node` looking for a path back onto the discovery
    /// stack. The DAG is left alone.
    fn check(&mut self, node: &str) -> Result<DiscoveryOutcome, EngineError> {
        self.ancestors.insert(node.to_string());

        for port in self.host.input_ports(node) {
            if self.cancel.is_cancelled() {
                warn!(node, "discovery: cancellation observed; abandoning walk");
                return Ok(DiscoveryOutcome::Cancelled);
            }

            let Some(upstream) = self.host.upstream_of(node, &port) else {
                continue;
            };
            let up = upstream.node;

            if self.ancestors.contains(&up) {
                warn!(from = %up, to = node, "discovery: cycle runs through a resolved node");
                return Err(EngineError::CycleDetected {
                    from: up,
                    to: node.to_string(),
                });
            }
            if self.finished.contains(&up) || self.checked.contains(&up) {
                continue;
            }
            if self.check(&up)? == DiscoveryOutcome::Cancelled {
                return Ok(DiscoveryOutcome::Cancelled);
            }
        }

        self.ancestors.shift_remove(node);
        self.checked.insert(node.to_string());
        Ok(DiscoveryOutcome::Complete)
    }
}
