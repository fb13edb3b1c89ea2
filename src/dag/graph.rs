// src/dag/graph.rs

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::errors::EngineError;
use crate::types::NodeName;

/// Dependency graph for a single resolution run.
///
/// Edge direction is "dependency -> dependent": `add_edge(a, b)` means `b`
/// consumes something `a` produces, so `b` cannot run before `a` has been
/// processed.
///
/// Alongside the adjacency we keep an in-degree count per node. The invariant
/// is that `in_degree(n)` always equals the number of `n`'s predecessors that
/// are still present in the graph, so a node is ready exactly when its count
/// is zero.
///
/// Both maps are insertion-ordered so that the ready set comes back in the
/// order nodes were discovered.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    adjacency: IndexMap<NodeName, IndexSet<NodeName>>,
    in_degree: IndexMap<NodeName, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Adding a node that is already present is a no-op.
    pub fn add_node(&mut self, node: &str) {
        if !self.adjacency.contains_key(node) {
            self.adjacency.insert(node.to_string(), IndexSet::new());
            self.in_degree.insert(node.to_string(), 0);
        }
    }

    /// Record that `to` depends on `from`.
    ///
    /// Both endpoints are added if missing. Repeating an existing edge leaves
    /// the counts untouched. An edge that would close a cycle (including a
    /// self-loop) is rejected and the graph is left unchanged.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), EngineError> {
        if from == to || self.reaches(to, from) {
            return Err(EngineError::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.add_node(from);
        self.add_node(to);

        let inserted = self
            .adjacency
            .get_mut(from)
            .map(|succ| succ.insert(to.to_string()))
            .unwrap_or(false);

        if inserted {
            if let Some(count) = self.in_degree.get_mut(to) {
                *count += 1;
            }
            trace!(from, to, "dag: edge added");
        }

        Ok(())
    }

    /// All nodes whose dependencies have all been processed.
    pub fn get_ready_nodes(&self) -> Vec<NodeName> {
        self.in_degree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Remove `node` from the graph, releasing its direct dependents.
    ///
    /// Every node in `node`'s adjacency has its in-degree decremented by one.
    /// Unknown nodes are ignored.
    pub fn mark_processed(&mut self, node: &str) {
        let Some(successors) = self.adjacency.shift_remove(node) else {
            return;
        };
        self.in_degree.shift_remove(node);

        for succ in successors.iter() {
            if let Some(count) = self.in_degree.get_mut(succ) {
                *count = count.saturating_sub(1);
            }
        }

        trace!(node, released = successors.len(), "dag: node processed");
    }

    /// Every node still present in the graph.
    pub fn get_all_nodes(&self) -> Vec<NodeName> {
        self.adjacency.keys().cloned().collect()
    }

    /// Direct dependents of `node` (empty if unknown).
    pub fn successors(&self, node: &str) -> Vec<NodeName> {
        self.adjacency
            .get(node)
            .map(|succ| succ.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn in_degree(&self, node: &str) -> Option<usize> {
        self.in_degree.get(node).copied()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.adjacency.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
        self.in_degree.clear();
    }

    /// Whether `target` is reachable from `start` along existing edges.
    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start];
        let mut seen: IndexSet<&str> = IndexSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(succ) = self.adjacency.get(current) {
                stack.extend(succ.iter().map(|s| s.as_str()));
            }
        }

        false
    }
}
