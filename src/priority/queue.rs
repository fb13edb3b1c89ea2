// src/priority/queue.rs

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::priority::heuristics::{Heuristic, HeuristicContext};
use crate::types::{NodeName, Position};

/// A heuristic together with its weight in the combined score.
#[derive(Debug)]
pub struct WeightedHeuristic {
    pub heuristic: Box<dyn Heuristic>,
    pub weight: f64,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    name: NodeName,
    score: f64,
    /// Insertion sequence, used to keep equal scores in FIFO order.
    seq: u64,
}

/// Ordered set of ready nodes waiting to be focused.
///
/// Semantics:
/// - Nodes are kept sorted by combined score, highest first. Equal scores
///   keep insertion order, so with no heuristics the queue is plain FIFO.
/// - The combined score is the weighted sum of each heuristic's score divided
///   by that heuristic's `max_value`, so weights compare heuristics on a
///   common `[0, 1]` scale.
/// - Scores are recomputed whenever the candidate set changes or a node
///   completes (the "previous node" moves).
#[derive(Debug, Default)]
pub struct PriorityQueue {
    heuristics: Vec<WeightedHeuristic>,
    entries: Vec<QueueEntry>,
    positions: HashMap<NodeName, Position>,
    previous: Option<NodeName>,
    previous_successors: HashSet<NodeName>,
    next_seq: u64,
}

impl PriorityQueue {
    /// Queue without heuristics (FIFO).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn Heuristic>, weight: f64) -> Self {
        self.add_heuristic(heuristic, weight);
        self
    }

    pub fn add_heuristic(&mut self, heuristic: Box<dyn Heuristic>, weight: f64) {
        debug!(heuristic = heuristic.name(), weight, "priority queue: heuristic registered");
        self.heuristics.push(WeightedHeuristic { heuristic, weight });
        self.rescore();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Queue a ready node. Returns `false` if it was already queued.
    ///
    /// `position` is remembered for layout-based heuristics, including after
    /// the node leaves the queue (it may become the "previous" node).
    pub fn add_node(&mut self, name: &str, position: Option<Position>) -> bool {
        if let Some(pos) = position {
            self.positions.insert(name.to_string(), pos);
        }
        if self.contains(name) {
            return false;
        }

        self.entries.push(QueueEntry {
            name: name.to_string(),
            score: 0.0,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.rescore();
        true
    }

    /// Pop the highest-priority node.
    pub fn get_next_node(&mut self) -> Option<NodeName> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries.remove(0);
        trace!(node = %entry.name, score = entry.score, "priority queue: popped");
        Some(entry.name)
    }

    /// Highest-priority node without removing it.
    pub fn peek_next_node(&self) -> Option<&str> {
        self.entries.first().map(|e| e.name.as_str())
    }

    /// Drop a node from the queue. Returns `false` if it was not queued.
    pub fn remove_node(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        let removed = self.entries.len() != before;
        if removed {
            self.rescore();
        }
        removed
    }

    /// Record that `name` just finished and re-score the remaining nodes.
    ///
    /// `successors` are `name`'s direct dependents in the run's graph,
    /// captured before it was marked processed.
    pub fn update_on_node_complete(
        &mut self,
        name: &str,
        successors: impl IntoIterator<Item = NodeName>,
    ) {
        self.entries.retain(|e| e.name != name);
        self.previous = Some(name.to_string());
        self.previous_successors = successors.into_iter().collect();
        self.rescore();
    }

    /// Current combined scores, in queue order.
    pub fn scores(&self) -> Vec<(NodeName, f64)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.score))
            .collect()
    }

    /// Forget all queued nodes and run history; heuristics are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.previous = None;
        self.previous_successors.clear();
        self.next_seq = 0;
    }

    fn rescore(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let candidates: Vec<NodeName> = self.entries.iter().map(|e| e.name.clone()).collect();
        let ctx = HeuristicContext {
            candidates: &candidates,
            previous: self.previous.as_deref(),
            previous_successors: &self.previous_successors,
            positions: &self.positions,
        };

        let mut combined = vec![0.0; candidates.len()];
        for wh in &self.heuristics {
            let max = wh.heuristic.max_value();
            if max <= 0.0 || wh.weight == 0.0 {
                continue;
            }
            for (total, score) in combined.iter_mut().zip(wh.heuristic.calculate_batch(&ctx)) {
                *total += wh.weight * score / max;
            }
        }

        for (entry, score) in self.entries.iter_mut().zip(combined) {
            entry.score = score;
        }

        self.entries
            .sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::heuristics::{DirectSuccessor, ReadingOrder};

    #[test]
    fn without_heuristics_queue_is_fifo() {
        let mut q = PriorityQueue::new();
        q.add_node("B", None);
        q.add_node("A", None);
        q.add_node("C", None);
        assert_eq!(q.get_next_node().as_deref(), Some("B"));
        assert_eq!(q.get_next_node().as_deref(), Some("A"));
        assert_eq!(q.get_next_node().as_deref(), Some("C"));
        assert_eq!(q.get_next_node(), None);
    }

    #[test]
    fn add_node_twice_is_ignored() {
        let mut q = PriorityQueue::new();
        assert!(q.add_node("A", None));
        assert!(!q.add_node("A", None));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_node_drops_entry() {
        let mut q = PriorityQueue::new();
        q.add_node("A", None);
        q.add_node("B", None);
        assert!(q.remove_node("A"));
        assert!(!q.remove_node("A"));
        assert_eq!(q.peek_next_node(), Some("B"));
    }

    #[test]
    fn completion_rescores_towards_successors() {
        let mut q = PriorityQueue::new().with_heuristic(Box::new(DirectSuccessor::new()), 1.0);
        q.add_node("X", None);
        q.add_node("Y", None);
        assert_eq!(q.peek_next_node(), Some("X"));

        q.update_on_node_complete("P", vec!["Y".to_string()]);
        assert_eq!(q.peek_next_node(), Some("Y"));
        assert_eq!(q.scores(), vec![("Y".to_string(), 1.0), ("X".to_string(), 0.0)]);
    }

    #[test]
    fn reading_order_sorts_by_layout() {
        let mut q = PriorityQueue::new().with_heuristic(Box::new(ReadingOrder::new()), 1.0);
        q.add_node("far", Some((100.0, 100.0)));
        q.add_node("near", Some((0.0, 0.0)));
        q.add_node("mid", Some((50.0, 0.0)));
        assert_eq!(q.get_next_node().as_deref(), Some("near"));
        assert_eq!(q.get_next_node().as_deref(), Some("mid"));
        assert_eq!(q.get_next_node().as_deref(), Some("far"));
    }
}
