// src/priority/mod.rs

//! Ordering among simultaneously-ready nodes.
//!
//! Ordering here is a soft preference: correctness only requires that a node
//! never starts before its dependencies are processed, which the DAG already
//! guarantees. The queue decides which of several ready nodes goes first.
//!
//! - [`heuristics`] holds the pluggable scoring functions.
//! - [`queue`] holds [`PriorityQueue`], which combines them.

pub mod heuristics;
pub mod queue;

use serde::Deserialize;

pub use heuristics::{DirectSuccessor, DistanceToNode, Heuristic, HeuristicContext, ReadingOrder};
pub use queue::{PriorityQueue, WeightedHeuristic};

/// Weights for the built-in heuristics, as read from `[config.heuristics]`.
///
/// A weight of zero leaves that heuristic out entirely.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub distance_to_node: f64,
    pub direct_successor: f64,
    pub reading_order: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            distance_to_node: 0.5,
            direct_successor: 1.0,
            reading_order: 0.25,
        }
    }
}

impl HeuristicWeights {
    /// All weights zero: the queue degrades to FIFO.
    pub fn none() -> Self {
        Self {
            distance_to_node: 0.0,
            direct_successor: 0.0,
            reading_order: 0.0,
        }
    }

    /// Build a queue with every heuristic whose weight is non-zero.
    pub fn build_queue(&self) -> PriorityQueue {
        let mut queue = PriorityQueue::new();
        if self.direct_successor != 0.0 {
            queue.add_heuristic(Box::new(DirectSuccessor::new()), self.direct_successor);
        }
        if self.distance_to_node != 0.0 {
            queue.add_heuristic(Box::new(DistanceToNode::new()), self.distance_to_node);
        }
        if self.reading_order != 0.0 {
            queue.add_heuristic(Box::new(ReadingOrder::new()), self.reading_order);
        }
        queue
    }
}
