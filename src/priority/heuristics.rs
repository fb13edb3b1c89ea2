// src/priority/heuristics.rs

//! Scoring heuristics for ordering simultaneously-ready nodes.
//!
//! Every heuristic scores a candidate on its own `[0, max_value]` scale
//! (higher runs sooner). Scores can depend on the whole candidate set, so the
//! context always carries it; [`Heuristic::calculate_batch`] must agree with
//! calling [`Heuristic::calculate_priority`] once per candidate.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::{NodeName, Position};

/// Everything a heuristic may look at when scoring.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicContext<'a> {
    /// The full set of nodes currently competing.
    pub candidates: &'a [NodeName],
    /// The node executed most recently in this run.
    pub previous: Option<&'a str>,
    /// Direct graph successors of `previous`, captured when it completed.
    pub previous_successors: &'a HashSet<NodeName>,
    /// Known layout positions.
    pub positions: &'a HashMap<NodeName, Position>,
}

impl<'a> HeuristicContext<'a> {
    fn position_of(&self, node: &str) -> Option<Position> {
        self.positions.get(node).copied()
    }

    fn previous_position(&self) -> Option<Position> {
        self.previous.and_then(|p| self.position_of(p))
    }
}

pub trait Heuristic: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Upper bound of this heuristic's scores.
    fn max_value(&self) -> f64;

    fn calculate_priority(&self, candidate: &str, ctx: &HeuristicContext<'_>) -> f64;

    /// Score every candidate in `ctx.candidates`, in order.
    fn calculate_batch(&self, ctx: &HeuristicContext<'_>) -> Vec<f64> {
        ctx.candidates
            .iter()
            .map(|c| self.calculate_priority(c, ctx))
            .collect()
    }
}

/// Min-max range over the metric values of a candidate set.
///
/// Scores are `max_value * (1 - normalized)`, so the smallest metric gets the
/// full score. A set with fewer than two measurable candidates, or where all
/// metrics are equal, is degenerate and everyone gets the neutral mid-scale
/// score. Candidates with no metric get the neutral score as well.
struct InverseRange {
    bounds: Option<(f64, f64)>,
    max_value: f64,
}

impl InverseRange {
    fn new(
        ctx: &HeuristicContext<'_>,
        max_value: f64,
        metric: impl Fn(&str) -> Option<f64>,
    ) -> Self {
        if ctx.candidates.len() < 2 {
            return Self {
                bounds: None,
                max_value,
            };
        }

        let values: Vec<f64> = ctx.candidates.iter().filter_map(|c| metric(c.as_str())).collect();
        if values.len() < 2 {
            return Self {
                bounds: None,
                max_value,
            };
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bounds = if max > min { Some((min, max)) } else { None };

        Self { bounds, max_value }
    }

    fn neutral(&self) -> f64 {
        self.max_value / 2.0
    }

    fn score(&self, value: Option<f64>) -> f64 {
        match (self.bounds, value) {
            (Some((min, max)), Some(v)) => {
                let normalized = ((v - min) / (max - min)).clamp(0.0, 1.0);
                self.max_value * (1.0 - normalized)
            }
            _ => self.neutral(),
        }
    }
}

fn squared_distance(a: Position, b: Position) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

/// Prefers candidates laid out close to the previously executed node.
#[derive(Debug, Clone, Copy)]
pub struct DistanceToNode {
    max_value: f64,
}

impl DistanceToNode {
    pub const DEFAULT_MAX: f64 = 10.0;

    pub fn new() -> Self {
        Self {
            max_value: Self::DEFAULT_MAX,
        }
    }

    pub fn with_max_value(max_value: f64) -> Self {
        Self { max_value }
    }

    fn range(&self, ctx: &HeuristicContext<'_>) -> Option<(InverseRange, Position)> {
        let origin = ctx.previous_position()?;
        let range = InverseRange::new(ctx, self.max_value, |c| {
            ctx.position_of(c).map(|p| squared_distance(p, origin))
        });
        Some((range, origin))
    }
}

impl Default for DistanceToNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Heuristic for DistanceToNode {
    fn name(&self) -> &'static str {
        "distance_to_node"
    }

    fn max_value(&self) -> f64 {
        self.max_value
    }

    fn calculate_priority(&self, candidate: &str, ctx: &HeuristicContext<'_>) -> f64 {
        match self.range(ctx) {
            Some((range, origin)) => {
                range.score(ctx.position_of(candidate).map(|p| squared_distance(p, origin)))
            }
            None => self.max_value / 2.0,
        }
    }

    fn calculate_batch(&self, ctx: &HeuristicContext<'_>) -> Vec<f64> {
        match self.range(ctx) {
            Some((range, origin)) => ctx
                .candidates
                .iter()
                .map(|c| range.score(ctx.position_of(c).map(|p| squared_distance(p, origin))))
                .collect(),
            None => vec![self.max_value / 2.0; ctx.candidates.len()],
        }
    }
}

/// Prefers candidates that directly consume the previous node's outputs.
#[derive(Debug, Clone, Copy)]
pub struct DirectSuccessor {
    max_value: f64,
}

impl DirectSuccessor {
    pub const DEFAULT_MAX: f64 = 10.0;

    pub fn new() -> Self {
        Self {
            max_value: Self::DEFAULT_MAX,
        }
    }

    pub fn with_max_value(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl Default for DirectSuccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Heuristic for DirectSuccessor {
    fn name(&self) -> &'static str {
        "direct_successor"
    }

    fn max_value(&self) -> f64 {
        self.max_value
    }

    fn calculate_priority(&self, candidate: &str, ctx: &HeuristicContext<'_>) -> f64 {
        if ctx.previous.is_some() && ctx.previous_successors.contains(candidate) {
            self.max_value
        } else {
            0.0
        }
    }
}

/// Prefers candidates nearer the top-left of the layout.
#[derive(Debug, Clone, Copy)]
pub struct ReadingOrder {
    max_value: f64,
}

impl ReadingOrder {
    pub const DEFAULT_MAX: f64 = 10.0;

    pub fn new() -> Self {
        Self {
            max_value: Self::DEFAULT_MAX,
        }
    }

    pub fn with_max_value(max_value: f64) -> Self {
        Self { max_value }
    }

    fn range(&self, ctx: &HeuristicContext<'_>) -> InverseRange {
        InverseRange::new(ctx, self.max_value, |c| {
            ctx.position_of(c).map(|(x, y)| y + x)
        })
    }
}

impl Default for ReadingOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl Heuristic for ReadingOrder {
    fn name(&self) -> &'static str {
        "reading_order"
    }

    fn max_value(&self) -> f64 {
        self.max_value
    }

    fn calculate_priority(&self, candidate: &str, ctx: &HeuristicContext<'_>) -> f64 {
        self.range(ctx)
            .score(ctx.position_of(candidate).map(|(x, y)| y + x))
    }

    fn calculate_batch(&self, ctx: &HeuristicContext<'_>) -> Vec<f64> {
        let range = self.range(ctx);
        ctx.candidates
            .iter()
            .map(|c| range.score(ctx.position_of(c).map(|(x, y)| y + x)))
            .collect()
    }
}
