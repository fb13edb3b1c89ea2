// src/exec/routine.rs

//! Resumable node process routines.
//!
//! A routine is a lazy sequence of work units. The driver calls
//! [`ProcessRoutine::step`] repeatedly; each call either finishes a unit
//! ([`Step::Continue`]), parks the routine on external work
//! ([`Step::Suspend`]), or yields the node's outputs ([`Step::Done`]).
//!
//! Suspension hands the driver a [`PendingJob`] future. The driver awaits it
//! alongside the run's cancel token and only steps the routine again once the
//! job resolves, so cancellation is always observed at resumption points.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::types::NodeOutputs;

/// External work a suspended routine is waiting on.
pub type PendingJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Result of advancing a routine by one unit of work.
pub enum Step {
    /// A unit of work finished; step again.
    Continue,
    /// Waiting on external work; step again after the job resolves.
    Suspend(PendingJob),
    /// The routine finished and produced these outputs.
    Done(NodeOutputs),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Continue => f.write_str("Continue"),
            Step::Suspend(_) => f.write_str("Suspend(..)"),
            Step::Done(outputs) => f.debug_tuple("Done").field(outputs).finish(),
        }
    }
}

/// Per-node process routine, created by the host when a node starts.
///
/// Returning an error from `step` fails the node (and the run).
pub trait ProcessRoutine: Send {
    fn step(&mut self) -> Result<Step>;
}

/// Where a focused node's routine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// Focused but not started yet.
    Idle,
    /// Started; the next `step()` can be taken immediately.
    Running,
    /// Parked on a pending job.
    Suspended,
    /// Produced its outputs.
    Done,
    /// Raised an error.
    Failed,
}

/// Routine that computes its outputs in a single step.
pub struct Immediate<F> {
    compute: Option<F>,
}

impl<F> ProcessRoutine for Immediate<F>
where
    F: FnOnce() -> Result<NodeOutputs> + Send,
{
    fn step(&mut self) -> Result<Step> {
        match self.compute.take() {
            Some(compute) => Ok(Step::Done(compute()?)),
            None => anyhow::bail!("routine stepped after completion"),
        }
    }
}

/// Build a routine that runs `compute` on its first step.
pub fn immediate<F>(compute: F) -> Box<dyn ProcessRoutine>
where
    F: FnOnce() -> Result<NodeOutputs> + Send + 'static,
{
    Box::new(Immediate {
        compute: Some(compute),
    })
}

/// Routine that first suspends on a job and then computes its outputs.
pub struct AfterJob<F> {
    job: Option<PendingJob>,
    then: Option<F>,
}

impl<F> ProcessRoutine for AfterJob<F>
where
    F: FnOnce() -> Result<NodeOutputs> + Send,
{
    fn step(&mut self) -> Result<Step> {
        if let Some(job) = self.job.take() {
            return Ok(Step::Suspend(job));
        }
        match self.then.take() {
            Some(then) => Ok(Step::Done(then()?)),
            None => anyhow::bail!("routine stepped after completion"),
        }
    }
}

/// Build a routine that waits for `job` before running `then`.
pub fn after_job<J, F>(job: J, then: F) -> Box<dyn ProcessRoutine>
where
    J: Future<Output = ()> + Send + 'static,
    F: FnOnce() -> Result<NodeOutputs> + Send + 'static,
{
    Box::new(AfterJob {
        job: Some(Box::pin(job)),
        then: Some(then),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(v: i64) -> NodeOutputs {
        let mut out = NodeOutputs::new();
        out.insert("value".into(), json!(v));
        out
    }

    #[test]
    fn immediate_finishes_on_first_step() {
        let mut routine = immediate(|| Ok(outputs(1)));
        match routine.step().unwrap() {
            Step::Done(out) => assert_eq!(out["value"], json!(1)),
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(routine.step().is_err());
    }

    #[test]
    fn after_job_suspends_before_computing() {
        let mut routine = after_job(async {}, || Ok(outputs(2)));
        assert!(matches!(routine.step().unwrap(), Step::Suspend(_)));
        assert!(matches!(routine.step().unwrap(), Step::Done(_)));
    }

    #[test]
    fn errors_propagate_from_compute() {
        let mut routine = immediate(|| anyhow::bail!("boom"));
        let err = routine.step().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
