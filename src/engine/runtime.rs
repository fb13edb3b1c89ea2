// src/engine/runtime.rs

use std::fmt;
use std::future::{Future, poll_fn};
use std::sync::Arc;
use std::task::Poll;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::events::EventSink;
use crate::exec::{NodeHost, RoutineState};

use super::context::{Phase, ResolutionContext};
use super::core::{EvaluateParameters, ExecuteNodes, RunCtx};
use super::fsm::StateMachine;
use super::{EngineOptions, RunResult};

/// Resolves nodes of a [`NodeHost`] on demand.
///
/// This is the async shell around the synchronous core states: it updates the
/// state machine until every active routine is parked on a pending job, then
/// awaits those jobs while watching the run's cancel token.
pub struct Engine {
    ctx: ResolutionContext,
    options: EngineOptions,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("ctx", &self.ctx)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(options: EngineOptions, sink: Arc<dyn EventSink>) -> Self {
        let queue = options.heuristics.build_queue();
        Self {
            ctx: ResolutionContext::new(queue),
            options,
            sink,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.ctx
    }

    /// Token that cancels the current (or next) run when fired.
    ///
    /// A fired token is replaced when the run it cancelled is torn down, so
    /// take a fresh handle for every run.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Ask the current run to stop at its next cancellation point.
    pub fn request_cancel(&self) {
        info!("cancellation requested");
        self.ctx.cancel.cancel();
    }

    /// While paused, a run stops after each node completes and waits for
    /// [`Engine::step`] or [`Engine::resume`].
    pub fn set_paused(&mut self, paused: bool) {
        self.ctx.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.paused
    }

    /// Abandon any in-flight run and clear the context.
    pub fn reset<H: NodeHost + ?Sized>(&mut self, host: &mut H) {
        self.ctx.demote_in_flight(host);
        self.ctx.reset();
    }

    /// Resolve `root` and everything it depends on.
    ///
    /// `root` is always executed again. Upstream nodes that are already
    /// resolved are not; their stored outputs are pushed downstream instead.
    pub async fn resolve<H: NodeHost + ?Sized>(
        &mut self,
        host: &mut H,
        root: &str,
    ) -> Result<RunResult, EngineError> {
        if self.ctx.is_running() {
            warn!(
                previous = self.ctx.root().unwrap_or_default(),
                "abandoning unfinished run"
            );
            self.ctx.demote_in_flight(host);
        }
        if self.ctx.cancel.is_cancelled() {
            info!(root, "run cancelled before it started");
            self.ctx.reset();
            return Ok(RunResult::Cancelled);
        }

        info!(root, "resolving node");
        self.ctx.begin(root);
        self.drive(host).await
    }

    /// Run a paused resolution until one more node completes.
    pub async fn step<H: NodeHost + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<RunResult, EngineError> {
        if !self.ctx.is_running() {
            warn!("step requested with no run in progress");
            return Ok(RunResult::Completed {
                executed: Vec::new(),
            });
        }
        let paused = self.ctx.paused;
        self.ctx.paused = true;
        let result = self.drive(host).await;
        self.ctx.paused = paused;
        result
    }

    /// Clear the paused flag and run the current resolution to the end.
    pub async fn resume<H: NodeHost + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<RunResult, EngineError> {
        self.ctx.paused = false;
        if !self.ctx.is_running() {
            warn!("resume requested with no run in progress");
            return Ok(RunResult::Completed {
                executed: Vec::new(),
            });
        }
        self.drive(host).await
    }

    async fn drive<H: NodeHost + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<RunResult, EngineError> {
        self.ctx.pause_pending = false;
        let max_concurrency = self.options.max_concurrency;
        let mut run = RunCtx {
            ctx: &mut self.ctx,
            host,
            sink: self.sink.as_ref(),
            max_concurrency,
        };

        let started: Result<StateMachine<RunCtx<'_, H>, EngineError>, EngineError> =
            match run.ctx.phase {
                Phase::EvaluateParameters => {
                    StateMachine::start(Box::new(EvaluateParameters), &mut run)
                }
                _ => Ok(StateMachine::resume(Box::new(ExecuteNodes))),
            };
        let mut machine = match started {
            Ok(machine) => machine,
            Err(err) => return Err(fail(&mut run, err)),
        };

        loop {
            if run.ctx.cancel.is_cancelled() {
                return Ok(cancelled(&mut run));
            }
            if machine.is_terminal() {
                break;
            }

            if let Err(err) = machine.update(&mut run) {
                return Err(fail(&mut run, err));
            }

            if run.ctx.cancel.is_cancelled() {
                return Ok(cancelled(&mut run));
            }
            if run.ctx.pause_pending {
                run.ctx.pause_pending = false;
                let next = run.ctx.queue.peek_next_node().map(str::to_string);
                debug!(?next, "run paused");
                return Ok(RunResult::Paused {
                    executed: run.ctx.executed.clone(),
                    next,
                });
            }
            if run.ctx.should_wait(max_concurrency) && !wait_for_job(run.ctx).await {
                return Ok(cancelled(&mut run));
            }
        }

        let executed = std::mem::take(&mut run.ctx.executed);
        Ok(RunResult::Completed { executed })
    }
}

/// Await the first pending job to finish. Returns `false` if the run was
/// cancelled first.
async fn wait_for_job(ctx: &mut ResolutionContext) -> bool {
    let cancel = ctx.cancel.clone();
    let woken = {
        let foci = &mut ctx.foci;
        let ready = poll_fn(|cx| {
            for (idx, focus) in foci.iter_mut().enumerate() {
                if let Some(job) = focus.job.as_mut() {
                    if job.as_mut().poll(cx).is_ready() {
                        return Poll::Ready(idx);
                    }
                }
            }
            Poll::Pending
        });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            idx = ready => Some(idx),
        }
    };

    match woken {
        Some(idx) => {
            let focus = &mut ctx.foci[idx];
            debug!(node = %focus.node, "pending job finished; resuming routine");
            focus.job = None;
            focus.state = RoutineState::Running;
            true
        }
        None => false,
    }
}

fn cancelled<H: NodeHost + ?Sized>(run: &mut RunCtx<'_, H>) -> RunResult {
    warn!(
        root = run.ctx.root().unwrap_or_default(),
        in_flight = run.ctx.foci.len(),
        "run cancelled"
    );
    run.ctx.demote_in_flight(&mut *run.host);
    run.ctx.reset();
    RunResult::Cancelled
}

fn fail<H: NodeHost + ?Sized>(run: &mut RunCtx<'_, H>, err: EngineError) -> EngineError {
    warn!(error = %err, "run failed");
    run.ctx.demote_in_flight(&mut *run.host);
    run.ctx.reset();
    err
}
