// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod flow;
pub mod logging;
pub mod priority;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, EventFormat};
use crate::config::loader::load_and_validate;
use crate::config::model::WorkflowConfig;
use crate::config::validate::dependency_order;
use crate::engine::{Engine, RunResult};
use crate::events::{ChannelSink, EventSink, NodeEvent, TracingSink};
use crate::flow::{FlowGraph, NodeRegistry};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading
/// - the reference flow graph
/// - the engine and its event stream (JSON lines on stdout, or the log)
/// - optional step-by-step execution
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let workflow_path = PathBuf::from(&args.workflow);
    let cfg = load_and_validate(&workflow_path)
        .with_context(|| format!("failed to load workflow {}", workflow_path.display()))?;

    if !cfg.node.contains_key(&args.target) {
        bail!("target node '{}' is not defined in the workflow", args.target);
    }

    if args.dry_run {
        print_dry_run(&cfg, &args.target);
        return Ok(());
    }

    let mut graph = cfg.build_flow_graph(NodeRegistry::with_core_library())?;

    // Event stream → stdout, unless it goes to the log.
    let (sink, printer): (Arc<dyn EventSink>, Option<JoinHandle<()>>) = match args.events {
        EventFormat::Json => {
            let (sink, mut events) = ChannelSink::channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    print_event(&event);
                }
            });
            let sink: Arc<dyn EventSink> = Arc::new(sink);
            (sink, Some(printer))
        }
        EventFormat::Log => {
            let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
            (sink, None)
        }
    };

    let mut engine = Engine::new(cfg.engine_options(), sink);
    engine.set_paused(args.step);

    // Ctrl-C → cooperative cancellation of the run.
    {
        let cancel = engine.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let result = drive_run(&mut engine, &mut graph, &args.target).await;

    // Dropping the engine closes the event channel so the printer drains.
    drop(engine);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "event printer task failed");
        }
    }

    match result? {
        RunResult::Completed { executed } => {
            info!(node = %args.target, ?executed, "run finished");
            Ok(())
        }
        RunResult::Cancelled => bail!("run of '{}' was cancelled", args.target),
        RunResult::Paused { .. } => bail!("run of '{}' stopped while paused", args.target),
    }
}

async fn drive_run(
    engine: &mut Engine,
    graph: &mut FlowGraph,
    target: &str,
) -> Result<RunResult> {
    let mut result = engine.resolve(graph, target).await?;
    if !matches!(result, RunResult::Paused { .. }) {
        return Ok(result);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let RunResult::Paused { next, .. } = &result {
        eprintln!(
            "paused; next node: {}. Press Enter to continue (EOF runs to the end).",
            next.as_deref().unwrap_or("<none ready>")
        );
        result = match stdin.next_line().await? {
            Some(_) => engine.step(graph).await?,
            None => engine.resume(graph).await?,
        };
    }
    Ok(result)
}

fn print_event(event: &NodeEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to serialize event"),
    }
}

/// Simple dry-run output: nodes, connections and the order a run of
/// `target` would evaluate its dependencies in.
fn print_dry_run(cfg: &WorkflowConfig, target: &str) {
    println!("nodedag dry-run");
    println!("  config.max_concurrency = {}", cfg.config.max_concurrency);
    println!("  config.heuristics = {:?}", cfg.config.heuristics);
    println!("  target = {target}");
    println!();

    println!("nodes ({}):", cfg.node.len());
    for (name, node) in cfg.node.iter() {
        println!("  - {name}");
        println!("      type: {}", node.node_type);
        if let Some([x, y]) = node.position {
            println!("      position: ({x}, {y})");
        }
        for (port, value) in node.params.iter() {
            println!("      {port} = {value}");
        }
    }
    println!();

    println!("connections ({}):", cfg.connection.len());
    for connection in cfg.connection.iter() {
        println!("  {} -> {}", connection.from, connection.to);
    }
    println!();

    match dependency_order(cfg, target) {
        Ok(order) => println!("order ({target} and upstream): {}", order.join(" -> ")),
        Err(node) => println!("cycle detected involving node '{node}'; the run would fail"),
    }

    debug!("dry-run complete (no execution)");
}
