// tests/properties.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use proptest::prelude::*;

use nodedag::engine::{EngineOptions, RunResult};
use nodedag::flow::FlowGraph;
use nodedag::priority::{
    DirectSuccessor, DistanceToNode, Heuristic, HeuristicContext, HeuristicWeights, ReadingOrder,
};
use nodedag::types::{NodeName, Position};
use nodedag_test_utils::builders::FlowGraphBuilder;
use nodedag_test_utils::routines::{RunLog, recording_join_kind};

/// For each node `i`, optional upstreams for its `a` and `b` inputs, always
/// chosen among `0..i` so the graph is acyclic.
fn acyclic_graph_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<(Option<usize>, Option<usize>)>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(
            (proptest::option::of(any::<usize>()), proptest::option::of(any::<usize>())),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (a, b))| {
                    if i == 0 {
                        (None, None)
                    } else {
                        (a.map(|x| x % i), b.map(|x| x % i))
                    }
                })
                .collect()
        })
    })
}

fn build(shape: &[(Option<usize>, Option<usize>)], log: &RunLog) -> FlowGraph {
    let mut builder = FlowGraphBuilder::new().with_kind(recording_join_kind("join", log.clone()));
    for i in 0..shape.len() {
        builder = builder
            .node(&format!("n{i}"), "join")
            .position(&format!("n{i}"), (i % 4) as f64 * 100.0, (i / 4) as f64 * 50.0);
    }
    for (i, (a, b)) in shape.iter().enumerate() {
        if let Some(a) = a {
            builder = builder.connect(&format!("n{a}.out"), &format!("n{i}.a"));
        }
        if let Some(b) = b {
            builder = builder.connect(&format!("n{b}.out"), &format!("n{i}.b"));
        }
    }
    builder.build()
}

/// Indices of the root and everything upstream of it.
fn upstream_closure(shape: &[(Option<usize>, Option<usize>)], root: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        if seen.insert(i) {
            let (a, b) = shape[i];
            stack.extend(a);
            stack.extend(b);
        }
    }
    seen
}

fn run(graph: &mut FlowGraph, root: &str, options: EngineOptions) -> RunResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let sink = nodedag::events::NullSink;
        let mut engine = nodedag::engine::Engine::new(options, std::sync::Arc::new(sink));
        engine.resolve(graph, root).await.unwrap()
    })
}

proptest! {
    #[test]
    fn every_dependency_runs_once_and_before_its_dependents(
        shape in acyclic_graph_strategy(12),
        concurrency in 1usize..4,
        heuristics in prop_oneof![Just(HeuristicWeights::none()), Just(HeuristicWeights::default())],
    ) {
        let log = RunLog::new();
        let mut graph = build(&shape, &log);
        let root = shape.len() - 1;
        let options = EngineOptions { max_concurrency: concurrency, heuristics };

        let result = run(&mut graph, &format!("n{root}"), options);

        let expected: BTreeSet<String> = upstream_closure(&shape, root)
            .into_iter()
            .map(|i| format!("n{i}"))
            .collect();
        let ran = log.entries();
        prop_assert_eq!(ran.len(), expected.len());
        prop_assert_eq!(ran.iter().cloned().collect::<BTreeSet<_>>(), expected);
        prop_assert_eq!(result.executed(), ran.as_slice());

        let order: HashMap<&str, usize> =
            ran.iter().enumerate().map(|(pos, n)| (n.as_str(), pos)).collect();
        for (i, (a, b)) in shape.iter().enumerate() {
            let Some(&at) = order.get(format!("n{i}").as_str()) else { continue };
            for up in a.iter().chain(b.iter()) {
                let up_at = order[format!("n{up}").as_str()];
                prop_assert!(up_at < at, "n{} ran before its upstream n{}", i, up);
            }
        }
    }

    #[test]
    fn batch_scores_match_single_scores(
        positions in proptest::collection::vec(
            proptest::option::of((-500.0f64..500.0, -500.0f64..500.0)),
            1..10,
        ),
        previous in proptest::option::of(0usize..10),
        successor_mask in any::<u16>(),
    ) {
        let candidates: Vec<NodeName> = (0..positions.len()).map(|i| format!("c{i}")).collect();
        let mut position_map: HashMap<NodeName, Position> = HashMap::new();
        for (name, pos) in candidates.iter().zip(&positions) {
            if let Some(pos) = pos {
                position_map.insert(name.clone(), *pos);
            }
        }
        position_map.insert("prev".to_string(), (0.0, 0.0));
        let successors: HashSet<NodeName> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| successor_mask & (1 << i) != 0)
            .map(|(_, c)| c.clone())
            .collect();
        let previous = previous.map(|_| "prev");

        let ctx = HeuristicContext {
            candidates: &candidates,
            previous,
            previous_successors: &successors,
            positions: &position_map,
        };

        let heuristics: Vec<Box<dyn Heuristic>> = vec![
            Box::new(DistanceToNode::new()),
            Box::new(DirectSuccessor::new()),
            Box::new(ReadingOrder::new()),
        ];
        for h in &heuristics {
            let batch = h.calculate_batch(&ctx);
            let single: Vec<f64> = candidates.iter().map(|c| h.calculate_priority(c, &ctx)).collect();
            prop_assert_eq!(batch.len(), single.len());
            for (b, s) in batch.iter().zip(&single) {
                prop_assert!((b - s).abs() < 1e-9, "{}: batch {} != single {}", h.name(), b, s);
                prop_assert!(*b >= 0.0 && *b <= h.max_value());
            }
        }
    }
}
