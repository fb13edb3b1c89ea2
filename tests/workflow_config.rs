// tests/workflow_config.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use nodedag::config::{dependency_order, load_and_validate, load_from_path, load_with_registry};
use nodedag::engine::Engine;
use nodedag::errors::NodedagError;
use nodedag::events::VecSink;
use nodedag::flow::NodeRegistry;
use nodedag_test_utils::routines::{RunLog, recording_kind};

type TestResult = Result<(), Box<dyn Error>>;

const WORKFLOW: &str = r#"
[config]
max_concurrency = 2

[config.heuristics]
distance_to_node = 1.0
direct_successor = 1.0
reading_order = 0.0

[node.A]
type = "constant"
position = [0.0, 0.0]
params = { value = 5 }

[node.B]
type = "multiply"
position = [200.0, 0.0]
params = { factor = 2 }

[node.C]
type = "multiply"
position = [400.0, 0.0]

[[connection]]
from = "A.value"
to = "B.value"

[[connection]]
from = "B.result"
to = "C.value"
"#;

fn write_workflow(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("workflow.toml");
    fs::write(&path, contents).expect("write workflow");
    path
}

#[tokio::test]
async fn loaded_workflow_resolves_end_to_end() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    let path = write_workflow(&dir, WORKFLOW);

    let cfg = load_and_validate(&path)?;
    let options = cfg.engine_options();
    assert_eq!(options.max_concurrency, 2);
    assert_eq!(options.heuristics.reading_order, 0.0);

    let mut graph = cfg.build_flow_graph(NodeRegistry::with_core_library())?;
    assert_eq!(graph.node("B").and_then(|n| n.position), Some((200.0, 0.0)));

    let sink = VecSink::new();
    let mut engine = Engine::new(options, Arc::new(sink.clone()));
    let result = with_timeout(engine.resolve(&mut graph, "C")).await?;

    assert_eq!(result.executed(), ["A", "B", "C"]);
    assert_eq!(graph.output_value("C", "result"), Some(&json!(10)));
    assert_eq!(dependency_order(&cfg, "C")?, vec!["A", "B", "C"]);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, NodedagError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(&dir, "[node.A\ntype = ");
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, NodedagError::TomlError(_)));
}

#[test]
fn invalid_workflow_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_workflow(
        &dir,
        r#"
        [node.A]
        type = "constant"

        [[connection]]
        from = "A.value"
        to = "Missing.value"
        "#,
    );
    let err = load_and_validate(&path).unwrap_err();
    match err {
        NodedagError::ConfigError(msg) => assert!(msg.contains("unknown node 'Missing'"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn custom_registries_validate_their_own_kinds() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_workflow(
        &dir,
        r#"
        [node.R]
        type = "rec"
        params = { in = "payload" }
        "#,
    );

    // Unknown to the core library...
    assert!(load_and_validate(&path).is_err());

    // ...but fine once the kind is registered.
    let mut registry = NodeRegistry::with_core_library();
    registry.register("test", recording_kind("rec", RunLog::new()));
    let cfg = load_with_registry(&path, &registry)?;
    let graph = cfg.build_flow_graph(registry)?;
    assert_eq!(graph.input_value("R", "in"), Some(&json!("payload")));
    Ok(())
}
