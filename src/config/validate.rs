// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};

use crate::config::model::{RawWorkflowConfig, WorkflowConfig};
use crate::errors::{NodedagError, Result};
use crate::flow::NodeRegistry;
use crate::types::{PortDirection, PortRef};

impl TryFrom<RawWorkflowConfig> for WorkflowConfig {
    type Error = NodedagError;

    /// Validate against the built-in `core` library.
    fn try_from(raw: RawWorkflowConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw, &NodeRegistry::with_core_library())?;
        Ok(WorkflowConfig::new_unchecked(raw.config, raw.node, raw.connection))
    }
}

/// Check a raw workflow against the node types known to `registry`.
///
/// Cycles are not rejected here; the engine reports them when a run
/// discovers one.
pub fn validate_config(cfg: &RawWorkflowConfig, registry: &NodeRegistry) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_nodes(cfg, registry)?;
    validate_connections(cfg, registry)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawWorkflowConfig) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(NodedagError::ConfigError(
            "workflow must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawWorkflowConfig) -> Result<()> {
    if cfg.config.max_concurrency == 0 {
        return Err(NodedagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    let weights = cfg.config.heuristics;
    for (name, weight) in [
        ("distance_to_node", weights.distance_to_node),
        ("direct_successor", weights.direct_successor),
        ("reading_order", weights.reading_order),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            return Err(NodedagError::ConfigError(format!(
                "[config.heuristics].{name} must be a finite, non-negative number (got {weight})"
            )));
        }
    }
    Ok(())
}

fn validate_nodes(cfg: &RawWorkflowConfig, registry: &NodeRegistry) -> Result<()> {
    for (name, node) in &cfg.node {
        let Some(kind) = registry.kind(&node.node_type) else {
            return Err(NodedagError::ConfigError(format!(
                "node '{name}' has unknown type '{}'",
                node.node_type
            )));
        };
        for port in node.params.keys() {
            let settable = kind.port_spec(port, PortDirection::Input).is_some()
                || kind.port_spec(port, PortDirection::Property).is_some();
            if !settable {
                return Err(NodedagError::ConfigError(format!(
                    "node '{name}' ({}) has no input or property named '{port}'",
                    node.node_type
                )));
            }
        }
        if let Some([x, y]) = node.position {
            if !x.is_finite() || !y.is_finite() {
                return Err(NodedagError::ConfigError(format!(
                    "node '{name}' has a non-finite position"
                )));
            }
        }
    }
    Ok(())
}

fn validate_connections(cfg: &RawWorkflowConfig, registry: &NodeRegistry) -> Result<()> {
    let mut upstream: HashMap<PortRef, PortRef> = HashMap::new();

    for connection in &cfg.connection {
        let from = connection.source()?;
        let to = connection.target()?;
        check_endpoint(cfg, registry, &from, PortDirection::Output, "source")?;
        check_endpoint(cfg, registry, &to, PortDirection::Input, "target")?;

        if let Some(existing) = upstream.insert(to.clone(), from.clone()) {
            return Err(NodedagError::ConfigError(format!(
                "input {to} has more than one upstream ({existing} and {from})"
            )));
        }
    }
    Ok(())
}

fn check_endpoint(
    cfg: &RawWorkflowConfig,
    registry: &NodeRegistry,
    port: &PortRef,
    direction: PortDirection,
    role: &str,
) -> Result<()> {
    let Some(node) = cfg.node.get(&port.node) else {
        return Err(NodedagError::ConfigError(format!(
            "connection {role} {port} refers to unknown node '{}'",
            port.node
        )));
    };
    let found = registry
        .kind(&node.node_type)
        .and_then(|kind| kind.port_spec(&port.port, direction))
        .is_some();
    if !found {
        let expected = match direction {
            PortDirection::Output => "an output",
            _ => "an input",
        };
        return Err(NodedagError::ConfigError(format!(
            "connection {role} {port} is not {expected} port of a '{}' node",
            node.node_type
        )));
    }
    Ok(())
}

/// Order `target` and its transitive upstream nodes so every node comes after
/// its upstream nodes.
///
/// Returns the name of a node on a cycle if that part of the workflow
/// contains one.
pub fn dependency_order(
    cfg: &WorkflowConfig,
    target: &str,
) -> std::result::Result<Vec<String>, String> {
    // Edge direction: upstream -> downstream.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }
    for connection in &cfg.connection {
        let (Some((from, _)), Some((to, _))) = (
            connection.from.rsplit_once('.'),
            connection.to.rsplit_once('.'),
        ) else {
            continue;
        };
        graph.add_edge(from, to, ());
    }

    // Only the target and what it depends on take part in a run.
    let mut upstream: HashSet<&str> = HashSet::new();
    let mut dfs = Dfs::new(Reversed(&graph), target);
    while let Some(node) = dfs.next(Reversed(&graph)) {
        upstream.insert(node);
    }

    let mut closure: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in graph.nodes().filter(|node| upstream.contains(node)) {
        closure.add_node(node);
    }
    for (from, to, _) in graph.all_edges() {
        if upstream.contains(from) && upstream.contains(to) {
            closure.add_edge(from, to, ());
        }
    }

    match toposort(&closure, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(cycle.node_id().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> RawWorkflowConfig {
        toml::from_str(toml_src).unwrap()
    }

    fn err_of(toml_src: &str) -> String {
        WorkflowConfig::try_from(parse(toml_src))
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn empty_workflow_is_rejected() {
        assert!(err_of("[config]\nmax_concurrency = 1\n").contains("at least one"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let msg = err_of(
            r#"
            [config]
            max_concurrency = 0

            [node.A]
            type = "constant"
            "#,
        );
        assert!(msg.contains("max_concurrency"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let msg = err_of(
            r#"
            [config.heuristics]
            reading_order = -1.0

            [node.A]
            type = "constant"
            "#,
        );
        assert!(msg.contains("reading_order"));
    }

    #[test]
    fn unknown_type_and_param_are_rejected() {
        assert!(err_of("[node.A]\ntype = \"teleport\"\n").contains("unknown type"));
        let msg = err_of(
            r#"
            [node.A]
            type = "constant"
            params = { colour = "red" }
            "#,
        );
        assert!(msg.contains("colour"));
    }

    #[test]
    fn connections_must_go_from_output_to_input() {
        let msg = err_of(
            r#"
            [node.A]
            type = "constant"
            [node.B]
            type = "multiply"

            [[connection]]
            from = "B.value"
            to = "A.value"
            "#,
        );
        assert!(msg.contains("not an output"));
    }

    #[test]
    fn an_input_takes_one_upstream() {
        let msg = err_of(
            r#"
            [node.A]
            type = "constant"
            [node.C]
            type = "constant"
            [node.B]
            type = "multiply"

            [[connection]]
            from = "A.value"
            to = "B.value"

            [[connection]]
            from = "C.value"
            to = "B.value"
            "#,
        );
        assert!(msg.contains("more than one upstream"));
    }

    #[test]
    fn cycles_load_but_have_no_order() {
        let cfg = WorkflowConfig::try_from(parse(
            r#"
            [node.A]
            type = "multiply"
            [node.B]
            type = "multiply"

            [[connection]]
            from = "A.result"
            to = "B.value"

            [[connection]]
            from = "B.result"
            to = "A.value"
            "#,
        ))
        .unwrap();
        assert!(dependency_order(&cfg, "A").is_err());
    }

    #[test]
    fn cycles_outside_the_target_do_not_block_its_order() {
        let cfg = WorkflowConfig::try_from(parse(
            r#"
            [node.A]
            type = "multiply"
            [node.B]
            type = "multiply"
            [node.K]
            type = "constant"
            [node.M]
            type = "multiply"

            [[connection]]
            from = "A.result"
            to = "B.value"

            [[connection]]
            from = "B.result"
            to = "A.value"

            [[connection]]
            from = "K.value"
            to = "M.value"
            "#,
        ))
        .unwrap();
        assert_eq!(dependency_order(&cfg, "M").unwrap(), vec!["K", "M"]);
    }

    #[test]
    fn order_follows_connections() {
        let cfg = WorkflowConfig::try_from(parse(
            r#"
            [node.C]
            type = "multiply"
            [node.B]
            type = "multiply"
            [node.A]
            type = "constant"

            [[connection]]
            from = "A.value"
            to = "B.value"

            [[connection]]
            from = "B.result"
            to = "C.value"
            "#,
        ))
        .unwrap();
        assert_eq!(dependency_order(&cfg, "C").unwrap(), vec!["A", "B", "C"]);
        assert_eq!(dependency_order(&cfg, "B").unwrap(), vec!["A", "B"]);
    }
}
