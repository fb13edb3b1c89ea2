// src/events.rs

//! Lifecycle notifications emitted by the engine.
//!
//! The engine reports through an [`EventSink`] passed in by the caller; there
//! is no process-wide queue, so several engines can coexist (tests rely on
//! this). Sinks provided here:
//!
//! - [`NullSink`]: drops everything.
//! - [`VecSink`]: records events in memory, mainly for tests.
//! - [`ChannelSink`]: forwards events over a Tokio unbounded channel so an
//!   outer layer (CLI, UI transport) can consume them.
//! - [`TracingSink`]: logs events through `tracing`.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::{NodeName, NodeOutputs, PortName, Value};

/// A single lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    /// The engine selected a node to work on.
    FocusChanged { node: NodeName },
    /// A node's process routine is about to start.
    NodeStarted { node: NodeName },
    /// A node's process routine finished.
    NodeFinished { node: NodeName },
    /// A node's outputs were committed.
    NodeResolved {
        node: NodeName,
        node_type: String,
        owner: Option<String>,
        outputs: NodeOutputs,
    },
    /// A value was pushed into a downstream input.
    ValueUpdated {
        node: NodeName,
        port: PortName,
        value_type: String,
        value: Value,
    },
}

impl NodeEvent {
    /// Name of the node this event is about.
    pub fn node(&self) -> &str {
        match self {
            NodeEvent::FocusChanged { node }
            | NodeEvent::NodeStarted { node }
            | NodeEvent::NodeFinished { node }
            | NodeEvent::NodeResolved { node, .. }
            | NodeEvent::ValueUpdated { node, .. } => node,
        }
    }
}

/// Receiver of lifecycle notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NodeEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: NodeEvent) {}
}

/// Sink that keeps every event; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    events: Arc<Mutex<Vec<NodeEvent>>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Nodes in the order their `NodeStarted` events arrived.
    pub fn started_nodes(&self) -> Vec<NodeName> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NodeEvent::NodeStarted { node } => Some(node),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.clear();
        }
    }
}

impl EventSink for VecSink {
    fn emit(&self, event: NodeEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

/// Sink that forwards events to a channel.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: NodeEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped; discarding notification");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: NodeEvent) {
        match &event {
            NodeEvent::NodeResolved {
                node,
                node_type,
                owner,
                ..
            } => info!(node = %node, node_type = %node_type, owner = ?owner, "node resolved"),
            NodeEvent::ValueUpdated {
                node,
                port,
                value_type,
                ..
            } => debug!(node = %node, port = %port, value_type = %value_type, "value updated"),
            other => debug!(node = %other.node(), ?other, "node event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_tag() {
        let event = NodeEvent::ValueUpdated {
            node: "B".into(),
            port: "value".into(),
            value_type: "int".into(),
            value: json!(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"event": "value_updated", "node": "B", "port": "value", "value_type": "int", "value": 5})
        );
    }

    #[test]
    fn vec_sink_clones_share_storage() {
        let sink = VecSink::new();
        let other = sink.clone();
        other.emit(NodeEvent::NodeStarted { node: "A".into() });
        assert_eq!(sink.started_nodes(), vec!["A".to_string()]);
        sink.clear();
        assert!(other.events().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracing_sink_logs_resolved_nodes() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.emit(NodeEvent::NodeStarted { node: "A".into() });
            TracingSink.emit(NodeEvent::NodeResolved {
                node: "B".into(),
                node_type: "multiply".into(),
                owner: Some("core".into()),
                outputs: NodeOutputs::new(),
            });
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("node event"));
        assert!(text.contains("node resolved"));
        assert!(text.contains("node_type=multiply"));
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(NodeEvent::FocusChanged { node: "A".into() });
        assert_eq!(
            rx.recv().await,
            Some(NodeEvent::FocusChanged { node: "A".into() })
        );
    }
}
