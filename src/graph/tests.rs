//! Test suite for the graph registry: mutation primitives, cascade
//! invariants, path queries, and snapshot round-trips.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::super::{ConnectOptions, Graph, GraphNode};
    use crate::event_bus::{BusEmitter, Event, GraphEvent};
    use crate::types::{NodeKind, NodeState};

    fn chain(ids: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for id in ids {
            graph.add_node(GraphNode::new(*id, NodeKind::Service));
        }
        for pair in ids.windows(2) {
            graph
                .connect(pair[0], pair[1], ConnectOptions::default())
                .unwrap();
        }
        graph
    }

    #[test]
    fn add_node_returns_id() {
        let mut graph = Graph::new();
        let id = graph.add_node(GraphNode::new("svc", NodeKind::Service));
        assert_eq!(id, "svc");
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node("svc").unwrap().state, NodeState::Idle);
    }

    #[test]
    fn connect_requires_both_endpoints() {
        let mut graph = Graph::new();
        graph.add_node(GraphNode::new("a", NodeKind::Service));
        // Silent no-op: the missing endpoint must not leave a half-wired
        // connection behind.
        assert_eq!(graph.connect("a", "ghost", ConnectOptions::default()), None);
        assert_eq!(graph.connect("ghost", "a", ConnectOptions::default()), None);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.node("a").unwrap().output_ids().is_empty());
    }

    #[test]
    fn connect_is_unique_per_ordered_pair() {
        let mut graph = chain(&["a", "b"]);
        assert_eq!(graph.connection_count(), 1);
        // Reconnecting replaces fields without duplicating endpoint entries.
        let id = graph
            .connect("a", "b", ConnectOptions::default().with_priority(7))
            .unwrap();
        assert_eq!(id, "a->b");
        assert_eq!(graph.connection_count(), 1);
        assert_eq!(graph.node("a").unwrap().output_ids().len(), 1);
        assert_eq!(graph.connection("a->b").unwrap().priority, 7);
        // The reverse direction is a distinct connection.
        graph.connect("b", "a", ConnectOptions::default()).unwrap();
        assert_eq!(graph.connection_count(), 2);
    }

    #[test]
    fn remove_node_cascades_connections() {
        let mut graph = chain(&["a", "b", "c"]);
        graph.connect("c", "a", ConnectOptions::default()).unwrap();
        graph.remove_node("b");

        assert!(graph.node("b").is_none());
        assert_eq!(graph.connection_count(), 1);
        for node in graph.nodes() {
            for conn_id in node.input_ids().iter().chain(node.output_ids()) {
                let conn = graph.connection(conn_id).unwrap();
                assert_ne!(conn.source, "b");
                assert_ne!(conn.target, "b");
            }
        }
        // Unknown id is a no-op.
        graph.remove_node("ghost");
    }

    #[test]
    fn remove_connection_detaches_both_endpoints() {
        let mut graph = chain(&["a", "b"]);
        graph.remove_connection("a->b");
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.node("a").unwrap().output_ids().is_empty());
        assert!(graph.node("b").unwrap().input_ids().is_empty());
    }

    #[test]
    fn readd_replaces_and_cascades() {
        let mut graph = chain(&["a", "b"]);
        graph.add_node(GraphNode::new("a", NodeKind::Router));
        assert_eq!(graph.node("a").unwrap().kind, NodeKind::Router);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.node("b").unwrap().input_ids().is_empty());
    }

    #[test]
    fn graph_state_projects_peers() {
        let mut graph = chain(&["a", "b", "c"]);
        graph.set_node_state("b", NodeState::Error);
        let state = graph.graph_state();
        assert_eq!(state.nodes.len(), 3);
        let b = state.nodes.iter().find(|n| n.id == "b").unwrap();
        assert_eq!(b.state, NodeState::Error);
        assert_eq!(b.inputs, vec!["a".to_string()]);
        assert_eq!(b.outputs, vec!["c".to_string()]);
        assert_eq!(state.connections.len(), 2);
    }

    #[test]
    fn serialize_round_trips_exactly() {
        let mut graph = Graph::new();
        graph.add_node(
            GraphNode::new("svc", NodeKind::Service)
                .with_label("Modal")
                .with_position(12.0, 34.0)
                .with_data("service", json!("modal")),
        );
        graph.add_node(GraphNode::new("key", NodeKind::Key).with_data("keyId", json!("k-1")));
        graph.add_node(GraphNode::new("router", NodeKind::Router));
        graph
            .connect(
                "svc",
                "router",
                ConnectOptions::default()
                    .with_priority(5)
                    .with_label("primary"),
            )
            .unwrap();
        graph
            .connect("router", "key", ConnectOptions::default().with_kind("control"))
            .unwrap();

        let snapshot = graph.serialize();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed = serde_json::from_str(&json).unwrap();

        let mut restored = Graph::new();
        restored.deserialize(&parsed);
        assert_eq!(restored.serialize(), snapshot);

        let svc = restored.node("svc").unwrap();
        assert_eq!(svc.label, "Modal");
        assert_eq!((svc.x, svc.y), (12.0, 34.0));
        assert_eq!(svc.data_str("service"), Some("modal"));
        let conn = restored.connection("svc->router").unwrap();
        assert_eq!(conn.priority, 5);
        assert_eq!(conn.label, "primary");
    }

    #[test]
    fn find_path_returns_shortest() {
        let mut graph = chain(&["a", "b", "c", "d"]);
        // Shortcut a -> c makes a,c,d shorter than a,b,c,d.
        graph.connect("a", "c", ConnectOptions::default()).unwrap();
        assert_eq!(
            graph.find_path("a", "d"),
            Some(vec!["a".into(), "c".into(), "d".into()])
        );
        assert_eq!(graph.find_path("d", "a"), None);
        assert_eq!(graph.find_path("a", "a"), Some(vec!["a".into()]));
    }

    #[test]
    fn find_path_terminates_on_cycles() {
        let mut graph = chain(&["a", "b"]);
        graph.connect("b", "a", ConnectOptions::default()).unwrap();
        assert_eq!(graph.find_path("a", "missing"), None);
    }

    #[test]
    fn all_paths_enumerates_prefixes() {
        let mut graph = chain(&["a", "b"]);
        graph.add_node(GraphNode::new("c", NodeKind::Service));
        graph.connect("a", "c", ConnectOptions::default()).unwrap();

        let paths = graph.all_paths("a");
        assert!(paths.contains(&vec!["a".to_string()]));
        assert!(paths.contains(&vec!["a".to_string(), "b".to_string()]));
        assert!(paths.contains(&vec!["a".to_string(), "c".to_string()]));
        assert_eq!(paths.len(), 3);
        assert!(graph.all_paths("ghost").is_empty());
    }

    #[test]
    fn all_paths_bounded_on_cyclic_topology() {
        let mut graph = chain(&["a", "b", "c"]);
        graph.connect("c", "a", ConnectOptions::default()).unwrap();
        let paths = graph.all_paths("a");
        // Simple paths only: a, ab, abc. The c->a edge must not recurse.
        assert_eq!(paths.len(), 3);
        for path in &paths {
            let mut sorted = path.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), path.len(), "path revisited a node: {path:?}");
        }
    }

    #[test]
    fn mutations_emit_events() {
        let (tx, rx) = flume::unbounded();
        let mut graph = Graph::with_emitter(Arc::new(BusEmitter::new(tx)));
        graph.add_node(GraphNode::new("a", NodeKind::Service));
        graph.add_node(GraphNode::new("b", NodeKind::Service));
        graph.connect("a", "b", ConnectOptions::default()).unwrap();
        graph.remove_node("a");

        let scopes: Vec<&str> = rx.drain().map(|e| e.scope_label()).collect();
        assert_eq!(
            scopes,
            vec![
                "nodeAdded",
                "nodeAdded",
                "connectionCreated",
                "connectionRemoved",
                "nodeRemoved"
            ]
        );
    }

    #[test]
    fn node_added_event_carries_snapshot() {
        let (tx, rx) = flume::unbounded();
        let mut graph = Graph::with_emitter(Arc::new(BusEmitter::new(tx)));
        graph.add_node(GraphNode::new("svc", NodeKind::Service).with_label("Modal"));
        match rx.recv().unwrap() {
            Event::Graph(GraphEvent::NodeAdded { node }) => {
                assert_eq!(node.id, "svc");
                assert_eq!(node.label, "Modal");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
