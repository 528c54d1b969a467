//! Graph model and registry for routing topologies.
//!
//! A [`Graph`] owns typed nodes ([`GraphNode`]) and directed, prioritized
//! connections ([`Connection`]) between them. It provides the mutation
//! primitives (`add_node`, `remove_node`, `connect`, `remove_connection`),
//! read-only projections for observers, path queries, and serialization to
//! the snapshot format shared with external editors.
//!
//! # Core invariants
//!
//! - Connection identity is the pure function `"{source}->{target}"`: at most
//!   one connection per ordered pair.
//! - Removing a node removes every incident connection from both endpoints.
//! - Iteration is in insertion order everywhere, keeping routing and
//!   serialization deterministic.
//!
//! # Quick start
//!
//! ```
//! use patchbay::graph::{ConnectOptions, Graph, GraphNode};
//! use patchbay::types::NodeKind;
//! use serde_json::json;
//!
//! let mut graph = Graph::new();
//! graph.add_node(GraphNode::new("svc", NodeKind::Service).with_data("service", json!("modal")));
//! graph.add_node(GraphNode::new("router", NodeKind::Router));
//! graph
//!     .connect("svc", "router", ConnectOptions::default().with_priority(10))
//!     .expect("both endpoints exist");
//!
//! assert_eq!(graph.find_path("svc", "router"), Some(vec!["svc".into(), "router".into()]));
//! let snapshot = graph.serialize();
//! let mut restored = Graph::new();
//! restored.deserialize(&snapshot);
//! assert_eq!(restored.serialize(), snapshot);
//! ```

mod connection;
mod node;
mod registry;
pub mod snapshot;
mod tests;

pub use connection::{ConnectOptions, Connection, connection_id};
pub use node::GraphNode;
pub use registry::Graph;
pub use snapshot::{ConnectionSnapshot, GraphSnapshot, GraphState, NodeSnapshot, NodeView};
