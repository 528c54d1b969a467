//! # Patchbay: Credential Routing Graph Engine
//!
//! Patchbay models credential and service-endpoint topologies as directed
//! graphs of typed nodes, the way an audio patchbay wires sources to sinks.
//! Data flows from node to node over explicit connections, and router nodes
//! decide where it goes next.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Typed endpoints (`service`, `key`, `router`, `integration`,
//!   `session`), each with position, state, and a free-form data map
//! - **Connections**: Directed, prioritized links between nodes; at most one
//!   per ordered pair
//! - **Engine**: Processes payloads at nodes and fans results out downstream
//! - **Routers**: Four strategies (failover, round-robin, parallel,
//!   load-balance) that own routing at router nodes
//! - **Sessions**: Named, persistable instances of a topology with a managed
//!   lifecycle
//! - **Event bus**: Every mutation and lifecycle transition is observable as
//!   a typed event
//!
//! ## Quick Start
//!
//! ### Building a graph
//!
//! ```
//! use patchbay::graph::{ConnectOptions, Graph, GraphNode};
//! use patchbay::types::NodeKind;
//! use serde_json::json;
//!
//! let mut graph = Graph::new();
//! graph.add_node(
//!     GraphNode::new("gateway", NodeKind::Service).with_data("service", json!("openai")),
//! );
//! graph.add_node(
//!     GraphNode::new("router", NodeKind::Router).with_data("mode", json!("failover")),
//! );
//! graph.add_node(GraphNode::new("primary", NodeKind::Key));
//! graph.add_node(GraphNode::new("fallback", NodeKind::Key));
//!
//! graph.connect("gateway", "router", ConnectOptions::default());
//! graph.connect("router", "primary", ConnectOptions::default().with_priority(10));
//! graph.connect("router", "fallback", ConnectOptions::default().with_priority(1));
//!
//! assert_eq!(graph.node_count(), 4);
//! assert_eq!(graph.find_path("gateway", "primary").unwrap().len(), 3);
//! ```
//!
//! ### Processing data through it
//!
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use patchbay::engine::{Engine, ExecContext};
//! use patchbay::graph::Graph;
//! use serde_json::json;
//!
//! # async fn demo(graph: Graph) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(Arc::new(RwLock::new(graph)));
//! let result = engine
//!     .process("gateway", json!({"request": "chat"}), ExecContext::new())
//!     .await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
//!
//! Sessions wrap a topology in a persistable lifecycle; see [`session`].
//! Provider seams ([`providers`]) let embedders supply real health checks,
//! key stores, and integration updaters.

pub mod engine;
pub mod event_bus;
pub mod graph;
pub mod providers;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod utils;
