//! Execution engine: drives per-node processing and downstream fan-out.
//!
//! [`Engine::process`] locates a node, marks it `processing`, dispatches to
//! the node kind's logic (availability for services, credential resolution
//! for keys, strategy selection for routers, credential application for
//! integrations, payload recording for session nodes), and on success routes
//! the result over every active outgoing connection in creation order.
//! Errors fail fast: the node is marked `error`, a `nodeError` event is
//! emitted, and the error propagates to the caller. Retry policy belongs to
//! the caller.
//!
//! Router nodes are the exception to generic fan-out: their configured
//! [`RouterMode`](crate::types::RouterMode) strategy owns all routing
//! decisions.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use patchbay::engine::{Engine, ExecContext};
//! use patchbay::graph::{ConnectOptions, Graph, GraphNode};
//! use patchbay::types::NodeKind;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), patchbay::engine::EngineError> {
//! let mut graph = Graph::new();
//! graph.add_node(GraphNode::new("svc", NodeKind::Service).with_data("service", json!("modal")));
//! graph.add_node(GraphNode::new("key", NodeKind::Key).with_data("service", json!("modal")));
//! graph.connect("svc", "key", ConnectOptions::default());
//!
//! let engine = Engine::new(Arc::new(RwLock::new(graph)));
//! let result = engine.process("svc", json!({}), ExecContext::new()).await?;
//! assert_eq!(result["service"], "modal");
//! # Ok(())
//! # }
//! ```

mod executor;
mod routing;

use miette::Diagnostic;
use thiserror::Error;

pub use executor::{Engine, ExecContext, SessionEntry};

use crate::providers::ProviderError;

/// Errors raised while processing data through the graph.
///
/// Every variant names the originating node so callers can report failures
/// against the topology. Nothing here is retried automatically.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// The node id is not registered in the graph.
    #[error("node not found: {node_id}")]
    #[diagnostic(code(patchbay::engine::node_not_found))]
    NodeNotFound { node_id: String },

    /// A route was attempted over a missing or inactive connection.
    #[error("no active connection from {source_id} to {target}")]
    #[diagnostic(
        code(patchbay::engine::connection_inactive),
        help("Check that the connection exists and its `active` flag is set.")
    )]
    ConnectionInactive { source_id: String, target: String },

    /// Every prioritized failover target failed or was skipped.
    #[error("all failover targets failed for router {router_id}")]
    #[diagnostic(code(patchbay::engine::exhausted_failover))]
    ExhaustedFailover { router_id: String },

    /// Load-balanced selection found zero eligible outputs.
    #[error("no healthy targets available for router {router_id}")]
    #[diagnostic(code(patchbay::engine::no_healthy_target))]
    NoHealthyTarget { router_id: String },

    /// Recursive routing exceeded the configured depth bound; the topology
    /// contains a cycle the strategies did not break.
    #[error("traversal depth limit {limit} exceeded at node {node_id}")]
    #[diagnostic(
        code(patchbay::engine::traversal_limit),
        help("The graph likely contains a routing cycle; raise max_depth only if the depth is intentional.")
    )]
    TraversalLimit { node_id: String, limit: usize },

    /// Processing was cancelled through the context's token.
    #[error("processing cancelled at node {node_id}")]
    #[diagnostic(code(patchbay::engine::cancelled))]
    Cancelled { node_id: String },

    /// A collaborator (health check, key store, integration updater) failed.
    #[error(transparent)]
    #[diagnostic(code(patchbay::engine::provider))]
    Provider(#[from] ProviderError),
}
