//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use patchbay::graph::{ConnectOptions, Graph, GraphNode};
use patchbay::providers::{HealthCheckProvider, ProviderError};
use patchbay::types::NodeKind;

/// Health provider scripted per service id.
#[derive(Debug, Default)]
pub struct ScriptedHealth {
    down: Vec<String>,
    erroring: Vec<String>,
    checks: Mutex<Vec<String>>,
}

impl ScriptedHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// `check` reports the service unavailable.
    #[must_use]
    pub fn down(mut self, service: &str) -> Self {
        self.down.push(service.to_string());
        self
    }

    /// `check` fails outright for the service.
    #[must_use]
    pub fn erroring(mut self, service: &str) -> Self {
        self.erroring.push(service.to_string());
        self
    }

    /// Every service id checked so far, in order.
    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().clone()
    }
}

#[async_trait]
impl HealthCheckProvider for ScriptedHealth {
    async fn check(&self, service_id: &str) -> Result<bool, ProviderError> {
        self.checks.lock().push(service_id.to_string());
        if self.erroring.iter().any(|s| s == service_id) {
            return Err(ProviderError::HealthCheck {
                service: service_id.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(!self.down.iter().any(|s| s == service_id))
    }
}

/// Gateway service feeding a router with two prioritized key branches that
/// converge on one integration:
///
/// ```text
/// gateway -> router -> primary-key   -> claude-code
///                   \-> fallback-key -/
/// ```
pub fn failover_chain() -> Arc<RwLock<Graph>> {
    let mut graph = Graph::new();
    graph.add_node(
        GraphNode::new("gateway", NodeKind::Service).with_data("service", json!("openai")),
    );
    graph.add_node(
        GraphNode::new("router", NodeKind::Router).with_data("mode", json!("failover")),
    );
    graph.add_node(
        GraphNode::new("primary-key", NodeKind::Key).with_data("service", json!("openai")),
    );
    graph.add_node(
        GraphNode::new("fallback-key", NodeKind::Key).with_data("service", json!("openai")),
    );
    graph.add_node(
        GraphNode::new("claude-code", NodeKind::Integration)
            .with_data("integration", json!("claude-code")),
    );

    graph.connect("gateway", "router", ConnectOptions::default());
    graph.connect("router", "primary-key", ConnectOptions::default().with_priority(10));
    graph.connect("router", "fallback-key", ConnectOptions::default().with_priority(1));
    graph.connect("primary-key", "claude-code", ConnectOptions::default());
    graph.connect("fallback-key", "claude-code", ConnectOptions::default());

    Arc::new(RwLock::new(graph))
}
