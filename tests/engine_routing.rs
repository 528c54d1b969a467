use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use patchbay::engine::{Engine, EngineError, ExecContext};
use patchbay::graph::{ConnectOptions, Graph, GraphNode};
use patchbay::providers::{Credential, InMemoryKeyStore, RecordingIntegrations};
use patchbay::types::{NodeKind, NodeState};

mod common;
use common::{ScriptedHealth, failover_chain};

#[tokio::test]
async fn full_chain_resolves_a_key_and_configures_the_integration() {
    let keys = Arc::new(InMemoryKeyStore::new());
    keys.add_key(Credential::new("openai", "k1", "sk-primary"));
    let integrations = Arc::new(RecordingIntegrations::new());

    let engine = Engine::new(failover_chain())
        .with_key_store(keys)
        .with_integrations(integrations.clone());

    let result = engine
        .process("gateway", json!({"request": "chat"}), ExecContext::new())
        .await
        .unwrap();

    assert_eq!(result["service"], json!("openai"));
    assert_eq!(result["available"], json!(true));
    assert_eq!(
        integrations.applied(),
        vec![(
            "claude-code".to_string(),
            "openai".to_string(),
            "k1".to_string()
        )]
    );
}

#[tokio::test]
async fn key_rotation_skips_unhealthy_keys_and_sticks() {
    let keys = Arc::new(InMemoryKeyStore::new());
    keys.add_key(Credential::new("openai", "k1", "sk-1"));
    keys.add_key(Credential::new("openai", "k2", "sk-2"));
    keys.add_key(Credential::new("openai", "k3", "sk-3"));
    keys.mark_unhealthy("openai", "k1");

    let mut graph = Graph::new();
    graph.add_node(GraphNode::new("key", NodeKind::Key).with_data("service", json!("openai")));
    let engine = Engine::new(Arc::new(RwLock::new(graph))).with_key_store(keys.clone());

    for _ in 0..3 {
        let result = engine
            .process("key", json!({}), ExecContext::new())
            .await
            .unwrap();
        assert_eq!(result["authenticated"], json!(true));
        assert_eq!(result["key"]["keyId"], json!("k2"));
    }
    // Cursor moved once past the unhealthy key, then stayed put.
    assert_eq!(keys.rotation_count(), 1);
}

#[tokio::test]
async fn pinned_keys_bypass_rotation() {
    let keys = Arc::new(InMemoryKeyStore::new());
    keys.add_key(Credential::new("openai", "k1", "sk-1"));
    keys.add_key(Credential::new("openai", "k2", "sk-2"));

    let mut graph = Graph::new();
    graph.add_node(
        GraphNode::new("key", NodeKind::Key)
            .with_data("service", json!("openai"))
            .with_data("keyId", json!("k2")),
    );
    let engine = Engine::new(Arc::new(RwLock::new(graph))).with_key_store(keys.clone());

    let result = engine
        .process("key", json!({}), ExecContext::new())
        .await
        .unwrap();
    assert_eq!(result["key"]["keyId"], json!("k2"));
    assert_eq!(keys.rotation_count(), 0);
}

#[tokio::test]
async fn failover_router_reaches_the_fallback_branch() {
    // Nothing can fail between the router and the keys here, so sabotage
    // the primary branch by deactivating its connection.
    let shared = failover_chain();
    {
        let mut graph = shared.write();
        graph.connect(
            "router",
            "primary-key",
            ConnectOptions::default().with_priority(10).inactive(),
        );
    }

    let engine = Engine::new(Arc::clone(&shared));
    let result = engine
        .process("gateway", json!({}), ExecContext::new())
        .await
        .unwrap();

    let graph = shared.read();
    assert_eq!(graph.node("fallback-key").unwrap().state, NodeState::Completed);
    assert_eq!(graph.node("primary-key").unwrap().state, NodeState::Idle);
    assert_eq!(result["available"], json!(true));
}

#[tokio::test]
async fn routing_stamps_last_used_on_the_connection() {
    let shared = failover_chain();
    let engine = Engine::new(Arc::clone(&shared));

    engine
        .process("gateway", json!({}), ExecContext::new())
        .await
        .unwrap();

    let graph = shared.read();
    assert!(graph.connection("gateway->router").unwrap().last_used.is_some());
}

#[tokio::test]
async fn unavailable_services_still_flow_downstream() {
    let engine = Engine::new(failover_chain())
        .with_health(Arc::new(ScriptedHealth::new().down("openai")));

    let result = engine
        .process("gateway", json!({}), ExecContext::new())
        .await
        .unwrap();
    // Availability is data, not an error; routing continued.
    assert_eq!(result["available"], json!(false));
}

#[tokio::test]
async fn health_errors_propagate_as_provider_errors() {
    let engine = Engine::new(failover_chain())
        .with_health(Arc::new(ScriptedHealth::new().erroring("openai")));

    let err = engine
        .process("gateway", json!({}), ExecContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Provider(_)));
}
