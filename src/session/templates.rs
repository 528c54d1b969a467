//! Prewired session topologies.
//!
//! A template is a read-only blueprint: applying one to a session copies its
//! nodes and connections into the session record, it never links back to the
//! registry.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::graph::snapshot::{ConnectionSnapshot, NodeSnapshot};
use crate::types::NodeKind;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub connections: Vec<ConnectionSnapshot>,
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
}

/// Template lookup by id, preserving registration order for listings.
#[derive(Clone, Debug, Default)]
pub struct TemplateRegistry {
    templates: FxHashMap<String, Template>,
    order: Vec<String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in topologies.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("all-glm5", all_glm5());
        registry.register("kiro-proxy-4.5", kiro_proxy());
        registry.register("multi-model-ensemble", multi_model_ensemble());
        registry
    }

    /// Register or replace a template under an id.
    pub fn register(&mut self, id: impl Into<String>, template: Template) {
        let id = id.into();
        if !self.templates.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.templates.insert(id, template);
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Template ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn service(id: &str, service: &str, x: f64, y: f64) -> NodeSnapshot {
    NodeSnapshot::new(id, NodeKind::Service)
        .with_position(x, y)
        .with_label(service)
        .with_data("service", json!(service))
}

fn key(id: &str, service: &str, x: f64, y: f64) -> NodeSnapshot {
    NodeSnapshot::new(id, NodeKind::Key)
        .with_position(x, y)
        .with_data("service", json!(service))
}

fn router(id: &str, mode: &str, x: f64, y: f64) -> NodeSnapshot {
    NodeSnapshot::new(id, NodeKind::Router)
        .with_position(x, y)
        .with_data("mode", json!(mode))
}

fn integration(id: &str, integration: &str, x: f64, y: f64) -> NodeSnapshot {
    NodeSnapshot::new(id, NodeKind::Integration)
        .with_position(x, y)
        .with_label(integration)
        .with_data("integration", json!(integration))
}

/// Single GLM-5 service feeding every integration through one key.
fn all_glm5() -> Template {
    Template {
        name: "ALL GLM-5 MODAL".to_string(),
        description: "Full GLM-5 multimodal setup".to_string(),
        icon: "🧠".to_string(),
        nodes: vec![
            service("glm5-service", "glm5", 80.0, 120.0),
            key("glm5-key", "glm5", 240.0, 120.0),
            integration("claude-code", "claude-code", 400.0, 80.0),
            integration("opencode", "opencode", 400.0, 160.0),
        ],
        connections: vec![
            ConnectionSnapshot::between("glm5-service", "glm5-key"),
            ConnectionSnapshot::between("glm5-key", "claude-code"),
            ConnectionSnapshot::between("glm5-key", "opencode"),
        ],
        config: FxHashMap::from_iter([("defaultService".to_string(), json!("glm5"))]),
    }
}

/// Kiro gateway in front, failover to a direct key when the proxy is down.
fn kiro_proxy() -> Template {
    Template {
        name: "ALL KIRO PROXY 4.5".to_string(),
        description: "Kiro Gateway proxy chain".to_string(),
        icon: "🔮".to_string(),
        nodes: vec![
            service("kiro-gateway", "kiro", 80.0, 120.0),
            router("proxy-router", "failover", 240.0, 120.0),
            key("kiro-key", "kiro", 400.0, 80.0),
            key("direct-key", "anthropic", 400.0, 160.0),
            integration("claude-code", "claude-code", 560.0, 120.0),
        ],
        connections: vec![
            ConnectionSnapshot::between("kiro-gateway", "proxy-router"),
            ConnectionSnapshot::between("proxy-router", "kiro-key").with_priority(10),
            ConnectionSnapshot::between("proxy-router", "direct-key").with_priority(1),
            ConnectionSnapshot::between("kiro-key", "claude-code"),
            ConnectionSnapshot::between("direct-key", "claude-code"),
        ],
        config: FxHashMap::from_iter([("proxy".to_string(), json!("kiro"))]),
    }
}

/// Three model services behind a parallel router.
fn multi_model_ensemble() -> Template {
    Template {
        name: "Multi-Model Ensemble".to_string(),
        description: "Parallel processing setup".to_string(),
        icon: "⚡".to_string(),
        nodes: vec![
            router("ensemble-router", "parallel", 80.0, 160.0),
            service("openai-service", "openai", 240.0, 80.0),
            service("anthropic-service", "anthropic", 240.0, 160.0),
            service("glm5-service", "glm5", 240.0, 240.0),
            integration("opencode", "opencode", 400.0, 160.0),
        ],
        connections: vec![
            ConnectionSnapshot::between("ensemble-router", "openai-service"),
            ConnectionSnapshot::between("ensemble-router", "anthropic-service"),
            ConnectionSnapshot::between("ensemble-router", "glm5-service"),
            ConnectionSnapshot::between("openai-service", "opencode"),
            ConnectionSnapshot::between("anthropic-service", "opencode"),
            ConnectionSnapshot::between("glm5-service", "opencode"),
        ],
        config: FxHashMap::default(),
    }
}
