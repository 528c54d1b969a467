//! The engine proper: node lookup, state transitions, kind dispatch, and
//! recursive routing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::EngineError;
use crate::event_bus::{Event, EventEmitter, ExecEvent, NullEmitter};
use crate::graph::Graph;
use crate::providers::{
    Credential, HealthCheckProvider, InMemoryKeyStore, IntegrationUpdater, KeyStore,
    RecordingIntegrations, StaticHealth,
};
use crate::types::{NodeKind, NodeState};
use crate::utils::{merge_fields, str_field};

/// Default bound on a single health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on recursive routing depth (cycle policy for execution).
const MAX_DEPTH: usize = 64;

/// Context threaded through one processing traversal.
///
/// Carries the originating session (when the engine runs on behalf of one),
/// the cancellation token observed at every suspension point, and the
/// traversal depth used to bound cyclic topologies.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    pub session_id: Option<String>,
    pub cancel: CancellationToken,
    pub(crate) depth: usize,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn descend(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            cancel: self.cancel.clone(),
            depth: self.depth + 1,
        }
    }
}

/// Payload recorded by a Session-type node.
#[derive(Clone, Debug)]
pub struct SessionEntry {
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
}

/// Snapshot of one router output taken at dispatch time.
#[derive(Clone, Debug)]
pub(super) struct RouterOutput {
    pub target: String,
    pub priority: i64,
    pub target_state: NodeState,
}

/// Drives data flow through a [`Graph`].
///
/// The graph is shared behind a lock; the engine takes short lock scopes
/// around state mutation and never holds one across an await, so parallel
/// fan-out can process disjoint subtrees concurrently.
pub struct Engine {
    pub(super) graph: Arc<RwLock<Graph>>,
    health: Arc<dyn HealthCheckProvider>,
    keys: Arc<dyn KeyStore>,
    integrations: Arc<dyn IntegrationUpdater>,
    emitter: Arc<dyn EventEmitter>,
    pub(super) rng: Mutex<StdRng>,
    session_entries: Mutex<FxHashMap<String, SessionEntry>>,
    health_timeout: Duration,
    max_depth: usize,
}

impl Engine {
    /// Engine with placeholder collaborators: every service healthy, an empty
    /// key store, recording integrations, no event bus.
    pub fn new(graph: Arc<RwLock<Graph>>) -> Self {
        Self {
            graph,
            health: Arc::new(StaticHealth::up()),
            keys: Arc::new(InMemoryKeyStore::new()),
            integrations: Arc::new(RecordingIntegrations::new()),
            emitter: Arc::new(NullEmitter),
            rng: Mutex::new(StdRng::from_os_rng()),
            session_entries: Mutex::new(FxHashMap::default()),
            health_timeout: HEALTH_TIMEOUT,
            max_depth: MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_health(mut self, health: Arc<dyn HealthCheckProvider>) -> Self {
        self.health = health;
        self
    }

    #[must_use]
    pub fn with_key_store(mut self, keys: Arc<dyn KeyStore>) -> Self {
        self.keys = keys;
        self
    }

    #[must_use]
    pub fn with_integrations(mut self, integrations: Arc<dyn IntegrationUpdater>) -> Self {
        self.integrations = integrations;
        self
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Seed the load-balancing random source for reproducible routing.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Shared handle to the graph this engine drives.
    pub fn graph(&self) -> Arc<RwLock<Graph>> {
        Arc::clone(&self.graph)
    }

    /// Entry recorded by a Session-type node, if it has processed anything.
    pub fn session_entry(&self, node_id: &str) -> Option<SessionEntry> {
        self.session_entries.lock().get(node_id).cloned()
    }

    pub(super) fn emit(&self, event: Event) {
        let _ = self.emitter.emit(event);
    }

    /// Process `payload` at a node and fan the result out downstream.
    ///
    /// State transitions are monotonic within one invocation: idle →
    /// processing → completed | error, and the `processing` transition is
    /// observable on the bus strictly before any downstream routing begins.
    pub fn process<'a>(
        &'a self,
        node_id: &'a str,
        payload: Value,
        ctx: ExecContext,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            if ctx.depth >= self.max_depth {
                return Err(EngineError::TraversalLimit {
                    node_id: node_id.to_string(),
                    limit: self.max_depth,
                });
            }
            if ctx.cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    node_id: node_id.to_string(),
                });
            }

            let kind = {
                let mut graph = self.graph.write();
                let node = graph.node_mut(node_id).ok_or_else(|| EngineError::NodeNotFound {
                    node_id: node_id.to_string(),
                })?;
                node.state = NodeState::Processing;
                node.touch();
                node.kind
            };
            self.emit(Event::Exec(ExecEvent::NodeProcessing {
                node_id: node_id.to_string(),
                payload: payload.clone(),
            }));
            debug!(node_id, kind = %kind, depth = ctx.depth, "processing node");

            match self.run_node(kind, node_id, payload, &ctx).await {
                Ok(result) => {
                    self.graph.write().set_node_state(node_id, NodeState::Completed);
                    self.emit(Event::Exec(ExecEvent::NodeCompleted {
                        node_id: node_id.to_string(),
                        result: result.clone(),
                    }));
                    Ok(result)
                }
                Err(error) => {
                    self.graph.write().set_node_state(node_id, NodeState::Error);
                    self.emit(Event::Exec(ExecEvent::NodeError {
                        node_id: node_id.to_string(),
                        error: error.to_string(),
                    }));
                    Err(error)
                }
            }
        })
    }

    /// Kind dispatch plus generic fan-out (routers route through their
    /// strategy instead).
    async fn run_node(
        &self,
        kind: NodeKind,
        node_id: &str,
        payload: Value,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        let result = match kind {
            NodeKind::Service => self.process_service(node_id, payload, ctx).await?,
            NodeKind::Key => self.process_key(node_id, payload).await?,
            NodeKind::Router => return self.process_router(node_id, payload, ctx).await,
            NodeKind::Integration => self.process_integration(node_id, payload).await?,
            NodeKind::Session => self.process_session(node_id, payload),
        };

        let targets: Vec<String> = {
            let graph = self.graph.read();
            graph
                .output_connections(node_id)
                .into_iter()
                .filter(|conn| conn.active)
                .map(|conn| conn.target.clone())
                .collect()
        };
        for target in &targets {
            self.route_data(node_id, target, result.clone(), ctx.clone())
                .await?;
        }
        Ok(result)
    }

    /// Route data over an existing active connection to its target.
    ///
    /// Fails `ConnectionInactive` when the pair has no usable connection;
    /// otherwise stamps `last_used` and processes the target.
    pub async fn route_data(
        &self,
        source_id: &str,
        target_id: &str,
        payload: Value,
        ctx: ExecContext,
    ) -> Result<Value, EngineError> {
        let usable = self.graph.write().use_connection(source_id, target_id);
        if !usable {
            return Err(EngineError::ConnectionInactive {
                source_id: source_id.to_string(),
                target: target_id.to_string(),
            });
        }
        self.process(target_id, payload, ctx.descend()).await
    }

    /// Service node: attach availability from the health provider. A timed
    /// out check counts as unavailable rather than an error.
    async fn process_service(
        &self,
        node_id: &str,
        payload: Value,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        let service = {
            let graph = self.graph.read();
            let node = graph.node(node_id).ok_or_else(|| EngineError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            node.data_str("service").unwrap_or(node_id).to_string()
        };

        let available = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(EngineError::Cancelled { node_id: node_id.to_string() });
            }
            checked = tokio::time::timeout(self.health_timeout, self.health.check(&service)) => {
                match checked {
                    Ok(result) => result?,
                    Err(_elapsed) => {
                        warn!(service, "health check timed out");
                        false
                    }
                }
            }
        };

        Ok(merge_fields(
            payload,
            [
                ("service".to_string(), json!(service)),
                ("available".to_string(), json!(available)),
                ("timestamp".to_string(), json!(Utc::now().timestamp_millis())),
            ],
        ))
    }

    /// Key node: attach the resolved credential and an `authenticated` flag.
    async fn process_key(&self, node_id: &str, payload: Value) -> Result<Value, EngineError> {
        let (service, key_id) = {
            let graph = self.graph.read();
            let node = graph.node(node_id).ok_or_else(|| EngineError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            let service = node
                .data_str("service")
                .map(str::to_string)
                .or_else(|| str_field(&payload, "service").map(str::to_string));
            (service, node.data_str("keyId").map(str::to_string))
        };

        let Some(service) = service else {
            return Ok(merge_fields(
                payload,
                [
                    ("key".to_string(), Value::Null),
                    ("authenticated".to_string(), json!(false)),
                ],
            ));
        };

        let credential = self.keys.resolve(&service, key_id.as_deref()).await?;
        let authenticated = credential.is_some();
        let key = credential
            .map(|cred| serde_json::to_value(&cred).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        Ok(merge_fields(
            payload,
            [
                ("service".to_string(), json!(service)),
                ("key".to_string(), key),
                ("authenticated".to_string(), json!(authenticated)),
            ],
        ))
    }

    /// Integration node: apply the incoming credential through the updater.
    /// Updater failure is this node's processing error.
    async fn process_integration(
        &self,
        node_id: &str,
        payload: Value,
    ) -> Result<Value, EngineError> {
        let integration = {
            let graph = self.graph.read();
            let node = graph.node(node_id).ok_or_else(|| EngineError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            node.data_str("integration").unwrap_or(node_id).to_string()
        };

        let credential = payload
            .get("key")
            .cloned()
            .and_then(|key| serde_json::from_value::<Credential>(key).ok());
        if let (Some(credential), Some(service)) = (credential, str_field(&payload, "service")) {
            self.integrations
                .apply(&integration, service, &credential)
                .await?;
        }

        Ok(merge_fields(
            payload,
            [
                ("integration".to_string(), json!(integration)),
                ("configured".to_string(), json!(true)),
            ],
        ))
    }

    /// Session node: record the payload against a session-scoped entry with
    /// a fresh timestamp.
    fn process_session(&self, node_id: &str, payload: Value) -> Value {
        let now = Utc::now();
        let mut entries = self.session_entries.lock();
        let entry = entries
            .entry(node_id.to_string())
            .or_insert_with(|| SessionEntry {
                payload: Value::Null,
                created_at: now,
                last_activity: now,
                active: true,
            });
        entry.payload = payload.clone();
        entry.last_activity = now;
        entry.active = true;

        merge_fields(
            payload,
            [
                ("session".to_string(), json!(node_id)),
                ("active".to_string(), json!(true)),
            ],
        )
    }

    /// Router node: strategy selection by configured mode.
    async fn process_router(
        &self,
        node_id: &str,
        payload: Value,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        let (mode, outputs) = {
            let graph = self.graph.read();
            let node = graph.node(node_id).ok_or_else(|| EngineError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            let outputs = graph
                .output_connections(node_id)
                .into_iter()
                .map(|conn| RouterOutput {
                    target: conn.target.clone(),
                    priority: conn.priority,
                    target_state: graph
                        .node(&conn.target)
                        .map(|n| n.state)
                        .unwrap_or(NodeState::Error),
                })
                .collect::<Vec<_>>();
            (node.router_mode(), outputs)
        };
        self.route_with_strategy(mode, node_id, payload, outputs, ctx)
            .await
    }
}
