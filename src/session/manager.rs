//! Session lifecycle: create, load, start, stop, resume, delete.
//!
//! The manager owns the in-memory session table and pushes every durable
//! mutation through the [`SessionStore`]. Lifecycle operations work on a
//! clone of the record and write it back under a short lock scope, so no
//! lock is ever held across an await.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::model::{Session, SessionOptions, SessionPhase, SessionStatus};
use super::store::{PersistenceError, SessionStore};
use super::templates::TemplateRegistry;
use crate::event_bus::{Event, EventEmitter, NullEmitter, SessionEvent};
use crate::graph::snapshot::GraphSnapshot;
use crate::providers::{
    Credential, HealthCheckProvider, IntegrationUpdater, ProviderError, RecordingIntegrations,
    StaticHealth,
};
use crate::types::{NodeKind, NodeState};

const HEALTH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("session {session_id} not found")]
    #[diagnostic(code(patchbay::session::not_found))]
    SessionNotFound { session_id: String },

    #[error("template {template_id} not found")]
    #[diagnostic(
        code(patchbay::session::template_not_found),
        help("list available templates through the registry before applying one")
    )]
    TemplateNotFound { template_id: String },

    #[error("session {session_id} start cancelled")]
    #[diagnostic(code(patchbay::session::cancelled))]
    Cancelled { session_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),
}

/// Orchestrates session lifecycles over a store, a template registry, and
/// the provider seams shared with the engine.
pub struct SessionManager {
    store: SessionStore,
    templates: TemplateRegistry,
    sessions: Mutex<SessionTable>,
    health: Arc<dyn HealthCheckProvider>,
    integrations: Arc<dyn IntegrationUpdater>,
    emitter: Arc<dyn EventEmitter>,
    health_timeout: std::time::Duration,
}

#[derive(Default)]
struct SessionTable {
    by_id: FxHashMap<String, Session>,
    order: Vec<String>,
}

impl SessionTable {
    fn insert(&mut self, session: Session) {
        if !self.by_id.contains_key(&session.id) {
            self.order.push(session.id.clone());
        }
        self.by_id.insert(session.id.clone(), session);
    }

    fn remove(&mut self, session_id: &str) -> Option<Session> {
        self.order.retain(|id| id != session_id);
        self.by_id.remove(session_id)
    }
}

impl SessionManager {
    /// Manager with placeholder providers and no event bus.
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            templates: TemplateRegistry::builtin(),
            sessions: Mutex::new(SessionTable::default()),
            health: Arc::new(StaticHealth::up()),
            integrations: Arc::new(RecordingIntegrations::new()),
            emitter: Arc::new(NullEmitter),
            health_timeout: HEALTH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_health(mut self, health: Arc<dyn HealthCheckProvider>) -> Self {
        self.health = health;
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

    #[must_use]
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    #[must_use]
    pub fn with_health_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.emitter.emit(Event::Session(event));
    }

    fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        self.sessions
            .lock()
            .by_id
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    fn put(&self, session: Session) {
        self.sessions.lock().insert(session);
    }

    /// Create a session, optionally from a template, and persist it.
    ///
    /// With `auto_start` set the session is started before returning.
    pub async fn create_session(
        &self,
        name: impl Into<String>,
        template_id: Option<&str>,
        options: SessionOptions,
    ) -> Result<Session, SessionError> {
        let mut session = Session::new(name, options);

        if let Some(template_id) = template_id {
            let template = self.templates.get(template_id).ok_or_else(|| {
                SessionError::TemplateNotFound {
                    template_id: template_id.to_string(),
                }
            })?;
            session.nodes = template.nodes.clone();
            session.connections = template.connections.clone();
            session.template = Some(template_id.to_string());
            session.template_config = template.config.clone();
        }

        self.store.save(&session).await?;
        self.put(session.clone());
        info!(session_id = %session.id, name = %session.name, "session created");
        self.emit(SessionEvent::Created {
            session_id: session.id.clone(),
            name: session.name.clone(),
        });

        if session.options.auto_start {
            return self.start_session(&session.id).await;
        }
        Ok(session)
    }

    /// Load a persisted session into the manager.
    pub async fn load_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let mut session = self.store.load(session_id).await?.ok_or_else(|| {
            SessionError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;
        session.state = SessionPhase::Loaded;
        session.touch();

        self.put(session.clone());
        self.emit(SessionEvent::Loaded {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// Start a session: connect its services, then activate its
    /// integrations.
    pub async fn start_session(&self, session_id: &str) -> Result<Session, SessionError> {
        self.start_session_with_cancel(session_id, CancellationToken::new())
            .await
    }

    /// [`Self::start_session`], abortable through a token. Cancellation is
    /// observed between nodes; a session abandoned mid-start is left in the
    /// `error` phase.
    pub async fn start_session_with_cancel(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<Session, SessionError> {
        let mut session = self.get(session_id)?;
        session.state = SessionPhase::Starting;
        session.error = None;
        self.put(session.clone());
        self.store.save(&session).await?;
        self.emit(SessionEvent::Starting {
            session_id: session_id.to_string(),
        });

        match self.bring_up(&mut session, &cancel).await {
            Ok(()) => {
                session.state = SessionPhase::Active;
                session.touch();
                self.put(session.clone());
                self.store.save(&session).await?;
                info!(session_id, "session started");
                self.emit(SessionEvent::Started {
                    session_id: session_id.to_string(),
                });
                Ok(session)
            }
            Err(error) => {
                session.state = SessionPhase::Error;
                session.error = Some(error.to_string());
                session.stats.errors += 1;
                session.touch();
                self.put(session.clone());
                self.store.save(&session).await?;
                warn!(session_id, %error, "session start failed");
                self.emit(SessionEvent::Error {
                    session_id: session_id.to_string(),
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Connect services in topology order, then wire integrations. Fails
    /// fast: the first error leaves earlier nodes in their reached state.
    async fn bring_up(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let service_nodes: Vec<(String, String)> = session
            .nodes_of_kind(NodeKind::Service)
            .map(|node| {
                let service = node.data_str("service").unwrap_or(&node.id).to_string();
                (node.id.clone(), service)
            })
            .collect();

        for (node_id, service) in &service_nodes {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled {
                    session_id: session.id.clone(),
                });
            }
            session.set_node_state(node_id, NodeState::Connecting);
            if session.options.monitor_health {
                self.connect_service(&session.id, service, cancel).await?;
            }
            session.set_node_state(node_id, NodeState::Connected);
            self.emit(SessionEvent::ServiceConnected {
                session_id: session.id.clone(),
                service: service.clone(),
            });
        }

        let credentials: Vec<Credential> = session
            .nodes_of_kind(NodeKind::Key)
            .filter(|node| node.state == Some(NodeState::Active))
            .filter_map(|node| {
                node.data
                    .get("key")
                    .cloned()
                    .and_then(|key| serde_json::from_value(key).ok())
            })
            .collect();

        let integration_nodes: Vec<(String, String)> = session
            .nodes_of_kind(NodeKind::Integration)
            .map(|node| {
                let integration = node.data_str("integration").unwrap_or(&node.id).to_string();
                (node.id.clone(), integration)
            })
            .collect();

        for (node_id, integration) in &integration_nodes {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled {
                    session_id: session.id.clone(),
                });
            }
            for credential in &credentials {
                self.integrations
                    .apply(integration, &credential.service, credential)
                    .await?;
            }
            session.set_node_state(node_id, NodeState::Active);
            self.emit(SessionEvent::IntegrationActivated {
                session_id: session.id.clone(),
                integration: integration.clone(),
            });
        }
        Ok(())
    }

    /// One service connection attempt. Health checks are skipped when the
    /// session opts out of monitoring; a check that times out or reports the
    /// service down fails the start.
    async fn connect_service(
        &self,
        session_id: &str,
        service: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let available = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SessionError::Cancelled { session_id: session_id.to_string() });
            }
            checked = tokio::time::timeout(self.health_timeout, self.health.check(service)) => {
                match checked {
                    Ok(result) => result?,
                    Err(_elapsed) => {
                        return Err(SessionError::Provider(ProviderError::HealthCheck {
                            service: service.to_string(),
                            message: "health check timed out".to_string(),
                        }));
                    }
                }
            }
        };
        if !available {
            return Err(SessionError::Provider(ProviderError::HealthCheck {
                service: service.to_string(),
                message: "service unavailable".to_string(),
            }));
        }
        Ok(())
    }

    /// Stop a session: deactivate integrations only, services stay as they
    /// are.
    pub async fn stop_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let mut session = self.get(session_id)?;
        session.state = SessionPhase::Stopping;
        self.put(session.clone());
        self.emit(SessionEvent::Stopping {
            session_id: session_id.to_string(),
        });

        let integration_nodes: Vec<(String, String)> = session
            .nodes_of_kind(NodeKind::Integration)
            .map(|node| {
                let integration = node.data_str("integration").unwrap_or(&node.id).to_string();
                (node.id.clone(), integration)
            })
            .collect();
        for (node_id, integration) in &integration_nodes {
            session.set_node_state(node_id, NodeState::Inactive);
            self.emit(SessionEvent::IntegrationDeactivated {
                session_id: session_id.to_string(),
                integration: integration.clone(),
            });
        }

        session.state = SessionPhase::Stopped;
        session.touch();
        self.put(session.clone());
        self.store.save(&session).await?;
        info!(session_id, "session stopped");
        self.emit(SessionEvent::Stopped {
            session_id: session_id.to_string(),
        });
        Ok(session)
    }

    /// Restart a stopped session. Any other phase is returned unchanged.
    pub async fn resume_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let session = self.get(session_id)?;
        if session.state == SessionPhase::Stopped {
            return self.start_session(session_id).await;
        }
        Ok(session)
    }

    /// Delete a session from memory and disk. Active sessions are stopped
    /// first; unknown ids are a no-op.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SessionError> {
        let Ok(session) = self.get(session_id) else {
            return Ok(());
        };
        if session.state == SessionPhase::Active {
            self.stop_session(session_id).await?;
        }

        self.sessions.lock().remove(session_id);
        self.store.remove(session_id).await?;
        info!(session_id, "session deleted");
        self.emit(SessionEvent::Deleted {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    /// Replace a session's topology with a template's.
    pub async fn apply_template_to_session(
        &self,
        session_id: &str,
        template_id: &str,
    ) -> Result<Session, SessionError> {
        let template = self.templates.get(template_id).ok_or_else(|| {
            SessionError::TemplateNotFound {
                template_id: template_id.to_string(),
            }
        })?;
        let mut session = self.get(session_id)?;

        session.nodes = template.nodes.clone();
        session.connections = template.connections.clone();
        session.template = Some(template_id.to_string());
        session.template_config = template.config.clone();
        session.touch();

        self.put(session.clone());
        self.store.save(&session).await?;
        self.emit(SessionEvent::TemplateApplied {
            session_id: session_id.to_string(),
            template_id: template_id.to_string(),
        });
        Ok(session)
    }

    /// Status projection for one session, `None` when unknown.
    pub fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.sessions
            .lock()
            .by_id
            .get(session_id)
            .map(Session::status)
    }

    /// Status of every managed session, in creation order.
    pub fn list_sessions(&self) -> Vec<SessionStatus> {
        let table = self.sessions.lock();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .map(Session::status)
            .collect()
    }

    /// A session's topology in the graph wire shape.
    pub fn export_graph(&self, session_id: &str) -> Option<GraphSnapshot> {
        let table = self.sessions.lock();
        table.by_id.get(session_id).map(|session| GraphSnapshot {
            nodes: session.nodes.clone(),
            connections: session.connections.clone(),
            template: session.template.clone(),
        })
    }

    /// Replace a session's topology from the graph wire shape.
    pub async fn import_graph(
        &self,
        session_id: &str,
        snapshot: GraphSnapshot,
    ) -> Result<Session, SessionError> {
        let mut session = self.get(session_id)?;
        session.nodes = snapshot.nodes;
        session.connections = snapshot.connections;
        session.touch();

        self.put(session.clone());
        self.store.save(&session).await?;
        Ok(session)
    }
}
