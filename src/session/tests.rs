#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::event_bus::{Event, EventBus, MemorySink};
    use crate::graph::snapshot::{ConnectionSnapshot, NodeSnapshot};
    use crate::providers::{
        Credential, HealthCheckProvider, ProviderError, RecordingIntegrations,
    };
    use crate::session::{
        SessionError, SessionManager, SessionOptions, SessionPhase, SessionStore,
    };
    use crate::types::{NodeKind, NodeState};

    fn manager_in(dir: &tempfile::TempDir) -> SessionManager {
        SessionManager::new(SessionStore::new(dir.path()))
    }

    /// Health provider scripted per service: fail some, hang others.
    #[derive(Debug, Default)]
    struct ScriptedHealth {
        failing: Vec<String>,
        hanging: Vec<String>,
        checked: Mutex<Vec<String>>,
    }

    impl ScriptedHealth {
        fn failing(mut self, service: &str) -> Self {
            self.failing.push(service.to_string());
            self
        }

        fn hanging(mut self, service: &str) -> Self {
            self.hanging.push(service.to_string());
            self
        }
    }

    #[async_trait]
    impl HealthCheckProvider for ScriptedHealth {
        async fn check(&self, service_id: &str) -> Result<bool, ProviderError> {
            self.checked.lock().push(service_id.to_string());
            if self.hanging.iter().any(|s| s == service_id) {
                std::future::pending::<()>().await;
            }
            if self.failing.iter().any(|s| s == service_id) {
                return Err(ProviderError::HealthCheck {
                    service: service_id.to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn create_from_template_copies_topology() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("glm", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(session.template.as_deref(), Some("all-glm5"));
        assert_eq!(session.nodes.len(), 4);
        assert_eq!(session.connections.len(), 3);
        assert_eq!(session.state, SessionPhase::Created);
    }

    #[tokio::test]
    async fn create_with_unknown_template_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let err = manager
            .create_session("x", Some("nope"), SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TemplateNotFound { .. }));
    }

    #[tokio::test]
    async fn persistent_sessions_survive_a_manager_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let manager = manager_in(&dir);
            let session = manager
                .create_session("durable", Some("all-glm5"), SessionOptions::default())
                .await
                .unwrap();
            session.id
        };

        let manager = manager_in(&dir);
        let loaded = manager.load_session(&id).await.unwrap();
        assert_eq!(loaded.state, SessionPhase::Loaded);
        assert_eq!(loaded.nodes.len(), 4);
    }

    #[tokio::test]
    async fn non_persistent_sessions_cannot_be_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let manager = manager_in(&dir);
            let session = manager
                .create_session(
                    "ephemeral",
                    None,
                    SessionOptions {
                        persistent: false,
                        ..SessionOptions::default()
                    },
                )
                .await
                .unwrap();
            session.id
        };

        let manager = manager_in(&dir);
        let err = manager.load_session(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn start_connects_services_then_activates_integrations() {
        let dir = tempfile::tempdir().unwrap();
        let integrations = Arc::new(RecordingIntegrations::new());
        let manager = manager_in(&dir).with_integrations(integrations.clone());

        let mut session = manager
            .create_session("glm", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        // Mark the key as active and give it a credential to wire through.
        for node in &mut session.nodes {
            if node.kind == NodeKind::Key {
                node.state = Some(NodeState::Active);
                node.data.insert(
                    "key".to_string(),
                    serde_json::to_value(Credential::new("glm5", "k1", "sk-test")).unwrap(),
                );
            }
        }
        let snapshot = crate::graph::GraphSnapshot {
            nodes: session.nodes.clone(),
            connections: session.connections.clone(),
            template: session.template.clone(),
        };
        manager.import_graph(&session.id, snapshot).await.unwrap();

        let started = manager.start_session(&session.id).await.unwrap();
        assert_eq!(started.state, SessionPhase::Active);
        let service_states: Vec<_> = started
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Service)
            .map(|n| n.state)
            .collect();
        assert_eq!(service_states, [Some(NodeState::Connected)]);

        // Both integrations got the glm5 credential.
        let applied = integrations.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied.contains(&(
            "claude-code".to_string(),
            "glm5".to_string(),
            "k1".to_string()
        )));
    }

    #[tokio::test]
    async fn start_failure_leaves_earlier_services_connected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir)
            .with_health(Arc::new(ScriptedHealth::default().failing("anthropic")));

        let session = manager
            .create_session("ensemble", Some("multi-model-ensemble"), SessionOptions::default())
            .await
            .unwrap();
        let err = manager.start_session(&session.id).await.unwrap_err();
        assert!(matches!(err, SessionError::Provider(_)));

        let status = manager.session_status(&session.id).unwrap();
        assert_eq!(status.state, SessionPhase::Error);

        let state_of = |id: &str| {
            status
                .nodes
                .iter()
                .find(|n| n.id == id)
                .map(|n| n.state)
                .unwrap()
        };
        assert_eq!(state_of("openai-service"), NodeState::Connected);
        assert_eq!(state_of("anthropic-service"), NodeState::Connecting);
        assert_eq!(state_of("glm5-service"), NodeState::Idle);

        // The failure is persisted with a non-empty message.
        let manager = manager_in(&dir);
        let reloaded = manager.load_session(&session.id).await.unwrap();
        assert!(reloaded.error.is_some_and(|msg| !msg.is_empty()));
    }

    #[tokio::test]
    async fn cancelling_a_hung_start_errors_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(
            manager_in(&dir)
                .with_health(Arc::new(ScriptedHealth::default().hanging("openai")))
                .with_health_timeout(Duration::from_secs(60)),
        );

        let session = manager
            .create_session("hung", Some("multi-model-ensemble"), SessionOptions::default())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            let id = session.id.clone();
            let cancel = cancel.clone();
            async move { manager.start_session_with_cancel(&id, cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Cancelled { .. }));
        assert_eq!(
            manager.session_status(&session.id).unwrap().state,
            SessionPhase::Error
        );
    }

    #[tokio::test]
    async fn monitoring_opt_out_skips_health_checks() {
        let dir = tempfile::tempdir().unwrap();
        let health = Arc::new(ScriptedHealth::default().failing("glm5"));
        let manager = manager_in(&dir).with_health(health.clone());

        let session = manager
            .create_session(
                "unmonitored",
                Some("all-glm5"),
                SessionOptions {
                    monitor_health: false,
                    ..SessionOptions::default()
                },
            )
            .await
            .unwrap();
        let started = manager.start_session(&session.id).await.unwrap();
        assert_eq!(started.state, SessionPhase::Active);
        assert!(health.checked.lock().is_empty());
    }

    #[tokio::test]
    async fn stop_deactivates_integrations_only() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("glm", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        manager.start_session(&session.id).await.unwrap();
        let stopped = manager.stop_session(&session.id).await.unwrap();

        assert_eq!(stopped.state, SessionPhase::Stopped);
        for node in &stopped.nodes {
            match node.kind {
                NodeKind::Integration => assert_eq!(node.state, Some(NodeState::Inactive)),
                NodeKind::Service => assert_eq!(node.state, Some(NodeState::Connected)),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn stop_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);
        let err = manager.stop_session("session-ghost").await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn resume_restarts_only_stopped_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("glm", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        // Not stopped: resume is a no-op returning the record unchanged.
        let resumed = manager.resume_session(&session.id).await.unwrap();
        assert_eq!(resumed.state, SessionPhase::Created);

        manager.start_session(&session.id).await.unwrap();
        manager.stop_session(&session.id).await.unwrap();
        let resumed = manager.resume_session(&session.id).await.unwrap();
        assert_eq!(resumed.state, SessionPhase::Active);
    }

    #[tokio::test]
    async fn delete_removes_memory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("doomed", None, SessionOptions::default())
            .await
            .unwrap();
        manager.delete_session(&session.id).await.unwrap();

        assert!(manager.session_status(&session.id).is_none());
        let manager = manager_in(&dir);
        assert!(matches!(
            manager.load_session(&session.id).await.unwrap_err(),
            SessionError::SessionNotFound { .. }
        ));

        // Unknown ids are a no-op.
        manager.delete_session("session-ghost").await.unwrap();
    }

    #[tokio::test]
    async fn apply_template_replaces_topology() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("retarget", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        let applied = manager
            .apply_template_to_session(&session.id, "kiro-proxy-4.5")
            .await
            .unwrap();
        assert_eq!(applied.template.as_deref(), Some("kiro-proxy-4.5"));
        assert_eq!(applied.nodes.len(), 5);

        let err = manager
            .apply_template_to_session(&session.id, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TemplateNotFound { .. }));
    }

    #[tokio::test]
    async fn list_sessions_keeps_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        for name in ["one", "two", "three"] {
            manager
                .create_session(name, None, SessionOptions::default())
                .await
                .unwrap();
        }
        let names: Vec<String> = manager
            .list_sessions()
            .into_iter()
            .map(|status| status.name)
            .collect();
        assert_eq!(names, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn export_import_round_trips_topology() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let session = manager
            .create_session("editable", None, SessionOptions::default())
            .await
            .unwrap();
        let mut snapshot = manager.export_graph(&session.id).unwrap();
        assert!(snapshot.nodes.is_empty());

        snapshot
            .nodes
            .push(NodeSnapshot::new("svc", NodeKind::Service).with_data("service", json!("glm5")));
        snapshot
            .nodes
            .push(NodeSnapshot::new("router", NodeKind::Router));
        snapshot
            .connections
            .push(ConnectionSnapshot::between("svc", "router"));

        let updated = manager.import_graph(&session.id, snapshot.clone()).await.unwrap();
        assert_eq!(updated.nodes.len(), 2);
        let exported = manager.export_graph(&session.id).unwrap();
        assert_eq!(exported.nodes, snapshot.nodes);
        assert_eq!(exported.connections, snapshot.connections);
    }

    #[tokio::test]
    async fn lifecycle_emits_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());
        bus.listen_for_events();
        let manager = manager_in(&dir).with_emitter(Arc::new(bus.emitter()));

        let session = manager
            .create_session("observed", Some("all-glm5"), SessionOptions::default())
            .await
            .unwrap();
        manager.start_session(&session.id).await.unwrap();
        manager.stop_session(&session.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let labels: Vec<&'static str> = sink
            .snapshot()
            .iter()
            .filter(|event| matches!(event, Event::Session(_)))
            .map(Event::scope_label)
            .collect();
        assert_eq!(labels[0], "sessionCreated");
        assert_eq!(labels[1], "sessionStarting");
        let started = labels.iter().position(|l| *l == "sessionStarted").unwrap();
        let stopping = labels.iter().position(|l| *l == "sessionStopping").unwrap();
        assert!(started < stopping);
        assert_eq!(*labels.last().unwrap(), "sessionStopped");
        assert!(labels.contains(&"serviceConnected"));
        assert!(labels.contains(&"integrationActivated"));
        assert!(labels.contains(&"integrationDeactivated"));
    }
}
