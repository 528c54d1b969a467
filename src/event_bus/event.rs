use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::graph::snapshot::{ConnectionSnapshot, NodeSnapshot};

/// A typed notification published on the patchbay event bus.
///
/// Events are grouped by origin: graph registry mutations, execution engine
/// state changes, and session lifecycle transitions. Dispatch is ordered: the
/// bus drains its channel in emission order and hands each event to every
/// registered sink before the next.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Graph(GraphEvent),
    Exec(ExecEvent),
    Session(SessionEvent),
}

/// Registry mutations: nodes and connections entering or leaving the graph.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all_fields = "camelCase")]
pub enum GraphEvent {
    NodeAdded { node: NodeSnapshot },
    NodeRemoved { node_id: String },
    ConnectionCreated { connection: ConnectionSnapshot },
    ConnectionRemoved { connection_id: String },
}

/// Execution engine state changes for a single node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all_fields = "camelCase")]
pub enum ExecEvent {
    NodeProcessing { node_id: String, payload: Value },
    NodeCompleted { node_id: String, result: Value },
    NodeError { node_id: String, error: String },
}

/// Session lifecycle transitions and side effects of starting/stopping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all_fields = "camelCase")]
pub enum SessionEvent {
    Created { session_id: String, name: String },
    Loaded { session_id: String },
    Starting { session_id: String },
    Started { session_id: String },
    Stopping { session_id: String },
    Stopped { session_id: String },
    Error { session_id: String, error: String },
    Deleted { session_id: String },
    ServiceConnected { session_id: String, service: String },
    IntegrationActivated { session_id: String, integration: String },
    IntegrationDeactivated { session_id: String, integration: String },
    TemplateApplied { session_id: String, template_id: String },
}

impl Event {
    /// Short label naming the event variant, stable across releases.
    pub fn scope_label(&self) -> &'static str {
        match self {
            Event::Graph(GraphEvent::NodeAdded { .. }) => "nodeAdded",
            Event::Graph(GraphEvent::NodeRemoved { .. }) => "nodeRemoved",
            Event::Graph(GraphEvent::ConnectionCreated { .. }) => "connectionCreated",
            Event::Graph(GraphEvent::ConnectionRemoved { .. }) => "connectionRemoved",
            Event::Exec(ExecEvent::NodeProcessing { .. }) => "nodeProcessing",
            Event::Exec(ExecEvent::NodeCompleted { .. }) => "nodeCompleted",
            Event::Exec(ExecEvent::NodeError { .. }) => "nodeError",
            Event::Session(SessionEvent::Created { .. }) => "sessionCreated",
            Event::Session(SessionEvent::Loaded { .. }) => "sessionLoaded",
            Event::Session(SessionEvent::Starting { .. }) => "sessionStarting",
            Event::Session(SessionEvent::Started { .. }) => "sessionStarted",
            Event::Session(SessionEvent::Stopping { .. }) => "sessionStopping",
            Event::Session(SessionEvent::Stopped { .. }) => "sessionStopped",
            Event::Session(SessionEvent::Error { .. }) => "sessionError",
            Event::Session(SessionEvent::Deleted { .. }) => "sessionDeleted",
            Event::Session(SessionEvent::ServiceConnected { .. }) => "serviceConnected",
            Event::Session(SessionEvent::IntegrationActivated { .. }) => "integrationActivated",
            Event::Session(SessionEvent::IntegrationDeactivated { .. }) => "integrationDeactivated",
            Event::Session(SessionEvent::TemplateApplied { .. }) => "templateApplied",
        }
    }

    /// Identifier of the entity this event concerns (node, connection, or
    /// session id).
    pub fn subject(&self) -> &str {
        match self {
            Event::Graph(GraphEvent::NodeAdded { node }) => &node.id,
            Event::Graph(GraphEvent::NodeRemoved { node_id }) => node_id,
            Event::Graph(GraphEvent::ConnectionCreated { connection }) => &connection.id,
            Event::Graph(GraphEvent::ConnectionRemoved { connection_id }) => connection_id,
            Event::Exec(
                ExecEvent::NodeProcessing { node_id, .. }
                | ExecEvent::NodeCompleted { node_id, .. }
                | ExecEvent::NodeError { node_id, .. },
            ) => node_id,
            Event::Session(
                SessionEvent::Created { session_id, .. }
                | SessionEvent::Loaded { session_id }
                | SessionEvent::Starting { session_id }
                | SessionEvent::Started { session_id }
                | SessionEvent::Stopping { session_id }
                | SessionEvent::Stopped { session_id }
                | SessionEvent::Error { session_id, .. }
                | SessionEvent::Deleted { session_id }
                | SessionEvent::ServiceConnected { session_id, .. }
                | SessionEvent::IntegrationActivated { session_id, .. }
                | SessionEvent::IntegrationDeactivated { session_id, .. }
                | SessionEvent::TemplateApplied { session_id, .. },
            ) => session_id,
        }
    }

    /// Normalized JSON form used by structured sinks:
    /// `{ "event": <scope>, "subject": <id>, "timestamp": <rfc3339>,
    ///    "detail": <variant payload> }`.
    pub fn to_json_value(&self) -> Value {
        let detail = serde_json::to_value(self).unwrap_or(Value::Null);
        json!({
            "event": self.scope_label(),
            "subject": self.subject(),
            "timestamp": Utc::now().to_rfc3339(),
            "detail": detail,
        })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Exec(ExecEvent::NodeError { node_id, error }) => {
                write!(f, "[{node_id}] {}: {error}", self.scope_label())
            }
            Event::Session(SessionEvent::Error { session_id, error }) => {
                write!(f, "[{session_id}] {}: {error}", self.scope_label())
            }
            Event::Session(SessionEvent::ServiceConnected {
                session_id,
                service,
            }) => write!(f, "[{session_id}] {}: {service}", self.scope_label()),
            Event::Session(
                SessionEvent::IntegrationActivated {
                    session_id,
                    integration,
                }
                | SessionEvent::IntegrationDeactivated {
                    session_id,
                    integration,
                },
            ) => write!(f, "[{session_id}] {}: {integration}", self.scope_label()),
            other => write!(f, "[{}] {}", other.subject(), other.scope_label()),
        }
    }
}
