//! Directed, typed, prioritizable edges between graph nodes.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Connection identity is a pure function of the ordered endpoint pair, which
/// enforces at most one connection per `(source, target)`.
pub fn connection_id(source: &str, target: &str) -> String {
    format!("{source}->{target}")
}

/// A directed edge jointly owned by its endpoints' input/output lists.
///
/// Both endpoint lists and the registry map are updated together on creation
/// and removal; a `Connection` never outlives either endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Data/control label. Free-form; `"data"` by default.
    pub kind: String,
    /// Inactive connections are skipped by fan-out and rejected by routing.
    pub active: bool,
    /// Router tie-break: higher wins, insertion order breaks ties.
    pub priority: i64,
    pub label: String,
    pub metadata: FxHashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>, options: ConnectOptions) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: connection_id(&source, &target),
            source,
            target,
            kind: options.kind,
            active: options.active,
            priority: options.priority,
            label: options.label,
            metadata: options.metadata,
            created_at: Utc::now(),
            last_used: None,
        }
    }
}

/// Options for creating a connection.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub kind: String,
    pub active: bool,
    pub priority: i64,
    pub label: String,
    pub metadata: FxHashMap<String, Value>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            kind: "data".to_string(),
            active: true,
            priority: 0,
            label: String::new(),
            metadata: FxHashMap::default(),
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: FxHashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
