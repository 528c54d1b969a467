//! Core types for the patchbay routing graph.
//!
//! This module defines the closed variant sets that describe what a routing
//! graph *is*: the node taxonomy ([`NodeKind`]), the node lifecycle states
//! ([`NodeState`]), and the router selection strategies ([`RouterMode`]).
//!
//! All three serialize to the lowercase wire strings used by the persisted
//! graph snapshot format, so graphs written by external editors round-trip
//! exactly.
//!
//! # Examples
//!
//! ```rust
//! use patchbay::types::{NodeKind, RouterMode};
//!
//! let kind = NodeKind::Router;
//! assert_eq!(kind.as_str(), "router");
//!
//! let mode = RouterMode::parse("round-robin");
//! assert_eq!(mode, Some(RouterMode::RoundRobin));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the type of a node within a routing graph.
///
/// Each kind carries its own processing semantics in the execution engine:
/// services attach availability, keys attach credentials, routers select
/// among outgoing connections, integrations apply credentials to external
/// tools, and session nodes record payloads against session-scoped entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A credentialed service endpoint (checked for availability).
    Service,
    /// An API key / credential slot resolved through the key store.
    Key,
    /// A routing point that selects among outgoing connections.
    Router,
    /// An external tool configuration updated with resolved credentials.
    Integration,
    /// A session-scoped recording point.
    Session,
}

impl NodeKind {
    /// Stable lowercase encoding used in snapshots and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Service => "service",
            NodeKind::Key => "key",
            NodeKind::Router => "router",
            NodeKind::Integration => "integration",
            NodeKind::Session => "session",
        }
    }

    /// Decode from the snapshot encoding. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service" => Some(NodeKind::Service),
            "key" => Some(NodeKind::Key),
            "router" => Some(NodeKind::Router),
            "integration" => Some(NodeKind::Integration),
            "session" => Some(NodeKind::Session),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a node.
///
/// The first four states belong to the execution engine and are monotonic
/// within a single `process` invocation (idle → processing → completed |
/// error). The remainder are session-lifecycle states written by the
/// [`SessionManager`](crate::session::SessionManager) while bringing nodes up
/// and down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
    /// Service node establishing connectivity during session start.
    Connecting,
    /// Service node with established connectivity.
    Connected,
    /// Key or integration node wired into an active session.
    Active,
    /// Integration node deactivated by session stop.
    Inactive,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Idle => "idle",
            NodeState::Processing => "processing",
            NodeState::Completed => "completed",
            NodeState::Error => "error",
            NodeState::Connecting => "connecting",
            NodeState::Connected => "connected",
            NodeState::Active => "active",
            NodeState::Inactive => "inactive",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection strategy applied at a router node.
///
/// Stored in the router node's `data` map under `"mode"`; unknown or missing
/// modes fall back to [`RouterMode::Failover`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterMode {
    #[default]
    #[serde(rename = "failover")]
    Failover,
    #[serde(rename = "round-robin")]
    RoundRobin,
    #[serde(rename = "parallel")]
    Parallel,
    #[serde(rename = "load-balance")]
    LoadBalance,
}

impl RouterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterMode::Failover => "failover",
            RouterMode::RoundRobin => "round-robin",
            RouterMode::Parallel => "parallel",
            RouterMode::LoadBalance => "load-balance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "failover" => Some(RouterMode::Failover),
            "round-robin" => Some(RouterMode::RoundRobin),
            "parallel" => Some(RouterMode::Parallel),
            "load-balance" => Some(RouterMode::LoadBalance),
            _ => None,
        }
    }
}

impl fmt::Display for RouterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
