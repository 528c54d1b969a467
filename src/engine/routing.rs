//! Routing strategies invoked at router-type nodes.
//!
//! A router's strategy owns every routing decision made at that node:
//! failover walks prioritized targets until one succeeds, round-robin
//! rotates a cursor persisted in the router's `data`, parallel fans out to
//! everything and isolates per-target failures, load-balance picks uniformly
//! among healthy targets through a seedable random source.

use futures_util::future::join_all;
use rand::Rng;
use serde_json::{Value, json};
use tracing::warn;

use super::EngineError;
use super::executor::{Engine, ExecContext, RouterOutput};
use crate::types::{NodeState, RouterMode};
use crate::utils::merge_fields;

/// Key in a router node's `data` map holding the round-robin cursor.
/// Matches the persisted graph format, so cursors survive serialization.
const RR_CURSOR_KEY: &str = "rrIndex";

impl Engine {
    pub(super) async fn route_with_strategy(
        &self,
        mode: RouterMode,
        router_id: &str,
        payload: Value,
        outputs: Vec<RouterOutput>,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        match mode {
            RouterMode::Failover => self.route_failover(router_id, payload, outputs, ctx).await,
            RouterMode::RoundRobin => self.route_round_robin(router_id, payload, outputs, ctx).await,
            RouterMode::Parallel => self.route_parallel(router_id, payload, outputs, ctx).await,
            RouterMode::LoadBalance => {
                self.route_load_balanced(router_id, payload, outputs, ctx).await
            }
        }
    }

    /// Try targets in descending priority order (stable: ties keep creation
    /// order), skipping targets already in `error` state. First success
    /// wins; exhaustion is an error.
    async fn route_failover(
        &self,
        router_id: &str,
        payload: Value,
        mut outputs: Vec<RouterOutput>,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        outputs.sort_by(|a, b| b.priority.cmp(&a.priority));

        for output in &outputs {
            if output.target_state == NodeState::Error {
                continue;
            }
            match self
                .route_data(router_id, &output.target, payload.clone(), ctx.clone())
                .await
            {
                Ok(_) => {
                    return Ok(merge_fields(
                        payload,
                        [
                            ("routed".to_string(), json!(true)),
                            ("target".to_string(), json!(output.target)),
                        ],
                    ));
                }
                Err(error) => {
                    warn!(router_id, target = %output.target, %error, "failover target failed");
                }
            }
        }

        Err(EngineError::ExhaustedFailover {
            router_id: router_id.to_string(),
        })
    }

    /// Select `outputs[cursor % len]` and advance the cursor. The cursor is
    /// read-modify-written on the router's `data` under the graph write
    /// lock, so overlapping invocations on the same router serialize.
    async fn route_round_robin(
        &self,
        router_id: &str,
        payload: Value,
        outputs: Vec<RouterOutput>,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        if outputs.is_empty() {
            return Err(EngineError::NoHealthyTarget {
                router_id: router_id.to_string(),
            });
        }

        let target = {
            let mut graph = self.graph.write();
            let node = graph
                .node_mut(router_id)
                .ok_or_else(|| EngineError::NodeNotFound {
                    node_id: router_id.to_string(),
                })?;
            let cursor = node
                .data
                .get(RR_CURSOR_KEY)
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let index = cursor % outputs.len();
            node.data
                .insert(RR_CURSOR_KEY.to_string(), json!((index + 1) as u64));
            outputs[index].target.clone()
        };

        self.route_data(router_id, &target, payload.clone(), ctx.clone())
            .await?;
        Ok(merge_fields(
            payload,
            [
                ("routed".to_string(), json!(true)),
                ("target".to_string(), json!(target)),
                ("strategy".to_string(), json!("round-robin")),
            ],
        ))
    }

    /// Route to every output concurrently. Never fails as a whole: each
    /// target settles into a `fulfilled`/`rejected` entry of the result
    /// vector.
    async fn route_parallel(
        &self,
        router_id: &str,
        payload: Value,
        outputs: Vec<RouterOutput>,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        let attempts = outputs.iter().map(|output| {
            let target = output.target.clone();
            let payload = payload.clone();
            let ctx = ctx.clone();
            async move {
                match self.route_data(router_id, &target, payload, ctx).await {
                    Ok(value) => json!({
                        "target": target,
                        "status": "fulfilled",
                        "value": value,
                    }),
                    Err(error) => json!({
                        "target": target,
                        "status": "rejected",
                        "error": error.to_string(),
                    }),
                }
            }
        });
        let results = join_all(attempts).await;

        Ok(merge_fields(
            payload,
            [
                ("routed".to_string(), json!(true)),
                ("strategy".to_string(), json!("parallel")),
                ("results".to_string(), Value::Array(results)),
            ],
        ))
    }

    /// Select uniformly at random among outputs whose target is not in
    /// `error` state. The random source is seedable via
    /// [`Engine::with_rng_seed`] for reproducible routing under test.
    async fn route_load_balanced(
        &self,
        router_id: &str,
        payload: Value,
        outputs: Vec<RouterOutput>,
        ctx: &ExecContext,
    ) -> Result<Value, EngineError> {
        let healthy: Vec<&RouterOutput> = outputs
            .iter()
            .filter(|output| output.target_state != NodeState::Error)
            .collect();
        if healthy.is_empty() {
            return Err(EngineError::NoHealthyTarget {
                router_id: router_id.to_string(),
            });
        }

        let target = {
            let mut rng = self.rng.lock();
            healthy[rng.random_range(0..healthy.len())].target.clone()
        };
        self.route_data(router_id, &target, payload.clone(), ctx.clone())
            .await?;
        Ok(merge_fields(
            payload,
            [
                ("routed".to_string(), json!(true)),
                ("target".to_string(), json!(target)),
                ("strategy".to_string(), json!("load-balance")),
            ],
        ))
    }
}
