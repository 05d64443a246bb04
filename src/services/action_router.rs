//! Action router: validated dispatch of atomic actions to the driver.
//!
//! Every action passes the schema gate, the danger/approval gate and the
//! per-agent in-flight gate before its handler runs. Dispatch is bounded
//! by a deadline; expiry issues a pathfinding stop and reports a
//! structured failure. Gate rejections are errors; execution failures are
//! unsuccessful outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::{Action, ActionType};
use crate::domain::models::agent::{BlockPos, Position};
use crate::domain::models::config::{RouterConfig, WorldBounds};
use crate::domain::ports::client_driver::{ClientDriver, Face, Hand};
use crate::services::action_schema;

/// Handler group an action type routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerGroup {
    Movement,
    Interaction,
    Basic,
    Inventory,
}

/// Static routing entry for one action type.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub group: HandlerGroup,
    pub dangerous: bool,
    pub requires_location: bool,
    pub requires_agent: bool,
}

/// The routing table. Closed, like the action catalog.
pub fn route_for(action_type: ActionType) -> Route {
    use HandlerGroup::{Basic, Interaction, Inventory, Movement};
    let (group, dangerous, requires_location) = match action_type {
        ActionType::MoveTo | ActionType::Navigate => (Movement, false, true),
        ActionType::Follow => (Movement, false, false),
        ActionType::LookAt => (Movement, false, true),
        ActionType::MineBlock | ActionType::PlaceBlock => (Interaction, true, true),
        ActionType::Interact => (Interaction, false, true),
        ActionType::UseItem => (Interaction, false, false),
        ActionType::Chat => (Basic, false, false),
        ActionType::GetInventory | ActionType::EquipItem | ActionType::DropItem => {
            (Inventory, false, false)
        }
    };
    Route {
        group,
        dangerous,
        requires_location,
        requires_agent: true,
    }
}

/// Result of dispatching one action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub agent_id: String,
    pub action_type: ActionType,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Handler payload, e.g. the inventory listing.
    pub data: Option<Value>,
}

/// Router counters.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    dangerous_logged: AtomicU64,
}

/// Point-in-time copy of the router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub dangerous_logged: u64,
}

impl RouterMetrics {
    fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dangerous_logged: self.dangerous_logged.load(Ordering::Relaxed),
        }
    }
}

/// Routes validated actions to driver primitives.
pub struct ActionRouter {
    driver: Arc<dyn ClientDriver>,
    config: RouterConfig,
    bounds: WorldBounds,
    metrics: RouterMetrics,
    active: RwLock<HashMap<String, Arc<AtomicU32>>>,
}

impl ActionRouter {
    pub fn new(driver: Arc<dyn ClientDriver>, config: RouterConfig, bounds: WorldBounds) -> Self {
        Self {
            driver,
            config,
            bounds,
            metrics: RouterMetrics::default(),
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn metrics(&self) -> RouterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// In-flight dispatch count for an agent.
    pub async fn active_count(&self, agent_id: &str) -> u32 {
        let active = self.active.read().await;
        active.get(agent_id).map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Validate, gate and dispatch one action.
    ///
    /// Returns `Err` for gate rejections (schema, danger, concurrency)
    /// and `Ok` with `success = false` for driver/timeout failures.
    pub async fn route_task(&self, action: &Action) -> SwarmResult<ActionOutcome> {
        self.metrics.total.fetch_add(1, Ordering::Relaxed);

        // (i) schema + coordinate bounds
        let mut report = action_schema::validate_action(action);
        report.merge(action_schema::validate_action_coordinates(&self.bounds, action));
        if !report.valid {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SwarmError::Validation(report.errors.join("; ")));
        }

        // (ii) route lookup
        let route = route_for(action.action_type);

        // (iii) danger gate
        if route.dangerous {
            if let Some(block_type) = action.block_type() {
                if !action_schema::safe_block_type(block_type) {
                    if self.config.require_approval_for_dangerous && !action.approved {
                        self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(SwarmError::Policy(format!(
                            "dangerous block '{block_type}' requires approval"
                        )));
                    }
                    self.metrics.dangerous_logged.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        action_id = %action.id,
                        agent_id = %action.agent_id,
                        block_type,
                        "executing dangerous action"
                    );
                }
            }
        }

        // (iv) per-agent in-flight gate
        let counter = {
            let mut active = self.active.write().await;
            Arc::clone(
                active
                    .entry(action.agent_id.clone())
                    .or_insert_with(|| Arc::new(AtomicU32::new(0))),
            )
        };
        if counter.load(Ordering::SeqCst) >= self.config.max_active_per_agent {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SwarmError::Policy(format!(
                "agent '{}' has too many actions in flight",
                action.agent_id
            )));
        }
        counter.fetch_add(1, Ordering::SeqCst);

        // (v) dispatch under deadline
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.task_timeout_ms);
        let dispatched = tokio::time::timeout(deadline, self.dispatch(action)).await;
        counter.fetch_sub(1, Ordering::SeqCst);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // (vi) record the result
        let outcome = match dispatched {
            Ok(Ok(data)) => {
                self.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                ActionOutcome {
                    action_id: action.id,
                    agent_id: action.agent_id.clone(),
                    action_type: action.action_type,
                    success: true,
                    error: None,
                    duration_ms,
                    data,
                }
            }
            Ok(Err(err)) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                ActionOutcome {
                    action_id: action.id,
                    agent_id: action.agent_id.clone(),
                    action_type: action.action_type,
                    success: false,
                    error: Some(err.to_string()),
                    duration_ms,
                    data: None,
                }
            }
            Err(_) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = self.driver.stop_all(&action.agent_id).await {
                    warn!(agent_id = %action.agent_id, error = %err, "stop after timeout failed");
                }
                let timeout_err = SwarmError::Timeout {
                    operation: action.action_type.as_str().to_string(),
                    timeout_ms: self.config.task_timeout_ms,
                };
                ActionOutcome {
                    action_id: action.id,
                    agent_id: action.agent_id.clone(),
                    action_type: action.action_type,
                    success: false,
                    error: Some(timeout_err.to_string()),
                    duration_ms,
                    data: None,
                }
            }
        };

        debug!(
            action_id = %outcome.action_id,
            agent_id = %outcome.agent_id,
            action = outcome.action_type.as_str(),
            success = outcome.success,
            duration_ms = outcome.duration_ms,
            error = outcome.error.as_deref().unwrap_or(""),
            "action routed"
        );
        Ok(outcome)
    }

    /// Call the driver primitive for one (already gated) action.
    async fn dispatch(&self, action: &Action) -> SwarmResult<Option<Value>> {
        let agent_id = &action.agent_id;
        let params = &action.params;
        match action.action_type {
            ActionType::MoveTo => {
                let target = position_param(params, "target")?;
                self.driver.move_to(agent_id, target).await?;
            }
            ActionType::Navigate => {
                let waypoints = waypoints_param(params)?;
                self.driver.navigate_waypoints(agent_id, &waypoints).await?;
            }
            ActionType::Follow => {
                let entity = str_param(params, "/target/entity")?;
                self.driver.follow_entity(agent_id, entity).await?;
            }
            ActionType::MineBlock => {
                let target = position_param(params, "target")?;
                self.driver.dig(agent_id, BlockPos::from(target)).await?;
            }
            ActionType::PlaceBlock => {
                let target = position_param(params, "target")?;
                let face = params
                    .get("face")
                    .and_then(Value::as_str)
                    .and_then(Face::parse_str)
                    .unwrap_or(Face::Top);
                self.driver
                    .place_block(agent_id, BlockPos::from(target), face)
                    .await?;
            }
            ActionType::Interact => {
                let target = position_param(params, "target")?;
                self.driver
                    .activate_block(agent_id, BlockPos::from(target))
                    .await?;
            }
            ActionType::UseItem => {
                let item = str_param(params, "/itemName")?;
                self.driver.equip(agent_id, item, None).await?;
                let hand = params
                    .get("hand")
                    .and_then(Value::as_str)
                    .and_then(Hand::parse_str)
                    .unwrap_or(Hand::Right);
                self.driver.activate_item(agent_id, hand).await?;
            }
            ActionType::LookAt => {
                let target = position_param(params, "target")?;
                let state = self.driver.self_state(agent_id).await?;
                let (yaw, pitch) = look_angles(state.position, target);
                self.driver.look(agent_id, yaw, pitch).await?;
            }
            ActionType::Chat => {
                let message = str_param(params, "/message")?;
                self.driver.chat(agent_id, message).await?;
            }
            ActionType::GetInventory => {
                let inventory = self.driver.get_inventory(agent_id).await?;
                return Ok(Some(serde_json::to_value(inventory)?));
            }
            ActionType::EquipItem => {
                let item = str_param(params, "/itemName")?;
                let slot = params
                    .get("slot")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok());
                self.driver.equip(agent_id, item, slot).await?;
            }
            ActionType::DropItem => {
                let slot = params
                    .get("slot")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| SwarmError::Validation("slot out of range".to_string()))?;
                let count = params
                    .get("count")
                    .and_then(Value::as_u64)
                    .and_then(|c| u32::try_from(c).ok());
                self.driver.drop_item(agent_id, slot, count).await?;
            }
        }
        Ok(None)
    }
}

fn position_param(params: &Value, key: &str) -> SwarmResult<Position> {
    let target = params
        .get(key)
        .ok_or_else(|| SwarmError::Validation(format!("missing '{key}'")))?;
    let get = |axis: &str| -> SwarmResult<f64> {
        target
            .get(axis)
            .and_then(Value::as_f64)
            .ok_or_else(|| SwarmError::Validation(format!("'{key}.{axis}' is not a number")))
    };
    Ok(Position::new(get("x")?, get("y")?, get("z")?))
}

fn waypoints_param(params: &Value) -> SwarmResult<Vec<Position>> {
    let raw = params
        .get("waypoints")
        .and_then(Value::as_array)
        .ok_or_else(|| SwarmError::Validation("missing 'waypoints'".to_string()))?;
    raw.iter()
        .map(|wp| {
            let get = |axis: &str| -> SwarmResult<f64> {
                wp.get(axis)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| SwarmError::Validation(format!("waypoint '{axis}' missing")))
            };
            Ok(Position::new(get("x")?, get("y")?, get("z")?))
        })
        .collect()
}

fn str_param<'a>(params: &'a Value, pointer: &str) -> SwarmResult<&'a str> {
    params
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| SwarmError::Validation(format!("missing '{pointer}'")))
}

/// Yaw/pitch (degrees) to face `target` from `from`.
fn look_angles(from: Position, target: Position) -> (f32, f32) {
    let dx = target.x - from.x;
    let dy = target.y - from.y;
    let dz = target.z - from.z;
    let horizontal = (dx * dx + dz * dz).sqrt();
    #[allow(clippy::cast_possible_truncation)]
    let yaw = (-dx).atan2(dz).to_degrees() as f32;
    #[allow(clippy::cast_possible_truncation)]
    let pitch = (-dy).atan2(horizontal).to_degrees() as f32;
    (yaw, pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::drivers::SimDriver;
    use serde_json::json;

    fn router(driver: Arc<SimDriver>) -> ActionRouter {
        ActionRouter::new(driver, RouterConfig::default(), WorldBounds::default())
    }

    #[tokio::test]
    async fn test_routing_table_flags() {
        assert_eq!(route_for(ActionType::MoveTo).group, HandlerGroup::Movement);
        assert!(route_for(ActionType::MineBlock).dangerous);
        assert!(route_for(ActionType::PlaceBlock).dangerous);
        assert!(!route_for(ActionType::Chat).dangerous);
        assert!(route_for(ActionType::MoveTo).requires_location);
        assert!(!route_for(ActionType::Chat).requires_location);
        assert_eq!(route_for(ActionType::DropItem).group, HandlerGroup::Inventory);
    }

    #[tokio::test]
    async fn test_invalid_action_rejected() {
        let driver = Arc::new(SimDriver::new());
        let router = router(driver);
        let action = Action::new(ActionType::MoveTo, "a", json!({}));
        let err = router.route_task(&action).await.unwrap_err();
        assert!(matches!(err, SwarmError::Validation(_)));
        assert_eq!(router.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn test_out_of_bounds_rejected() {
        let driver = Arc::new(SimDriver::new());
        let router = router(driver);
        let action = Action::new(
            ActionType::MoveTo,
            "a",
            json!({"target": {"x": 0.0, "y": 400.0, "z": 0.0}}),
        );
        assert!(router.route_task(&action).await.is_err());
    }

    #[tokio::test]
    async fn test_dangerous_unapproved_rejected() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a").await;
        let router = router(driver);
        let action = Action::new(
            ActionType::PlaceBlock,
            "a",
            json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "tnt"}),
        );
        let err = router.route_task(&action).await.unwrap_err();
        assert!(matches!(err, SwarmError::Policy(_)));

        // Approved version executes and is logged.
        let outcome = router.route_task(&action.clone().approved()).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(router.metrics().dangerous_logged, 1);
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a").await;
        let router = router(Arc::clone(&driver));
        let action = Action::new(ActionType::Chat, "a", json!({"message": "hello"}));
        let outcome = router.route_task(&action).await.unwrap();
        assert!(outcome.success);
        assert_eq!(driver.chat_log("a").await, vec!["hello".to_string()]);
        assert_eq!(router.metrics().succeeded, 1);
    }

    #[tokio::test]
    async fn test_driver_failure_is_outcome_not_error() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a").await;
        driver.fail_next("chat", "connection lost").await;
        let router = router(driver);
        let action = Action::new(ActionType::Chat, "a", json!({"message": "hello"}));
        let outcome = router.route_task(&action).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("connection lost"));
        assert_eq!(router.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_structured_failure() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a").await;
        driver.set_latency(Duration::from_millis(200)).await;
        let router = ActionRouter::new(
            driver,
            RouterConfig {
                task_timeout_ms: 20,
                ..RouterConfig::default()
            },
            WorldBounds::default(),
        );
        let action = Action::new(ActionType::Chat, "a", json!({"message": "hello"}));
        let outcome = router.route_task(&action).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_get_inventory_returns_data() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a").await;
        driver
            .give_item("a", crate::domain::models::InventoryItem::new(0, "torch", 12))
            .await;
        let router = router(driver);
        let action = Action::new(ActionType::GetInventory, "a", json!({}));
        let outcome = router.route_task(&action).await.unwrap();
        assert!(outcome.success);
        let items = outcome.data.unwrap();
        assert_eq!(items[0]["name"], "torch");
    }
}
