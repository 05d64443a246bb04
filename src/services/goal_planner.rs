//! Goal planner: a closed registry of named plan templates.
//!
//! A template turns (snapshot, goal context) into an ordered action list.
//! The planner validates every emitted action against the schema table,
//! truncates overlong plans at the tail, and caches plans per
//! (agent, goal) with a TTL so stale snapshots are never re-served.
//! Output is deterministic for identical snapshot + context.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::{Action, ActionType};
use crate::domain::models::config::PlannerConfig;
use crate::domain::models::goal::Goal;
use crate::domain::models::plan::Plan;
use crate::domain::models::world::{EntityKind, WorldSnapshot};
use crate::services::action_schema;

/// The closed set of goal template names.
pub const GOAL_TEMPLATES: [&str; 6] = [
    "mine_coal",
    "gather_wood",
    "explore_area",
    "find_mobs",
    "find_shelter",
    "idle",
];

/// A generated plan plus any planner warnings (e.g. truncation).
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub warnings: Vec<String>,
}

/// Feasibility assessment for a plan under current conditions.
#[derive(Debug, Clone, Default)]
pub struct PlanEvaluation {
    pub feasible: bool,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Clone)]
struct CachedPlan {
    outcome: PlanOutcome,
    cached_at: Instant,
}

/// Translates goals into schema-valid plans.
pub struct GoalPlanner {
    config: PlannerConfig,
    cache: RwLock<HashMap<(String, String), CachedPlan>>,
}

impl GoalPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_known_goal(name: &str) -> bool {
        GOAL_TEMPLATES.contains(&name)
    }

    /// Generate (or serve from cache) a plan for one goal.
    pub async fn generate(
        &self,
        agent_id: &str,
        goal: &Goal,
        snapshot: &WorldSnapshot,
    ) -> SwarmResult<PlanOutcome> {
        if !Self::is_known_goal(&goal.name) {
            return Err(SwarmError::UnknownGoal(goal.name.clone()));
        }

        let key = (agent_id.to_string(), goal.name.clone());
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.cached_at.elapsed() < ttl {
                    debug!(agent_id, goal = %goal.name, "plan served from cache");
                    return Ok(cached.outcome.clone());
                }
            }
        }

        let actions = expand_template(agent_id, goal, snapshot);
        let mut plan = Plan::new(&goal.name, agent_id, actions);
        let mut warnings = Vec::new();

        // Every emitted action must pass the schema; a failure here is a
        // template defect, not caller input.
        for action in &plan.actions {
            let report = action_schema::validate_action(action);
            if !report.valid {
                return Err(SwarmError::Validation(format!(
                    "template '{}' produced invalid {}: {}",
                    goal.name,
                    action.action_type,
                    report.errors.join("; ")
                )));
            }
        }

        let dropped = plan.truncate(self.config.max_plan_length);
        if dropped > 0 {
            let message = format!(
                "plan truncated to {} actions ({dropped} dropped)",
                self.config.max_plan_length
            );
            warn!(agent_id, goal = %goal.name, %message, "plan truncated");
            warnings.push(message);
        }

        let outcome = PlanOutcome { plan, warnings };
        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedPlan {
                outcome: outcome.clone(),
                cached_at: Instant::now(),
            },
        );
        debug!(agent_id, goal = %goal.name, actions = outcome.plan.len(), "plan generated");
        Ok(outcome)
    }

    /// Check whether a plan is sensible right now: health, inventory
    /// pressure and nearby hostiles.
    pub fn evaluate_plan(&self, plan: &Plan, snapshot: &WorldSnapshot) -> PlanEvaluation {
        let mut eval = PlanEvaluation {
            feasible: true,
            ..PlanEvaluation::default()
        };

        let state = &snapshot.self_state;
        let health_fraction = if state.max_health > 0 {
            f64::from(state.health) / f64::from(state.max_health)
        } else {
            1.0
        };
        if health_fraction < 0.25 {
            eval.feasible = false;
            eval.warnings
                .push(format!("health critical ({}/{})", state.health, state.max_health));
            eval.suggestions.push("queue find_shelter first".to_string());
        } else if health_fraction < 0.5 {
            eval.warnings
                .push(format!("health low ({}/{})", state.health, state.max_health));
        }

        if state.inventory_pressure() > 0.8 {
            eval.warnings.push("inventory nearly full".to_string());
            eval.suggestions.push("drop or deposit items".to_string());
        }

        let hostiles = snapshot.summary.nearby_hostiles;
        if hostiles > 0 {
            eval.warnings.push(format!("{hostiles} hostile(s) nearby"));
            if hostiles > 2 {
                eval.suggestions.push("consider find_shelter first".to_string());
            }
        }

        if plan.is_empty() {
            eval.warnings.push("plan is empty".to_string());
        }

        eval
    }

    /// Drop cached plans for one agent.
    pub async fn invalidate_agent(&self, agent_id: &str) {
        let mut cache = self.cache.write().await;
        cache.retain(|(cached_agent, _), _| cached_agent != agent_id);
    }

    /// Drop the entire plan cache.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

// ---- templates ----

fn expand_template(agent_id: &str, goal: &Goal, snapshot: &WorldSnapshot) -> Vec<Action> {
    match goal.name.as_str() {
        "mine_coal" => mine_block_plan(agent_id, goal, snapshot, "coal_ore"),
        "gather_wood" => gather_wood_plan(agent_id, goal, snapshot),
        "explore_area" => explore_plan(agent_id, goal, snapshot),
        "find_mobs" => find_mobs_plan(agent_id, goal, snapshot),
        "find_shelter" => find_shelter_plan(agent_id, snapshot),
        "idle" => idle_plan(agent_id, snapshot),
        // generate() rejects unknown names before dispatch.
        _ => Vec::new(),
    }
}

fn target_json(x: f64, y: f64, z: f64) -> serde_json::Value {
    json!({"x": x, "y": y, "z": z})
}

fn move_to(agent_id: &str, x: f64, y: f64, z: f64) -> Action {
    Action::new(ActionType::MoveTo, agent_id, json!({"target": target_json(x, y, z)}))
}

fn look_at(agent_id: &str, x: f64, y: f64, z: f64) -> Action {
    Action::new(ActionType::LookAt, agent_id, json!({"target": target_json(x, y, z)}))
}

/// Move to the nearest block of `block_name` and mine it, or search for
/// one with a spiral sweep when none is visible.
fn mine_block_plan(
    agent_id: &str,
    goal: &Goal,
    snapshot: &WorldSnapshot,
    block_name: &str,
) -> Vec<Action> {
    if let Some(block) = snapshot.nearest_block_named(block_name) {
        let (x, y, z) = (
            f64::from(block.position.x),
            f64::from(block.position.y),
            f64::from(block.position.z),
        );
        vec![
            move_to(agent_id, x, y, z),
            Action::new(
                ActionType::MineBlock,
                agent_id,
                json!({"target": target_json(x, y, z), "blockType": block_name}),
            ),
        ]
    } else {
        explore_plan(agent_id, goal, snapshot)
    }
}

fn gather_wood_plan(agent_id: &str, goal: &Goal, snapshot: &WorldSnapshot) -> Vec<Action> {
    if let Some(block) = snapshot.nearest_block_where(|b| b.name.ends_with("_log")) {
        let name = block.name.clone();
        let (x, y, z) = (
            f64::from(block.position.x),
            f64::from(block.position.y),
            f64::from(block.position.z),
        );
        vec![
            move_to(agent_id, x, y, z),
            Action::new(
                ActionType::MineBlock,
                agent_id,
                json!({"target": target_json(x, y, z), "blockType": name}),
            ),
        ]
    } else {
        explore_plan(agent_id, goal, snapshot)
    }
}

/// Square spiral of waypoints around the agent's position.
fn explore_plan(agent_id: &str, goal: &Goal, snapshot: &WorldSnapshot) -> Vec<Action> {
    let origin = snapshot.self_state.position;
    let radius = goal.context_f64("radius", 16.0).clamp(4.0, 128.0);
    let step = radius / 2.0;

    // Out, around, and back: eight legs of a square spiral.
    let offsets: [(f64, f64); 8] = [
        (step, 0.0),
        (step, step),
        (0.0, radius),
        (-step, step),
        (-radius, 0.0),
        (-step, -step),
        (0.0, -radius),
        (step, -step),
    ];
    let waypoints: Vec<serde_json::Value> = offsets
        .iter()
        .map(|(dx, dz)| target_json(origin.x + dx, origin.y, origin.z + dz))
        .collect();

    vec![Action::new(
        ActionType::Navigate,
        agent_id,
        json!({ "waypoints": waypoints }),
    )]
}

/// Face and follow the nearest mob; search when nothing is visible.
fn find_mobs_plan(agent_id: &str, goal: &Goal, snapshot: &WorldSnapshot) -> Vec<Action> {
    let mob = snapshot.nearest_entity_where(|e| {
        matches!(e.kind, EntityKind::Hostile | EntityKind::Passive)
    });
    match mob {
        Some(entity) => {
            let name: String = entity.name.chars().take(32).collect();
            vec![
                look_at(agent_id, entity.position.x, entity.position.y, entity.position.z),
                Action::new(ActionType::Follow, agent_id, json!({"target": {"entity": name}})),
            ]
        }
        None => explore_plan(agent_id, goal, snapshot),
    }
}

/// Move directly away from the nearest hostile; hold position otherwise.
fn find_shelter_plan(agent_id: &str, snapshot: &WorldSnapshot) -> Vec<Action> {
    let here = snapshot.self_state.position;
    let hostile = snapshot.nearest_entity_where(|e| e.kind == EntityKind::Hostile);
    match hostile {
        Some(threat) => {
            let dx = here.x - threat.position.x;
            let dz = here.z - threat.position.z;
            let len = (dx * dx + dz * dz).sqrt().max(0.001);
            let flee = 24.0;
            vec![move_to(
                agent_id,
                here.x + dx / len * flee,
                here.y,
                here.z + dz / len * flee,
            )]
        }
        None => idle_plan(agent_id, snapshot),
    }
}

fn idle_plan(agent_id: &str, snapshot: &WorldSnapshot) -> Vec<Action> {
    let here = snapshot.self_state.position;
    vec![look_at(agent_id, here.x + 1.0, here.y, here.z)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::agent::{BlockPos, Position};
    use crate::domain::models::world::{BiomeInfo, Block, Entity, SelfState};

    fn snapshot_with(blocks: Vec<Block>, entities: Vec<Entity>) -> WorldSnapshot {
        WorldSnapshot::new("a", SelfState::default(), entities, blocks, BiomeInfo::default())
    }

    fn coal_at(x: i32, y: i32, z: i32, distance: f64) -> Block {
        Block {
            name: "coal_ore".to_string(),
            position: BlockPos::new(x, y, z),
            distance,
            hardness: 3.0,
            material: "rock".to_string(),
            diggable: true,
        }
    }

    fn hostile(name: &str, x: f64, distance: f64) -> Entity {
        Entity {
            id: name.to_string(),
            name: name.to_string(),
            kind: EntityKind::Hostile,
            position: Position::new(x, 64.0, 0.0),
            distance,
            health: 20,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    #[tokio::test]
    async fn test_mine_coal_plan_shape() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let snapshot = snapshot_with(vec![coal_at(10, 64, 0, 10.0)], vec![]);
        let outcome = planner
            .generate("a", &Goal::new("mine_coal"), &snapshot)
            .await
            .unwrap();

        assert_eq!(outcome.plan.len(), 2);
        assert_eq!(outcome.plan.actions[0].action_type, ActionType::MoveTo);
        assert_eq!(outcome.plan.actions[1].action_type, ActionType::MineBlock);
        assert_eq!(outcome.plan.actions[1].block_type(), Some("coal_ore"));
        let target = &outcome.plan.actions[0].params["target"];
        assert_eq!(target["x"], 10.0);
        assert_eq!(target["y"], 64.0);
        assert_eq!(target["z"], 0.0);
    }

    #[tokio::test]
    async fn test_unknown_goal_rejected() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let snapshot = snapshot_with(vec![], vec![]);
        let err = planner
            .generate("a", &Goal::new("conquer_world"), &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::UnknownGoal(_)));
    }

    #[tokio::test]
    async fn test_every_template_emits_valid_plan() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let snapshot = snapshot_with(
            vec![coal_at(5, 64, 5, 7.0)],
            vec![hostile("zombie", 8.0, 8.0)],
        );
        for name in GOAL_TEMPLATES {
            let outcome = planner
                .generate("a", &Goal::new(name), &snapshot)
                .await
                .unwrap();
            assert!(outcome.plan.len() <= PlannerConfig::default().max_plan_length);
            for action in &outcome.plan.actions {
                let report = action_schema::validate_action(action);
                assert!(report.valid, "{name}: {:?}", report.errors);
            }
        }
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let snapshot = snapshot_with(vec![coal_at(5, 64, 5, 7.0)], vec![]);
        let goal = Goal::new("explore_area");

        let first = planner.generate("a", &goal, &snapshot).await.unwrap();
        planner.clear_cache().await;
        let second = planner.generate("a", &goal, &snapshot).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first.plan.actions[0].params).unwrap(),
            serde_json::to_string(&second.plan.actions[0].params).unwrap()
        );
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let planner = GoalPlanner::new(PlannerConfig {
            cache_ttl_secs: 0,
            ..PlannerConfig::default()
        });
        // TTL 0: every call regenerates against the latest snapshot.
        let near = snapshot_with(vec![coal_at(2, 64, 0, 2.0)], vec![]);
        let far = snapshot_with(vec![coal_at(9, 64, 0, 9.0)], vec![]);
        let goal = Goal::new("mine_coal");

        let first = planner.generate("a", &goal, &near).await.unwrap();
        let second = planner.generate("a", &goal, &far).await.unwrap();
        assert_eq!(first.plan.actions[0].params["target"]["x"], 2.0);
        assert_eq!(second.plan.actions[0].params["target"]["x"], 9.0);
    }

    #[tokio::test]
    async fn test_cache_serves_within_ttl() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let near = snapshot_with(vec![coal_at(2, 64, 0, 2.0)], vec![]);
        let far = snapshot_with(vec![coal_at(9, 64, 0, 9.0)], vec![]);
        let goal = Goal::new("mine_coal");

        planner.generate("a", &goal, &near).await.unwrap();
        let cached = planner.generate("a", &goal, &far).await.unwrap();
        assert_eq!(cached.plan.actions[0].params["target"]["x"], 2.0);
    }

    #[tokio::test]
    async fn test_evaluate_plan_flags_hazards() {
        let planner = GoalPlanner::new(PlannerConfig::default());
        let state = SelfState {
            health: 4,
            ..SelfState::default()
        };
        let snapshot = WorldSnapshot::new(
            "a",
            state,
            vec![hostile("zombie", 5.0, 5.0)],
            vec![],
            BiomeInfo::default(),
        );
        let plan = Plan::new("mine_coal", "a", vec![]);

        let eval = planner.evaluate_plan(&plan, &snapshot);
        assert!(!eval.feasible);
        assert!(eval.warnings.iter().any(|w| w.contains("health")));
        assert!(eval.warnings.iter().any(|w| w.contains("hostile")));
    }
}
