//! Agent registry: agents, regions and work claims.
//!
//! The registry exclusively owns this state. All writes serialize through
//! one lock, which is what makes `claim_work` linearizable and lets
//! `assign_work` pick and claim in a single critical section. The lock is
//! never held across driver calls.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::agent::{Agent, AgentStatus, Position};
use crate::domain::models::claim::{WorkClaim, WorkRequirement};

/// Unordered pair of agents closer than a collision threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPair {
    pub agent_a: String,
    pub agent_b: String,
    pub distance: f64,
}

/// Claim-count distribution across a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionBalance {
    /// Claim count per member, sorted by agent id.
    pub per_agent: Vec<(String, usize)>,
    pub mean: f64,
    /// Standard deviation of claim counts; the imbalance proxy.
    pub std_dev: f64,
}

/// Headline registry counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub by_status: HashMap<String, usize>,
    pub active_claims: usize,
    pub regions: usize,
}

#[derive(Default)]
struct RegistryState {
    agents: HashMap<String, Agent>,
    regions: HashMap<String, BTreeSet<String>>,
    claims: HashMap<String, WorkClaim>,
}

impl RegistryState {
    fn claim_count(&self, agent_id: &str) -> usize {
        self.claims.values().filter(|c| c.agent_id == agent_id).count()
    }

    /// Fewest claims wins; equal loads break ties lexicographically.
    fn least_loaded<'a, I: Iterator<Item = &'a str>>(&self, ids: I) -> Option<String> {
        ids.map(|id| (self.claim_count(id), id))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, id)| id.to_string())
    }
}

/// In-memory registry of agents, regions and work claims.
pub struct AgentRegistry {
    state: RwLock<RegistryState>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a new agent. Duplicate ids are rejected.
    pub async fn register(&self, agent: Agent) -> SwarmResult<()> {
        let mut state = self.state.write().await;
        if state.agents.contains_key(&agent.id) {
            return Err(SwarmError::DuplicateAgent(agent.id));
        }
        info!(agent_id = %agent.id, role = agent.role.as_str(), "agent registered");
        state.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Remove an agent, releasing all its claims and region memberships
    /// in one critical section.
    pub async fn unregister(&self, agent_id: &str) -> SwarmResult<Agent> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .remove(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.to_string()))?;
        state.claims.retain(|_, claim| claim.agent_id != agent_id);
        for members in state.regions.values_mut() {
            members.remove(agent_id);
        }
        state.regions.retain(|_, members| !members.is_empty());
        info!(agent_id, "agent unregistered");
        Ok(agent)
    }

    pub async fn update_position(&self, agent_id: &str, position: Position) -> SwarmResult<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.to_string()))?;
        agent.set_position(position);
        Ok(())
    }

    pub async fn update_status(&self, agent_id: &str, status: AgentStatus) -> SwarmResult<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.to_string()))?;
        debug!(agent_id, from = agent.status.as_str(), to = status.as_str(), "status change");
        agent.set_status(status);
        Ok(())
    }

    /// Update health/food from a driver health event.
    pub async fn update_vitals(&self, agent_id: &str, health: i32, food: i32) -> SwarmResult<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.to_string()))?;
        agent.health = health;
        agent.food = food;
        agent.last_update = chrono::Utc::now();
        Ok(())
    }

    /// Bump one of the agent's metric counters.
    pub async fn record_action_outcome(&self, agent_id: &str, success: bool) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            if success {
                agent.metrics.actions_executed += 1;
            } else {
                agent.metrics.actions_failed += 1;
            }
        }
    }

    pub async fn record_goal_completed(&self, agent_id: &str) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.metrics.goals_completed += 1;
        }
    }

    pub async fn agent(&self, agent_id: &str) -> Option<Agent> {
        let state = self.state.read().await;
        state.agents.get(agent_id).cloned()
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        let state = self.state.read().await;
        let mut agents: Vec<_> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Linear scan for agents carrying a capability tag.
    pub async fn find_by_capability(&self, capability: &str) -> Vec<Agent> {
        let state = self.state.read().await;
        let mut agents: Vec<_> = state
            .agents
            .values()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Nearest agent to `position` passing `filter`, by Euclidean
    /// distance over a full scan.
    pub async fn find_nearest<F>(&self, position: Position, filter: F) -> Option<Agent>
    where
        F: Fn(&Agent) -> bool,
    {
        let state = self.state.read().await;
        state
            .agents
            .values()
            .filter(|a| filter(a))
            .min_by(|a, b| {
                a.position
                    .distance_to(&position)
                    .total_cmp(&b.position.distance_to(&position))
            })
            .cloned()
    }

    // ---- work claims ----

    /// Atomic check-and-set claim of one work id.
    pub async fn claim_work(
        &self,
        work_id: &str,
        agent_id: &str,
        details: HashMap<String, serde_json::Value>,
    ) -> SwarmResult<WorkClaim> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(agent_id) {
            return Err(SwarmError::AgentNotFound(agent_id.to_string()));
        }
        if let Some(existing) = state.claims.get(work_id) {
            return Err(SwarmError::Contention {
                work_id: work_id.to_string(),
                claimed_by: existing.agent_id.clone(),
            });
        }
        let claim = WorkClaim::new(work_id, agent_id).with_details(details);
        state.claims.insert(work_id.to_string(), claim.clone());
        debug!(work_id, agent_id, "work claimed");
        Ok(claim)
    }

    /// Release a claim. Idempotent; releasing absent work succeeds.
    pub async fn release_work(&self, work_id: &str) -> bool {
        let mut state = self.state.write().await;
        let released = state.claims.remove(work_id).is_some();
        if released {
            debug!(work_id, "work released");
        }
        released
    }

    pub async fn claim(&self, work_id: &str) -> Option<WorkClaim> {
        let state = self.state.read().await;
        state.claims.get(work_id).cloned()
    }

    pub async fn claims_for(&self, agent_id: &str) -> Vec<WorkClaim> {
        let state = self.state.read().await;
        state
            .claims
            .values()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub async fn claim_count(&self, agent_id: &str) -> usize {
        let state = self.state.read().await;
        state.claim_count(agent_id)
    }

    /// Select an agent and claim the work in one critical section.
    ///
    /// Selection order: required capability → least-loaded capable agent;
    /// else region hint → fewest-claims member; else global least-loaded
    /// Idle agent. Equal loads break ties lexicographically.
    pub async fn assign_work(
        &self,
        work_id: &str,
        requirement: WorkRequirement,
    ) -> SwarmResult<WorkClaim> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.claims.get(work_id) {
            return Err(SwarmError::Contention {
                work_id: work_id.to_string(),
                claimed_by: existing.agent_id.clone(),
            });
        }

        let chosen = if let Some(ref capability) = requirement.capability {
            state.least_loaded(
                state
                    .agents
                    .values()
                    .filter(|a| a.has_capability(capability))
                    .map(|a| a.id.as_str()),
            )
        } else if let Some(ref region) = requirement.region {
            state.regions.get(region).and_then(|members| {
                state.least_loaded(members.iter().map(String::as_str))
            })
        } else {
            state.least_loaded(
                state
                    .agents
                    .values()
                    .filter(|a| a.status.is_available())
                    .map(|a| a.id.as_str()),
            )
        };

        let Some(agent_id) = chosen else {
            return Err(SwarmError::NoAvailableAgents(work_id.to_string()));
        };

        let claim = WorkClaim::new(work_id, &agent_id).with_details(requirement.details);
        state.claims.insert(work_id.to_string(), claim.clone());
        info!(work_id, agent_id = %agent_id, "work assigned");
        Ok(claim)
    }

    // ---- regions ----

    /// Add an agent to a region, creating the region if absent.
    /// Membership is a set; repeats are no-ops.
    pub async fn assign_to_region(&self, region_id: &str, agent_id: &str) -> SwarmResult<()> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(agent_id) {
            return Err(SwarmError::AgentNotFound(agent_id.to_string()));
        }
        state
            .regions
            .entry(region_id.to_string())
            .or_default()
            .insert(agent_id.to_string());
        Ok(())
    }

    pub async fn remove_from_region(&self, region_id: &str, agent_id: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.regions.get_mut(region_id) {
            members.remove(agent_id);
            if members.is_empty() {
                state.regions.remove(region_id);
            }
        }
    }

    /// Region members, sorted by id.
    pub async fn region_members(&self, region_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .regions
            .get(region_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn regions_of(&self, agent_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut regions: Vec<_> = state
            .regions
            .iter()
            .filter(|(_, members)| members.contains(agent_id))
            .map(|(id, _)| id.clone())
            .collect();
        regions.sort();
        regions
    }

    // ---- collisions & balance ----

    /// Whether two agents are within `threshold` blocks of each other.
    pub async fn check_collision(&self, a: &str, b: &str, threshold: f64) -> SwarmResult<bool> {
        let state = self.state.read().await;
        let agent_a = state
            .agents
            .get(a)
            .ok_or_else(|| SwarmError::AgentNotFound(a.to_string()))?;
        let agent_b = state
            .agents
            .get(b)
            .ok_or_else(|| SwarmError::AgentNotFound(b.to_string()))?;
        Ok(agent_a.position.distance_to(&agent_b.position) < threshold)
    }

    /// All unordered member pairs of a region closer than `threshold`.
    pub async fn find_collisions(&self, region_id: &str, threshold: f64) -> Vec<CollisionPair> {
        let state = self.state.read().await;
        let Some(members) = state.regions.get(region_id) else {
            return Vec::new();
        };
        let ids: Vec<&String> = members.iter().collect();
        let mut collisions = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let (Some(agent_a), Some(agent_b)) =
                    (state.agents.get(*a), state.agents.get(*b))
                else {
                    continue;
                };
                let distance = agent_a.position.distance_to(&agent_b.position);
                if distance < threshold {
                    collisions.push(CollisionPair {
                        agent_a: (*a).clone(),
                        agent_b: (*b).clone(),
                        distance,
                    });
                }
            }
        }
        collisions
    }

    /// Claim-count distribution across a region's members.
    pub async fn region_balance(&self, region_id: &str) -> RegionBalance {
        let state = self.state.read().await;
        let Some(members) = state.regions.get(region_id) else {
            return RegionBalance::default();
        };
        let per_agent: Vec<(String, usize)> = members
            .iter()
            .map(|id| (id.clone(), state.claim_count(id)))
            .collect();
        if per_agent.is_empty() {
            return RegionBalance::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = per_agent.iter().map(|(_, n)| *n as f64).sum::<f64>() / per_agent.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let variance = per_agent
            .iter()
            .map(|(_, n)| {
                let diff = *n as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / per_agent.len() as f64;
        RegionBalance {
            per_agent,
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Region member with the fewest claims.
    pub async fn suggest_next_agent(&self, region_id: &str) -> Option<String> {
        let state = self.state.read().await;
        let members = state.regions.get(region_id)?;
        state.least_loaded(members.iter().map(String::as_str))
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for agent in state.agents.values() {
            *by_status.entry(agent.status.as_str().to_string()).or_default() += 1;
        }
        RegistryStats {
            total_agents: state.agents.len(),
            by_status,
            active_claims: state.claims.len(),
            regions: state.regions.len(),
        }
    }

    /// Drop everything. Used by emergency reset.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.agents.clear();
        state.regions.clear();
        state.claims.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::agent::AgentRole;

    fn agent(id: &str) -> Agent {
        Agent::new(id, AgentRole::Generalist, "ops")
    }

    #[tokio::test]
    async fn test_duplicate_register_rejected() {
        let registry = AgentRegistry::new();
        registry.register(agent("a")).await.unwrap();
        let err = registry.register(agent("a")).await.unwrap_err();
        assert!(matches!(err, SwarmError::DuplicateAgent(_)));
    }

    #[tokio::test]
    async fn test_single_claim_invariant() {
        let registry = AgentRegistry::new();
        registry.register(agent("a")).await.unwrap();
        registry.register(agent("b")).await.unwrap();

        registry.claim_work("w1", "a", HashMap::new()).await.unwrap();
        let err = registry.claim_work("w1", "b", HashMap::new()).await.unwrap_err();
        match err {
            SwarmError::Contention { claimed_by, .. } => assert_eq!(claimed_by, "a"),
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unregister_releases_everything() {
        let registry = AgentRegistry::new();
        registry.register(agent("a")).await.unwrap();
        registry.claim_work("w1", "a", HashMap::new()).await.unwrap();
        registry.assign_to_region("north", "a").await.unwrap();

        registry.unregister("a").await.unwrap();
        assert!(registry.claim("w1").await.is_none());
        assert!(registry.region_members("north").await.is_empty());

        // Register/unregister/register leaves no residue.
        registry.register(agent("a")).await.unwrap();
        assert_eq!(registry.claim_count("a").await, 0);
        assert!(registry.regions_of("a").await.is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let registry = AgentRegistry::new();
        registry.register(agent("a")).await.unwrap();
        registry.claim_work("w1", "a", HashMap::new()).await.unwrap();
        assert!(registry.release_work("w1").await);
        assert!(!registry.release_work("w1").await);
    }

    #[tokio::test]
    async fn test_claim_requires_registered_agent() {
        let registry = AgentRegistry::new();
        let err = registry.claim_work("w1", "ghost", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_nearest_and_capability() {
        let registry = AgentRegistry::new();
        registry
            .register(agent("near").with_position(Position::new(1.0, 64.0, 0.0)))
            .await
            .unwrap();
        registry
            .register(agent("far").with_position(Position::new(100.0, 64.0, 0.0)))
            .await
            .unwrap();
        registry
            .register(Agent::new("digger", AgentRole::Miner, "ops"))
            .await
            .unwrap();

        let nearest = registry
            .find_nearest(Position::new(0.0, 64.0, 0.0), |_| true)
            .await
            .unwrap();
        assert_eq!(nearest.id, "near");

        let miners = registry.find_by_capability("mining").await;
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].id, "digger");
    }

    #[tokio::test]
    async fn test_region_membership_dedup() {
        let registry = AgentRegistry::new();
        registry.register(agent("a")).await.unwrap();
        registry.assign_to_region("r", "a").await.unwrap();
        registry.assign_to_region("r", "a").await.unwrap();
        assert_eq!(registry.region_members("r").await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_collisions_in_region() {
        let registry = AgentRegistry::new();
        registry
            .register(agent("x").with_position(Position::new(0.0, 64.0, 0.0)))
            .await
            .unwrap();
        registry
            .register(agent("y").with_position(Position::new(3.0, 64.0, 0.0)))
            .await
            .unwrap();
        registry
            .register(agent("z").with_position(Position::new(50.0, 64.0, 0.0)))
            .await
            .unwrap();
        for id in ["x", "y", "z"] {
            registry.assign_to_region("r", id).await.unwrap();
        }

        let collisions = registry.find_collisions("r", 5.0).await;
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].agent_a, "x");
        assert_eq!(collisions[0].agent_b, "y");
        assert!((collisions[0].distance - 3.0).abs() < f64::EPSILON);

        assert!(registry.check_collision("x", "y", 5.0).await.unwrap());
        assert!(!registry.check_collision("x", "z", 5.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_balance_and_suggestion() {
        let registry = AgentRegistry::new();
        for id in ["a", "b"] {
            registry.register(agent(id)).await.unwrap();
            registry.assign_to_region("r", id).await.unwrap();
        }
        registry.claim_work("w1", "a", HashMap::new()).await.unwrap();
        registry.claim_work("w2", "a", HashMap::new()).await.unwrap();

        let balance = registry.region_balance("r").await;
        assert!((balance.mean - 1.0).abs() < f64::EPSILON);
        assert!(balance.std_dev > 0.0);

        assert_eq!(registry.suggest_next_agent("r").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_suggest_ties_break_lexicographically() {
        let registry = AgentRegistry::new();
        for id in ["beta", "alpha"] {
            registry.register(agent(id)).await.unwrap();
            registry.assign_to_region("r", id).await.unwrap();
        }
        assert_eq!(registry.suggest_next_agent("r").await.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_assign_work_prefers_capability() {
        let registry = AgentRegistry::new();
        registry
            .register(Agent::new("miner-1", AgentRole::Miner, "ops"))
            .await
            .unwrap();
        let mut idle = agent("idle-1");
        idle.status = AgentStatus::Idle;
        registry.register(idle).await.unwrap();

        let claim = registry
            .assign_work("dig-1", WorkRequirement::capability("mining"))
            .await
            .unwrap();
        assert_eq!(claim.agent_id, "miner-1");
    }

    #[tokio::test]
    async fn test_assign_work_falls_back_to_idle() {
        let registry = AgentRegistry::new();
        let mut busy = agent("busy-1");
        busy.status = AgentStatus::Busy;
        registry.register(busy).await.unwrap();
        let mut idle = agent("idle-1");
        idle.status = AgentStatus::Idle;
        registry.register(idle).await.unwrap();

        let claim = registry
            .assign_work("w", WorkRequirement::default())
            .await
            .unwrap();
        assert_eq!(claim.agent_id, "idle-1");
    }

    #[tokio::test]
    async fn test_assign_work_no_agents() {
        let registry = AgentRegistry::new();
        let err = registry
            .assign_work("w", WorkRequirement::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::NoAvailableAgents(_)));
    }
}
