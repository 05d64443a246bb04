//! Coordinator: work assignment and collision arbitration.
//!
//! A stateless facade over the registry. Selection and claim happen in
//! one registry critical section, so concurrent `assign_work` calls for
//! the same work id resolve to exactly one winner.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::errors::SwarmResult;
use crate::domain::models::claim::{WorkClaim, WorkRequirement};
use crate::services::agent_registry::{AgentRegistry, CollisionPair, RegionBalance};

/// Suggested reassignment for one colliding pair: move work off the
/// busier agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentSuggestion {
    /// The busier agent of the pair.
    pub agent_id: String,
    /// Work currently claimed by that agent.
    pub work_ids: Vec<String>,
    pub distance: f64,
}

/// Collision listing plus reassignment suggestions for a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollisionResolution {
    pub collisions: Vec<CollisionPair>,
    pub suggestions: Vec<ReassignmentSuggestion>,
}

/// Stateless facade binding assignment policy to the registry.
#[derive(Clone)]
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
}

impl Coordinator {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Assign work to the best agent: required capability first, then
    /// region hint, then the global least-loaded idle agent.
    pub async fn assign_work(
        &self,
        work_id: &str,
        requirement: WorkRequirement,
    ) -> SwarmResult<WorkClaim> {
        self.registry.assign_work(work_id, requirement).await
    }

    /// List a region's collisions and suggest moving work off the busier
    /// agent of each pair.
    pub async fn check_and_resolve_collisions(
        &self,
        region_id: &str,
        threshold: f64,
    ) -> CollisionResolution {
        let collisions = self.registry.find_collisions(region_id, threshold).await;
        let mut suggestions = Vec::with_capacity(collisions.len());

        for pair in &collisions {
            let load_a = self.registry.claim_count(&pair.agent_a).await;
            let load_b = self.registry.claim_count(&pair.agent_b).await;
            // Busier agent yields; ties go to the second of the sorted pair.
            let busier = if load_a > load_b {
                &pair.agent_a
            } else {
                &pair.agent_b
            };
            let work_ids = self
                .registry
                .claims_for(busier)
                .await
                .into_iter()
                .map(|c| c.work_id)
                .collect();
            info!(
                region = region_id,
                agent_a = %pair.agent_a,
                agent_b = %pair.agent_b,
                busier = %busier,
                distance = pair.distance,
                "collision detected"
            );
            suggestions.push(ReassignmentSuggestion {
                agent_id: busier.clone(),
                work_ids,
                distance: pair.distance,
            });
        }

        CollisionResolution {
            collisions,
            suggestions,
        }
    }

    pub async fn region_balance(&self, region_id: &str) -> RegionBalance {
        self.registry.region_balance(region_id).await
    }

    pub async fn suggest_next_agent(&self, region_id: &str) -> Option<String> {
        self.registry.suggest_next_agent(region_id).await
    }
}
