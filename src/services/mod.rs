//! Services: the control-plane components.

pub mod action_router;
pub mod action_schema;
pub mod admission;
pub mod agent_registry;
pub mod autonomy_loop;
pub mod coordinator;
pub mod experience_buffer;
pub mod goal_planner;
pub mod orchestrator;
pub mod policy_engine;
pub mod world_observer;

pub use action_router::{ActionOutcome, ActionRouter, RouterMetricsSnapshot};
pub use admission::{AdmissionHost, AdmissionOutcome};
pub use agent_registry::{AgentRegistry, CollisionPair, RegionBalance, RegistryStats};
pub use autonomy_loop::{AutonomyLoop, HistoryEntry, LoopDeps, LoopState};
pub use coordinator::{CollisionResolution, Coordinator, ReassignmentSuggestion};
pub use experience_buffer::{BatchQuery, ExperienceBuffer, ExperienceSummary};
pub use goal_planner::{GoalPlanner, PlanEvaluation, PlanOutcome, GOAL_TEMPLATES};
pub use orchestrator::{CoordinationReport, Orchestrator, SwarmStatus};
pub use policy_engine::{PolicyContext, PolicyEngine, PolicyReport, RateLimitStatus};
pub use world_observer::{SafetyReport, WorldObserver};
