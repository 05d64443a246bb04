//! Domain models for the hivemind control plane.

pub mod action;
pub mod agent;
pub mod approval;
pub mod claim;
pub mod config;
pub mod experience;
pub mod goal;
pub mod plan;
pub mod world;

pub use action::{Action, ActionType, Role};
pub use agent::{Agent, AgentMetrics, AgentRole, AgentStatus, BlockPos, InventoryItem, Position};
pub use approval::{ApprovalStatus, ApprovalTicket};
pub use claim::{WorkClaim, WorkRequirement};
pub use config::{
    AutonomyConfig, ExperienceConfig, LoggingConfig, ObserverConfig, PlannerConfig, PolicyConfig,
    RouterConfig, SwarmConfig, WorldBounds, DEFAULT_DANGEROUS_BLOCKS,
};
pub use experience::{Experience, ExperienceDraft};
pub use goal::{Goal, GoalPriority};
pub use plan::Plan;
pub use world::{BiomeInfo, Block, Entity, EntityKind, SelfState, SnapshotSummary, WorldSnapshot};
