//! Hivemind - autonomous game-client swarm control plane
//!
//! Controls a fleet of autonomous game-client agents with:
//! - Per-agent Observe-Decide-Validate-Act loops
//! - Goal-to-plan translation from a closed template set
//! - Declarative action schemas with a pure validator
//! - Role/rate/concurrency/danger policy with an approval workflow
//! - Multi-agent registry, work claims and collision arbitration
//!
//! The game transport is a pluggable `ClientDriver` port; the crate
//! ships a deterministic simulator for tests and demos.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{SwarmError, SwarmResult};
pub use domain::models::{Action, ActionType, Agent, AgentRole, AgentStatus, Goal, Plan, Role};
pub use domain::ports::{ClientDriver, ConnectCredentials, DriverEvent};
pub use services::orchestrator::Orchestrator;
