//! Domain errors for the hivemind swarm system.

use thiserror::Error;

/// Domain-level errors that can occur in the hivemind control plane.
///
/// Gate decisions (policy denials, schema failures surfaced as reports)
/// are data, not errors; these variants cover operational failures.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Policy denied: {0}")]
    Policy(String),

    #[error("Work {work_id} already claimed by {claimed_by}")]
    Contention { work_id: String, claimed_by: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown goal template: {0}")]
    UnknownGoal(String),

    #[error("No available agents for work {0}")]
    NoAvailableAgents(String),

    #[error("Approval ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Ticket {token} already {status}")]
    TicketAlreadyResolved { token: String, status: String },

    #[error("Credential vault error: {0}")]
    Vault(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Fatal: {0}")]
    Fatal(String),
}

pub type SwarmResult<T> = Result<T, SwarmError>;

impl SwarmError {
    /// Short stable kind tag used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Policy(_) => "policy",
            Self::Contention { .. } => "contention",
            Self::Driver(_) => "driver",
            Self::Timeout { .. } => "timeout",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::DuplicateAgent(_) => "duplicate_agent",
            Self::UnknownGoal(_) => "unknown_goal",
            Self::NoAvailableAgents(_) => "no_available_agents",
            Self::TicketNotFound(_) => "ticket_not_found",
            Self::TicketAlreadyResolved { .. } => "ticket_resolved",
            Self::Vault(_) => "vault",
            Self::Serialization(_) => "serialization",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Fatal errors halt the affected agent's loop; everything else
    /// recovers at plan or call granularity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(err: serde_json::Error) -> Self {
        SwarmError::Serialization(err.to_string())
    }
}
