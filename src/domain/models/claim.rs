//! Work claims: at-most-once assignment of a work id to an agent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An active claim of one work id by one agent.
///
/// The registry guarantees each work id has at most one active claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkClaim {
    pub work_id: String,
    pub agent_id: String,
    pub claimed_at: DateTime<Utc>,
    /// Opaque payload describing the work.
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl WorkClaim {
    pub fn new(work_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            work_id: work_id.into(),
            agent_id: agent_id.into(),
            claimed_at: Utc::now(),
            details: HashMap::new(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
        self.details = details;
        self
    }
}

/// Requirements used by work assignment to select an agent.
#[derive(Debug, Clone, Default)]
pub struct WorkRequirement {
    /// Required capability tag; preferred over everything else.
    pub capability: Option<String>,
    /// Region hint used when no capability is required.
    pub region: Option<String>,
    /// Opaque payload copied onto the claim.
    pub details: HashMap<String, Value>,
}

impl WorkRequirement {
    pub fn capability(cap: impl Into<String>) -> Self {
        Self {
            capability: Some(cap.into()),
            ..Self::default()
        }
    }

    pub fn region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Self::default()
        }
    }
}
