//! Experience records: bounded action-outcome memory.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One {agent, action, outcome} tuple in the experience ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    /// Ring-assigned id, monotonically increasing.
    pub id: u64,
    pub agent_id: String,
    /// Action type name that produced this outcome.
    pub action: String,
    pub success: bool,
    pub reward: f64,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An experience awaiting a ring id.
#[derive(Debug, Clone, Default)]
pub struct ExperienceDraft {
    pub agent_id: String,
    pub action: String,
    pub success: bool,
    pub reward: f64,
    pub metrics: HashMap<String, f64>,
    pub notes: Option<String>,
    pub personality: Option<String>,
}

impl ExperienceDraft {
    pub fn new(agent_id: impl Into<String>, action: impl Into<String>, success: bool, reward: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            action: action.into(),
            success,
            reward,
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub(crate) fn into_experience(self, id: u64) -> Experience {
        Experience {
            id,
            agent_id: self.agent_id,
            action: self.action,
            success: self.success,
            reward: self.reward,
            metrics: self.metrics,
            notes: self.notes,
            personality: self.personality,
            timestamp: Utc::now(),
        }
    }
}
