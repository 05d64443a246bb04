//! Plans: ordered action sequences produced by the goal planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;

/// An ordered, finite sequence of actions targeting one goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal_name: String,
    pub agent_id: String,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal_name: impl Into<String>, agent_id: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            goal_name: goal_name.into(),
            agent_id: agent_id.into(),
            actions,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Truncate at the tail to `max` actions. Returns the number dropped.
    /// Actions are never split; excess is discarded whole.
    pub fn truncate(&mut self, max: usize) -> usize {
        if self.actions.len() <= max {
            return 0;
        }
        let dropped = self.actions.len() - max;
        self.actions.truncate(max);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::ActionType;
    use serde_json::json;

    fn chat(i: usize) -> Action {
        Action::new(ActionType::Chat, "a", json!({"message": format!("m{i}")}))
    }

    #[test]
    fn test_truncate_drops_tail() {
        let mut plan = Plan::new("g", "a", (0..5).map(chat).collect());
        assert_eq!(plan.truncate(3), 2);
        assert_eq!(plan.len(), 3);
        // idempotent below the cap
        assert_eq!(plan.truncate(3), 0);
    }
}
