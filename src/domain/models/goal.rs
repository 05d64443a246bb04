//! Goals: named intents resolved to plans by template.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scheduling priority of a goal in an agent's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Low,
    Normal,
    High,
}

impl Default for GoalPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl GoalPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A named intent with template context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Goal {
    /// Template name from the planner's closed set.
    pub name: String,
    /// Free-form context consumed by the template.
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub priority: GoalPriority,
}

impl Goal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: HashMap::new(),
            priority: GoalPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: GoalPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Numeric context lookup with default.
    pub fn context_f64(&self, key: &str, default: f64) -> f64 {
        self.context.get(key).and_then(Value::as_f64).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(GoalPriority::High > GoalPriority::Normal);
        assert!(GoalPriority::Normal > GoalPriority::Low);
    }

    #[test]
    fn test_context_lookup() {
        let goal = Goal::new("explore_area").with_context("radius", json!(24));
        assert!((goal.context_f64("radius", 16.0) - 24.0).abs() < f64::EPSILON);
        assert!((goal.context_f64("missing", 16.0) - 16.0).abs() < f64::EPSILON);
    }
}
