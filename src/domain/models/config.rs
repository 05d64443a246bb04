//! Process-wide configuration model.
//!
//! Loaded by `infrastructure::config::ConfigLoader` via hierarchical merge
//! (defaults → project yaml → local yaml → environment).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default dangerous block blacklist. Configurable, but this baseline is
/// always the starting point.
pub const DEFAULT_DANGEROUS_BLOCKS: [&str; 12] = [
    "tnt",
    "command_block",
    "repeating_command_block",
    "chain_command_block",
    "structure_block",
    "jigsaw",
    "bedrock",
    "void_air",
    "end_portal_frame",
    "end_portal",
    "spawner",
    "end_gateway",
];

/// Horizontal/vertical coordinate bounds of the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub xz_min: f64,
    pub xz_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            xz_min: -30_000_000.0,
            xz_max: 30_000_000.0,
            y_min: -64.0,
            y_max: 319.0,
        }
    }
}

impl WorldBounds {
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        x >= self.xz_min
            && x <= self.xz_max
            && z >= self.xz_min
            && z <= self.xz_max
            && y >= self.y_min
            && y <= self.y_max
    }
}

/// World observer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Entity scan radius in blocks.
    pub scan_radius: f64,
    /// Half-edge of the cubic block sweep.
    pub block_scan_radius: i32,
    /// Scan period in milliseconds.
    pub update_interval_ms: u64,
    /// Per-agent driver event ring capacity.
    pub event_history: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            scan_radius: 32.0,
            block_scan_radius: 16,
            update_interval_ms: 2000,
            event_history: 100,
        }
    }
}

/// Goal planner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Hard cap on emitted plan length; excess is truncated at the tail.
    pub max_plan_length: usize,
    /// Plan cache time-to-live in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_plan_length: 20,
            cache_ttl_secs: 30,
        }
    }
}

/// Policy engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fixed-window requests per minute per (user, role).
    pub requests_per_minute: u32,
    /// Per-agent concurrent task ceiling.
    pub max_tasks_per_agent: u32,
    /// Allowed action types per role name; `["*"]` allows everything.
    pub allowed_actions: HashMap<String, Vec<String>>,
    /// Dangerous block blacklist.
    pub dangerous_blocks: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut allowed_actions = HashMap::new();
        allowed_actions.insert("admin".to_string(), vec!["*".to_string()]);
        allowed_actions.insert("autopilot".to_string(), vec!["*".to_string()]);
        allowed_actions.insert("viewer".to_string(), vec!["get_inventory".to_string()]);
        Self {
            requests_per_minute: 600,
            max_tasks_per_agent: 8,
            allowed_actions,
            dangerous_blocks: DEFAULT_DANGEROUS_BLOCKS.iter().map(|b| (*b).to_string()).collect(),
        }
    }
}

impl PolicyConfig {
    pub fn is_dangerous_block(&self, name: &str) -> bool {
        self.dangerous_blocks.iter().any(|b| b == name)
    }
}

/// Action router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Per-dispatch deadline in milliseconds.
    pub task_timeout_ms: u64,
    /// Reject unapproved dangerous actions at the router.
    pub require_approval_for_dangerous: bool,
    /// In-flight dispatch ceiling per agent.
    pub max_active_per_agent: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: 30_000,
            require_approval_for_dangerous: true,
            max_active_per_agent: 8,
        }
    }
}

/// Autonomy loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Bounded ODVA history per agent.
    pub history_limit: usize,
    /// Snapshots older than this skip the tick.
    pub stale_after_ms: u64,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            history_limit: 1000,
            stale_after_ms: 6000,
        }
    }
}

/// Experience buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceConfig {
    pub capacity: usize,
}

impl Default for ExperienceConfig {
    fn default() -> Self {
        Self { capacity: 5000 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
    /// Optional log file path; stdout when absent.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Root configuration for the swarm control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub max_agents: MaxAgents,
    pub world: WorldBounds,
    pub observer: ObserverConfig,
    pub planner: PlannerConfig,
    pub policy: PolicyConfig,
    pub router: RouterConfig,
    pub autonomy: AutonomyConfig,
    pub experience: ExperienceConfig,
    pub logging: LoggingConfig,
}

/// Newtype so the default (16) survives `#[serde(default)]` merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxAgents(pub usize);

impl Default for MaxAgents {
    fn default() -> Self {
        Self(16)
    }
}
