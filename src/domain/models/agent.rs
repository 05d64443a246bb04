//! Agent domain model.
//!
//! An agent is an autonomous game client connected to the world under a
//! unique id. The registry owns the canonical copy of every agent.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Functional role an agent plays in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Miner,
    Builder,
    Explorer,
    Guard,
    Courier,
    Generalist,
}

impl Default for AgentRole {
    fn default() -> Self {
        Self::Generalist
    }
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Miner => "miner",
            Self::Builder => "builder",
            Self::Explorer => "explorer",
            Self::Guard => "guard",
            Self::Courier => "courier",
            Self::Generalist => "generalist",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "miner" => Some(Self::Miner),
            "builder" => Some(Self::Builder),
            "explorer" => Some(Self::Explorer),
            "guard" => Some(Self::Guard),
            "courier" => Some(Self::Courier),
            "generalist" => Some(Self::Generalist),
            _ => None,
        }
    }

    /// Capabilities implied by the role, used to seed new agents.
    pub fn default_capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::Miner => &["mining", "navigation"],
            Self::Builder => &["building", "navigation"],
            Self::Explorer => &["navigation", "scouting"],
            Self::Guard => &["combat", "navigation"],
            Self::Courier => &["navigation", "inventory"],
            Self::Generalist => &["navigation"],
        }
    }
}

/// Current status of an agent. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Offline,
    Idle,
    Busy,
    Mining,
    Building,
    Moving,
    Blocked,
    Error,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Offline
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Mining => "mining",
            Self::Building => "building",
            Self::Moving => "moving",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "offline" => Some(Self::Offline),
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            "mining" => Some(Self::Mining),
            "building" => Some(Self::Building),
            "moving" => Some(Self::Moving),
            "blocked" => Some(Self::Blocked),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the agent can take on new work in this status.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// World position in floating-point block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn center(&self) -> Position {
        Position::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }
}

impl From<Position> for BlockPos {
    fn from(pos: Position) -> Self {
        Self {
            x: pos.x.floor() as i32,
            y: pos.y.floor() as i32,
            z: pos.z.floor() as i32,
        }
    }
}

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub slot: u32,
    pub name: String,
    pub count: u32,
    pub meta: i32,
}

impl InventoryItem {
    pub fn new(slot: u32, name: impl Into<String>, count: u32) -> Self {
        Self {
            slot,
            name: name.into(),
            count,
            meta: 0,
        }
    }
}

/// Per-agent activity counters maintained by the registry and loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub actions_executed: u64,
    pub actions_failed: u64,
    pub goals_completed: u64,
}

/// An autonomous game-client agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier
    pub id: String,
    /// Functional role
    pub role: AgentRole,
    /// Capability tags used for work assignment
    pub capabilities: HashSet<String>,
    /// Current status (exactly one)
    pub status: AgentStatus,
    /// Owning user
    pub owner: String,
    /// Last known world position
    pub position: Position,
    pub health: i32,
    pub food: i32,
    pub max_health: i32,
    /// Last observed inventory
    pub inventory: Vec<InventoryItem>,
    pub registered_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub metrics: AgentMetrics,
}

impl Agent {
    /// Create a new offline agent seeded with the role's default capabilities.
    pub fn new(id: impl Into<String>, role: AgentRole, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            role,
            capabilities: role
                .default_capabilities()
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            status: AgentStatus::Offline,
            owner: owner.into(),
            position: Position::default(),
            health: 20,
            food: 20,
            max_health: 20,
            inventory: Vec::new(),
            registered_at: now,
            last_update: now,
            metrics: AgentMetrics::default(),
        }
    }

    /// Add a capability tag.
    pub fn with_capability(mut self, cap: impl Into<String>) -> Self {
        self.capabilities.insert(cap.into());
        self
    }

    /// Set the starting position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.contains(cap)
    }

    /// Update position, bumping `last_update`.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
        self.last_update = Utc::now();
    }

    /// Update status, bumping `last_update`.
    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.last_update = Utc::now();
    }
}
