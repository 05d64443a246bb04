//! Game-client driver port.
//!
//! The driver is an opaque capability provider: it speaks the game
//! protocol, performs movement/mining/chat/inventory primitives and
//! exposes an event stream. The control plane never reaches past this
//! trait.
//!
//! Cancellation: primitives are plain futures; dropping one cancels the
//! call. Implementations may time out internally (default 30 s); the
//! router applies its own deadline on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::errors::SwarmResult;
use crate::domain::models::agent::{BlockPos, InventoryItem, Position};
use crate::domain::models::world::{BiomeInfo, Block, Entity, EntityKind, SelfState};

/// Credentials used to connect one agent to the world server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectCredentials {
    pub username: String,
    pub host: String,
    pub port: u16,
    /// Auth token, when the server requires one.
    #[serde(default)]
    pub token: Option<String>,
}

impl ConnectCredentials {
    pub fn new(username: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            port,
            token: None,
        }
    }
}

/// Block face for placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    Top,
    Bottom,
    North,
    South,
    East,
    West,
}

impl Face {
    pub const NAMES: [&'static str; 6] = ["top", "bottom", "north", "south", "east", "west"];

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "north" => Some(Self::North),
            "south" => Some(Self::South),
            "east" => Some(Self::East),
            "west" => Some(Self::West),
            _ => None,
        }
    }
}

/// Hand used for interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Entity query filter for `nearest_entity`.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub name: Option<String>,
    pub max_distance: Option<f64>,
}

impl EntityFilter {
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(kind) = self.kind {
            if entity.kind != kind {
                return false;
            }
        }
        if let Some(ref name) = self.name {
            if &entity.name != name {
                return false;
            }
        }
        if let Some(max) = self.max_distance {
            if entity.distance > max {
                return false;
            }
        }
        true
    }
}

/// Event envelope emitted by the driver's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    Spawn {
        agent_id: String,
    },
    Move {
        agent_id: String,
        position: Position,
    },
    Health {
        agent_id: String,
        health: i32,
        food: i32,
    },
    Chat {
        agent_id: String,
        sender: String,
        message: String,
    },
    Error {
        agent_id: String,
        message: String,
    },
    End {
        agent_id: String,
        reason: String,
    },
}

impl DriverEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Spawn { agent_id }
            | Self::Move { agent_id, .. }
            | Self::Health { agent_id, .. }
            | Self::Chat { agent_id, .. }
            | Self::Error { agent_id, .. }
            | Self::End { agent_id, .. } => agent_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Move { .. } => "move",
            Self::Health { .. } => "health",
            Self::Chat { .. } => "chat",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }
}

/// Async port over the game-client transport.
#[async_trait]
pub trait ClientDriver: Send + Sync {
    /// Connect an agent to the world server.
    async fn connect(&self, agent_id: &str, credentials: &ConnectCredentials) -> SwarmResult<()>;

    /// Disconnect an agent.
    async fn disconnect(&self, agent_id: &str, reason: &str) -> SwarmResult<()>;

    // Movement
    async fn move_to(&self, agent_id: &str, target: Position) -> SwarmResult<()>;
    async fn navigate_waypoints(&self, agent_id: &str, waypoints: &[Position]) -> SwarmResult<()>;
    async fn follow_entity(&self, agent_id: &str, entity: &str) -> SwarmResult<()>;
    async fn look(&self, agent_id: &str, yaw: f32, pitch: f32) -> SwarmResult<()>;

    // Block work
    async fn dig(&self, agent_id: &str, block: BlockPos) -> SwarmResult<()>;
    async fn place_block(&self, agent_id: &str, against: BlockPos, face: Face) -> SwarmResult<()>;
    async fn activate_block(&self, agent_id: &str, pos: BlockPos) -> SwarmResult<()>;

    // Items
    async fn activate_item(&self, agent_id: &str, hand: Hand) -> SwarmResult<()>;
    async fn equip(&self, agent_id: &str, item: &str, slot: Option<u16>) -> SwarmResult<()>;
    async fn drop_item(&self, agent_id: &str, slot: u16, count: Option<u32>) -> SwarmResult<()>;

    // Social
    async fn chat(&self, agent_id: &str, message: &str) -> SwarmResult<()>;

    // Queries
    async fn get_inventory(&self, agent_id: &str) -> SwarmResult<Vec<InventoryItem>>;
    async fn self_state(&self, agent_id: &str) -> SwarmResult<SelfState>;
    /// Block at `pos`, or `None` for air.
    async fn block_at(&self, agent_id: &str, pos: BlockPos) -> SwarmResult<Option<Block>>;
    async fn nearest_entity(&self, agent_id: &str, filter: &EntityFilter) -> SwarmResult<Option<Entity>>;
    async fn visible_entities(&self, agent_id: &str, radius: f64) -> SwarmResult<Vec<Entity>>;
    async fn biome(&self, agent_id: &str) -> SwarmResult<BiomeInfo>;

    /// Halt movement and pathfinding for an agent (issued after timeouts).
    async fn stop_all(&self, agent_id: &str) -> SwarmResult<()>;

    /// Subscribe to the driver's event stream.
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;
}
