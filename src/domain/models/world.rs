//! World observation model: immutable snapshots produced by one scan.
//!
//! A snapshot is owned by the observer, replaced atomically per scan and
//! never mutated in place. Consumers hold `Arc<WorldSnapshot>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{BlockPos, Position};

/// Classification of a visible entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Hostile,
    Passive,
    Item,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Hostile => "hostile",
            Self::Passive => "passive",
            Self::Item => "item",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "player" => Some(Self::Player),
            "hostile" => Some(Self::Hostile),
            "passive" => Some(Self::Passive),
            "item" => Some(Self::Item),
            _ => None,
        }
    }
}

/// An entity visible in one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub position: Position,
    /// Distance from the scanning agent at scan time.
    pub distance: f64,
    pub health: i32,
    pub yaw: f32,
    pub pitch: f32,
}

/// A non-air block captured by the cubic sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub position: BlockPos,
    /// Distance from the scanning agent at scan time.
    pub distance: f64,
    pub hardness: f32,
    pub material: String,
    pub diggable: bool,
}

impl Block {
    /// Whether this block counts as a gatherable resource.
    pub fn is_resource(&self) -> bool {
        self.name.ends_with("_ore") || self.name.ends_with("_log")
    }
}

/// Biome and weather report for the agent's chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomeInfo {
    pub name: String,
    pub temperature: f32,
    pub raining: bool,
}

impl Default for BiomeInfo {
    fn default() -> Self {
        Self {
            name: "plains".to_string(),
            temperature: 0.8,
            raining: false,
        }
    }
}

/// The scanning agent's own state as reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfState {
    pub position: Position,
    pub health: i32,
    pub food: i32,
    pub max_health: i32,
    pub yaw: f32,
    pub pitch: f32,
    pub inventory_slots_used: u32,
    pub inventory_slots_total: u32,
}

impl Default for SelfState {
    fn default() -> Self {
        Self {
            position: Position::default(),
            health: 20,
            food: 20,
            max_health: 20,
            yaw: 0.0,
            pitch: 0.0,
            inventory_slots_used: 0,
            inventory_slots_total: 36,
        }
    }
}

impl SelfState {
    /// Fraction of inventory slots in use.
    pub fn inventory_pressure(&self) -> f64 {
        if self.inventory_slots_total == 0 {
            return 0.0;
        }
        f64::from(self.inventory_slots_used) / f64::from(self.inventory_slots_total)
    }
}

/// Headline counters derived from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub nearby_players: usize,
    pub nearby_hostiles: usize,
    pub nearby_passives: usize,
    pub resource_blocks: usize,
}

/// Immutable world-state record produced by one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub self_state: SelfState,
    pub entities: Vec<Entity>,
    pub blocks: Vec<Block>,
    pub biome: BiomeInfo,
    pub summary: SnapshotSummary,
}

impl WorldSnapshot {
    /// Build a snapshot, deriving the summary counters from its contents.
    pub fn new(
        agent_id: impl Into<String>,
        self_state: SelfState,
        entities: Vec<Entity>,
        blocks: Vec<Block>,
        biome: BiomeInfo,
    ) -> Self {
        let summary = SnapshotSummary {
            nearby_players: entities.iter().filter(|e| e.kind == EntityKind::Player).count(),
            nearby_hostiles: entities.iter().filter(|e| e.kind == EntityKind::Hostile).count(),
            nearby_passives: entities.iter().filter(|e| e.kind == EntityKind::Passive).count(),
            resource_blocks: blocks.iter().filter(|b| b.is_resource()).count(),
        };
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            self_state,
            entities,
            blocks,
            biome,
            summary,
        }
    }

    /// Nearest block matching a predicate, by scan distance.
    pub fn nearest_block_where<F: Fn(&Block) -> bool>(&self, pred: F) -> Option<&Block> {
        self.blocks
            .iter()
            .filter(|b| pred(b))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Nearest block with the given name.
    pub fn nearest_block_named(&self, name: &str) -> Option<&Block> {
        self.nearest_block_where(|b| b.name == name)
    }

    /// Nearest entity matching a predicate, by scan distance.
    pub fn nearest_entity_where<F: Fn(&Entity) -> bool>(&self, pred: F) -> Option<&Entity> {
        self.entities
            .iter()
            .filter(|e| pred(e))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Block occupying `pos`, if the sweep captured one.
    pub fn block_at(&self, pos: BlockPos) -> Option<&Block> {
        self.blocks.iter().find(|b| b.position == pos)
    }
}
