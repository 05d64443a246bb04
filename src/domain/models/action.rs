//! Atomic actions and the roles that submit them.
//!
//! An action is the smallest schema-validated unit of work dispatched to
//! the game client. The catalog is a closed enum; parameter documents are
//! validated against the declarative table in `services::action_schema`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed catalog of atomic action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    MoveTo,
    Navigate,
    Follow,
    MineBlock,
    PlaceBlock,
    Interact,
    UseItem,
    LookAt,
    Chat,
    GetInventory,
    EquipItem,
    DropItem,
}

impl ActionType {
    pub const ALL: [ActionType; 12] = [
        Self::MoveTo,
        Self::Navigate,
        Self::Follow,
        Self::MineBlock,
        Self::PlaceBlock,
        Self::Interact,
        Self::UseItem,
        Self::LookAt,
        Self::Chat,
        Self::GetInventory,
        Self::EquipItem,
        Self::DropItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveTo => "move_to",
            Self::Navigate => "navigate",
            Self::Follow => "follow",
            Self::MineBlock => "mine_block",
            Self::PlaceBlock => "place_block",
            Self::Interact => "interact",
            Self::UseItem => "use_item",
            Self::LookAt => "look_at",
            Self::Chat => "chat",
            Self::GetInventory => "get_inventory",
            Self::EquipItem => "equip_item",
            Self::DropItem => "drop_item",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "move_to" => Some(Self::MoveTo),
            "navigate" => Some(Self::Navigate),
            "follow" => Some(Self::Follow),
            "mine_block" => Some(Self::MineBlock),
            "place_block" => Some(Self::PlaceBlock),
            "interact" => Some(Self::Interact),
            "use_item" => Some(Self::UseItem),
            "look_at" => Some(Self::LookAt),
            "chat" => Some(Self::Chat),
            "get_inventory" => Some(Self::GetInventory),
            "equip_item" => Some(Self::EquipItem),
            "drop_item" => Some(Self::DropItem),
            _ => None,
        }
    }

    /// Action types that can touch a dangerous block type.
    pub fn handles_blocks(&self) -> bool {
        matches!(self, Self::MineBlock | Self::PlaceBlock)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access role carried by callers and actions.
///
/// Capability order: admin ⊇ autopilot ⊇ viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Autopilot,
    Viewer,
}

impl Default for Role {
    fn default() -> Self {
        Self::Viewer
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Autopilot => "autopilot",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "autopilot" => Some(Self::Autopilot),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Whether this role subsumes `other` in the capability order.
    pub fn at_least(&self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Viewer => 0,
            Self::Autopilot => 1,
            Self::Admin => 2,
        }
    }
}

fn default_caller() -> String {
    "system".to_string()
}

/// A schema-validated atomic operation on the game world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub agent_id: String,
    /// Parameter document; keys follow the wire schema (camelCase).
    #[serde(default)]
    pub params: Value,
    #[serde(default = "default_caller")]
    pub caller: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub approved: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(action_type: ActionType, agent_id: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            agent_id: agent_id.into(),
            params,
            caller: default_caller(),
            role: Role::Autopilot,
            approved: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }

    /// The `blockType` parameter, when present.
    pub fn block_type(&self) -> Option<&str> {
        self.params.get("blockType").and_then(Value::as_str)
    }
}
