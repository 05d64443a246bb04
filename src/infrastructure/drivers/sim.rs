//! Simulated client driver for tests and demos.
//!
//! A deterministic in-process world per agent: scriptable blocks,
//! entities and inventory, controllable failure injection and latency,
//! and a broadcast event stream matching the driver contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::agent::{BlockPos, InventoryItem, Position};
use crate::domain::models::world::{BiomeInfo, Block, Entity, SelfState};
use crate::domain::ports::client_driver::{
    ClientDriver, ConnectCredentials, DriverEvent, EntityFilter, Face, Hand,
};

#[derive(Debug, Clone)]
struct SimBlock {
    name: String,
    hardness: f32,
    material: String,
    diggable: bool,
}

#[derive(Debug, Default)]
struct SimWorld {
    connected: bool,
    state: SelfState,
    blocks: HashMap<BlockPos, SimBlock>,
    entities: Vec<Entity>,
    inventory: Vec<InventoryItem>,
    equipped: Option<String>,
    biome: BiomeInfo,
    chat_log: Vec<String>,
}

/// Deterministic in-process `ClientDriver`.
pub struct SimDriver {
    worlds: RwLock<HashMap<String, SimWorld>>,
    /// One-shot failures per primitive name, consumed on use.
    failures: RwLock<HashMap<String, String>>,
    latency: RwLock<Duration>,
    events: broadcast::Sender<DriverEvent>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            worlds: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            latency: RwLock::new(Duration::ZERO),
            events,
        }
    }

    // ---- test/demo controls ----

    /// Connect an agent with throwaway credentials.
    pub async fn connect_for_test(&self, agent_id: &str) {
        let creds = ConnectCredentials::new(agent_id, "sim", 0);
        self.connect(agent_id, &creds)
            .await
            .expect("sim connect cannot fail without injection");
    }

    /// Make the next call to `primitive` fail with `message`.
    pub async fn fail_next(&self, primitive: &str, message: &str) {
        let mut failures = self.failures.write().await;
        failures.insert(primitive.to_string(), message.to_string());
    }

    /// Sleep this long inside every primitive.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    /// Place a block in an agent's world.
    pub async fn set_block(&self, agent_id: &str, pos: BlockPos, name: &str) {
        let mut worlds = self.worlds.write().await;
        let world = worlds.entry(agent_id.to_string()).or_default();
        world.blocks.insert(
            pos,
            SimBlock {
                name: name.to_string(),
                hardness: 1.5,
                material: "rock".to_string(),
                diggable: true,
            },
        );
    }

    /// Add an entity to an agent's world.
    pub async fn spawn_entity(&self, agent_id: &str, entity: Entity) {
        let mut worlds = self.worlds.write().await;
        worlds
            .entry(agent_id.to_string())
            .or_default()
            .entities
            .push(entity);
    }

    pub async fn set_position(&self, agent_id: &str, position: Position) {
        let mut worlds = self.worlds.write().await;
        worlds.entry(agent_id.to_string()).or_default().state.position = position;
    }

    pub async fn set_health(&self, agent_id: &str, health: i32, food: i32) {
        let mut worlds = self.worlds.write().await;
        let world = worlds.entry(agent_id.to_string()).or_default();
        world.state.health = health;
        world.state.food = food;
        let _ = self.events.send(DriverEvent::Health {
            agent_id: agent_id.to_string(),
            health,
            food,
        });
    }

    pub async fn give_item(&self, agent_id: &str, item: InventoryItem) {
        let mut worlds = self.worlds.write().await;
        worlds
            .entry(agent_id.to_string())
            .or_default()
            .inventory
            .push(item);
    }

    /// Messages this agent has sent.
    pub async fn chat_log(&self, agent_id: &str) -> Vec<String> {
        let worlds = self.worlds.read().await;
        worlds
            .get(agent_id)
            .map(|w| w.chat_log.clone())
            .unwrap_or_default()
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        let worlds = self.worlds.read().await;
        worlds.get(agent_id).is_some_and(|w| w.connected)
    }

    // ---- internals ----

    async fn pace(&self) {
        let latency = *self.latency.read().await;
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
    }

    async fn maybe_fail(&self, primitive: &str) -> SwarmResult<()> {
        let mut failures = self.failures.write().await;
        if let Some(message) = failures.remove(primitive) {
            return Err(SwarmError::Driver(message));
        }
        Ok(())
    }

    async fn with_world<T>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut SimWorld) -> SwarmResult<T>,
    ) -> SwarmResult<T> {
        let mut worlds = self.worlds.write().await;
        let world = worlds
            .get_mut(agent_id)
            .filter(|w| w.connected)
            .ok_or_else(|| SwarmError::Driver(format!("agent '{agent_id}' not connected")))?;
        f(world)
    }

    fn emit(&self, event: DriverEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ClientDriver for SimDriver {
    async fn connect(&self, agent_id: &str, _credentials: &ConnectCredentials) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("connect").await?;
        let mut worlds = self.worlds.write().await;
        let world = worlds.entry(agent_id.to_string()).or_default();
        world.connected = true;
        drop(worlds);
        self.emit(DriverEvent::Spawn {
            agent_id: agent_id.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self, agent_id: &str, reason: &str) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("disconnect").await?;
        let mut worlds = self.worlds.write().await;
        if let Some(world) = worlds.get_mut(agent_id) {
            world.connected = false;
        }
        drop(worlds);
        self.emit(DriverEvent::End {
            agent_id: agent_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn move_to(&self, agent_id: &str, target: Position) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("move_to").await?;
        self.with_world(agent_id, |world| {
            world.state.position = target;
            Ok(())
        })
        .await?;
        self.emit(DriverEvent::Move {
            agent_id: agent_id.to_string(),
            position: target,
        });
        Ok(())
    }

    async fn navigate_waypoints(&self, agent_id: &str, waypoints: &[Position]) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("navigate_waypoints").await?;
        let Some(last) = waypoints.last().copied() else {
            return Err(SwarmError::Driver("empty waypoint list".to_string()));
        };
        self.with_world(agent_id, |world| {
            world.state.position = last;
            Ok(())
        })
        .await?;
        self.emit(DriverEvent::Move {
            agent_id: agent_id.to_string(),
            position: last,
        });
        Ok(())
    }

    async fn follow_entity(&self, agent_id: &str, entity: &str) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("follow_entity").await?;
        let position = self
            .with_world(agent_id, |world| {
                world
                    .entities
                    .iter()
                    .find(|e| e.name == entity || e.id == entity)
                    .map(|e| e.position)
                    .ok_or_else(|| SwarmError::Driver(format!("entity '{entity}' not found")))
            })
            .await?;
        self.with_world(agent_id, |world| {
            world.state.position = position;
            Ok(())
        })
        .await?;
        self.emit(DriverEvent::Move {
            agent_id: agent_id.to_string(),
            position,
        });
        Ok(())
    }

    async fn look(&self, agent_id: &str, yaw: f32, pitch: f32) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("look").await?;
        self.with_world(agent_id, |world| {
            world.state.yaw = yaw;
            world.state.pitch = pitch;
            Ok(())
        })
        .await
    }

    async fn dig(&self, agent_id: &str, block: BlockPos) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("dig").await?;
        self.with_world(agent_id, |world| {
            let removed = world
                .blocks
                .remove(&block)
                .ok_or_else(|| SwarmError::Driver(format!("no block at {block:?}")))?;
            if !removed.diggable {
                world.blocks.insert(block, removed);
                return Err(SwarmError::Driver("block is not diggable".to_string()));
            }
            let slot = u32::try_from(world.inventory.len()).unwrap_or(0);
            world
                .inventory
                .push(InventoryItem::new(slot, removed.name, 1));
            Ok(())
        })
        .await
    }

    async fn place_block(&self, agent_id: &str, against: BlockPos, face: Face) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("place_block").await?;
        let target = match face {
            Face::Top => BlockPos::new(against.x, against.y + 1, against.z),
            Face::Bottom => BlockPos::new(against.x, against.y - 1, against.z),
            Face::North => BlockPos::new(against.x, against.y, against.z - 1),
            Face::South => BlockPos::new(against.x, against.y, against.z + 1),
            Face::East => BlockPos::new(against.x + 1, against.y, against.z),
            Face::West => BlockPos::new(against.x - 1, against.y, against.z),
        };
        self.with_world(agent_id, |world| {
            let name = world.equipped.clone().unwrap_or_else(|| "stone".to_string());
            world.blocks.insert(
                target,
                SimBlock {
                    name,
                    hardness: 1.5,
                    material: "rock".to_string(),
                    diggable: true,
                },
            );
            Ok(())
        })
        .await
    }

    async fn activate_block(&self, agent_id: &str, pos: BlockPos) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("activate_block").await?;
        self.with_world(agent_id, |world| {
            world
                .blocks
                .get(&pos)
                .map(|_| ())
                .ok_or_else(|| SwarmError::Driver(format!("no block at {pos:?}")))
        })
        .await
    }

    async fn activate_item(&self, agent_id: &str, _hand: Hand) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("activate_item").await?;
        self.with_world(agent_id, |_| Ok(())).await
    }

    async fn equip(&self, agent_id: &str, item: &str, _slot: Option<u16>) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("equip").await?;
        self.with_world(agent_id, |world| {
            world.equipped = Some(item.to_string());
            Ok(())
        })
        .await
    }

    async fn drop_item(&self, agent_id: &str, slot: u16, count: Option<u32>) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("drop_item").await?;
        self.with_world(agent_id, |world| {
            let index = world
                .inventory
                .iter()
                .position(|item| item.slot == u32::from(slot))
                .ok_or_else(|| SwarmError::Driver(format!("slot {slot} is empty")))?;
            let dropped = count.unwrap_or(world.inventory[index].count);
            if dropped >= world.inventory[index].count {
                world.inventory.remove(index);
            } else {
                world.inventory[index].count -= dropped;
            }
            Ok(())
        })
        .await
    }

    async fn chat(&self, agent_id: &str, message: &str) -> SwarmResult<()> {
        self.pace().await;
        self.maybe_fail("chat").await?;
        self.with_world(agent_id, |world| {
            world.chat_log.push(message.to_string());
            Ok(())
        })
        .await?;
        self.emit(DriverEvent::Chat {
            agent_id: agent_id.to_string(),
            sender: agent_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn get_inventory(&self, agent_id: &str) -> SwarmResult<Vec<InventoryItem>> {
        self.pace().await;
        self.maybe_fail("get_inventory").await?;
        self.with_world(agent_id, |world| Ok(world.inventory.clone())).await
    }

    async fn self_state(&self, agent_id: &str) -> SwarmResult<SelfState> {
        self.pace().await;
        self.maybe_fail("self_state").await?;
        self.with_world(agent_id, |world| {
            let mut state = world.state.clone();
            state.inventory_slots_used = u32::try_from(world.inventory.len()).unwrap_or(u32::MAX);
            Ok(state)
        })
        .await
    }

    async fn block_at(&self, agent_id: &str, pos: BlockPos) -> SwarmResult<Option<Block>> {
        self.maybe_fail("block_at").await?;
        self.with_world(agent_id, |world| {
            Ok(world.blocks.get(&pos).map(|b| Block {
                name: b.name.clone(),
                position: pos,
                distance: world.state.position.distance_to(&pos.center()),
                hardness: b.hardness,
                material: b.material.clone(),
                diggable: b.diggable,
            }))
        })
        .await
    }

    async fn nearest_entity(
        &self,
        agent_id: &str,
        filter: &EntityFilter,
    ) -> SwarmResult<Option<Entity>> {
        self.maybe_fail("nearest_entity").await?;
        self.with_world(agent_id, |world| {
            let origin = world.state.position;
            Ok(world
                .entities
                .iter()
                .map(|e| {
                    let mut e = e.clone();
                    e.distance = e.position.distance_to(&origin);
                    e
                })
                .filter(|e| filter.matches(e))
                .min_by(|a, b| a.distance.total_cmp(&b.distance)))
        })
        .await
    }

    async fn visible_entities(&self, agent_id: &str, radius: f64) -> SwarmResult<Vec<Entity>> {
        self.maybe_fail("visible_entities").await?;
        self.with_world(agent_id, |world| {
            let origin = world.state.position;
            Ok(world
                .entities
                .iter()
                .map(|e| {
                    let mut e = e.clone();
                    e.distance = e.position.distance_to(&origin);
                    e
                })
                .filter(|e| e.distance <= radius)
                .collect())
        })
        .await
    }

    async fn biome(&self, agent_id: &str) -> SwarmResult<BiomeInfo> {
        self.maybe_fail("biome").await?;
        self.with_world(agent_id, |world| Ok(world.biome.clone())).await
    }

    async fn stop_all(&self, agent_id: &str) -> SwarmResult<()> {
        self.maybe_fail("stop_all").await?;
        self.with_world(agent_id, |_| Ok(())).await
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::world::EntityKind;

    #[tokio::test]
    async fn test_connect_emits_spawn() {
        let driver = SimDriver::new();
        let mut events = driver.subscribe();
        driver.connect_for_test("a").await;
        match events.recv().await.unwrap() {
            DriverEvent::Spawn { agent_id } => assert_eq!(agent_id, "a"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(driver.is_connected("a").await);
    }

    #[tokio::test]
    async fn test_primitives_require_connection() {
        let driver = SimDriver::new();
        let err = driver.chat("ghost", "hi").await.unwrap_err();
        assert!(matches!(err, SwarmError::Driver(_)));
    }

    #[tokio::test]
    async fn test_dig_moves_block_to_inventory() {
        let driver = SimDriver::new();
        driver.connect_for_test("a").await;
        let pos = BlockPos::new(10, 64, 0);
        driver.set_block("a", pos, "coal_ore").await;

        driver.dig("a", pos).await.unwrap();
        assert!(driver.block_at("a", pos).await.unwrap().is_none());
        let inventory = driver.get_inventory("a").await.unwrap();
        assert_eq!(inventory[0].name, "coal_ore");

        // Digging air fails.
        assert!(driver.dig("a", pos).await.is_err());
    }

    #[tokio::test]
    async fn test_place_block_offsets_by_face() {
        let driver = SimDriver::new();
        driver.connect_for_test("a").await;
        driver.equip("a", "cobblestone", None).await.unwrap();
        driver
            .place_block("a", BlockPos::new(0, 64, 0), Face::Top)
            .await
            .unwrap();
        let placed = driver
            .block_at("a", BlockPos::new(0, 65, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(placed.name, "cobblestone");
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let driver = SimDriver::new();
        driver.connect_for_test("a").await;
        driver.fail_next("chat", "boom").await;
        assert!(driver.chat("a", "first").await.is_err());
        assert!(driver.chat("a", "second").await.is_ok());
    }

    #[tokio::test]
    async fn test_nearest_entity_recomputes_distance() {
        let driver = SimDriver::new();
        driver.connect_for_test("a").await;
        driver
            .spawn_entity(
                "a",
                Entity {
                    id: "z1".to_string(),
                    name: "zombie".to_string(),
                    kind: EntityKind::Hostile,
                    position: Position::new(6.0, 64.0, 8.0),
                    distance: 0.0,
                    health: 20,
                    yaw: 0.0,
                    pitch: 0.0,
                },
            )
            .await;

        let found = driver
            .nearest_entity("a", &EntityFilter::kind(EntityKind::Hostile))
            .await
            .unwrap()
            .unwrap();
        assert!((found.distance - 10.0).abs() < 1e-9);
    }
}
