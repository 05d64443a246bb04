//! World observer: periodic scans producing immutable snapshots.
//!
//! Each observed agent gets its own scanner task. A scan reads self
//! state, entities within the scan radius, non-air blocks via a cubic
//! sweep, and biome info, then swaps the agent's snapshot pointer in one
//! write. Readers always see either the previous or the new snapshot,
//! never a mix. Driver events land in a bounded per-agent ring.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::errors::SwarmResult;
use crate::domain::models::agent::{BlockPos, Position};
use crate::domain::models::config::ObserverConfig;
use crate::domain::models::world::{Block, Entity, EntityKind, WorldSnapshot};
use crate::domain::ports::client_driver::{ClientDriver, DriverEvent, EntityFilter};

/// Advisory hazard report for a position. Never blocks anything.
#[derive(Debug, Clone, Default)]
pub struct SafetyReport {
    pub safe: bool,
    pub hazards: Vec<String>,
}

struct ScannerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns snapshots and event history for every observed agent.
pub struct WorldObserver {
    driver: Arc<dyn ClientDriver>,
    config: ObserverConfig,
    snapshots: RwLock<HashMap<String, Arc<WorldSnapshot>>>,
    events: RwLock<HashMap<String, VecDeque<DriverEvent>>>,
    scanners: Mutex<HashMap<String, ScannerHandle>>,
}

impl WorldObserver {
    pub fn new(driver: Arc<dyn ClientDriver>, config: ObserverConfig) -> Self {
        Self {
            driver,
            config,
            snapshots: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
            scanners: Mutex::new(HashMap::new()),
        }
    }

    /// Run an initial scan, then scan every `update_interval_ms` until
    /// stopped. Observing an already-observed agent restarts its scanner.
    pub async fn start_observing(self: &Arc<Self>, agent_id: &str) -> SwarmResult<()> {
        self.stop_observing(agent_id).await;
        self.scan(agent_id).await?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let observer = Arc::clone(self);
        let id = agent_id.to_string();
        let period = Duration::from_millis(self.config.update_interval_ms);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // initial scan already done
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        if let Err(err) = observer.scan(&id).await {
                            warn!(agent_id = %id, error = %err, "scan failed");
                        }
                    }
                }
            }
            debug!(agent_id = %id, "scanner stopped");
        });

        let mut scanners = self.scanners.lock().await;
        scanners.insert(
            agent_id.to_string(),
            ScannerHandle {
                shutdown: shutdown_tx,
                task,
            },
        );
        Ok(())
    }

    /// Stop an agent's scanner, awaiting its exit. No-op when absent.
    pub async fn stop_observing(&self, agent_id: &str) {
        let handle = {
            let mut scanners = self.scanners.lock().await;
            scanners.remove(agent_id)
        };
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            let _ = handle.task.await;
        }
    }

    pub async fn is_observing(&self, agent_id: &str) -> bool {
        let scanners = self.scanners.lock().await;
        scanners.contains_key(agent_id)
    }

    /// Perform one scan and atomically replace the agent's snapshot.
    pub async fn scan(&self, agent_id: &str) -> SwarmResult<Arc<WorldSnapshot>> {
        let self_state = self.driver.self_state(agent_id).await?;
        let entities = self
            .driver
            .visible_entities(agent_id, self.config.scan_radius)
            .await?;

        let center = BlockPos::from(self_state.position);
        let radius = self.config.block_scan_radius;
        let mut blocks = Vec::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                for dz in -radius..=radius {
                    let pos = BlockPos::new(center.x + dx, center.y + dy, center.z + dz);
                    if let Some(mut block) = self.driver.block_at(agent_id, pos).await? {
                        block.distance = self_state.position.distance_to(&pos.center());
                        blocks.push(block);
                    }
                }
            }
        }

        let biome = self.driver.biome(agent_id).await?;
        let snapshot = Arc::new(WorldSnapshot::new(
            agent_id,
            self_state,
            entities,
            blocks,
            biome,
        ));

        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(agent_id.to_string(), Arc::clone(&snapshot));
        debug!(
            agent_id,
            entities = snapshot.entities.len(),
            blocks = snapshot.blocks.len(),
            "snapshot replaced"
        );
        Ok(snapshot)
    }

    /// Latest snapshot for an agent, if one exists.
    pub async fn latest_snapshot(&self, agent_id: &str) -> Option<Arc<WorldSnapshot>> {
        let snapshots = self.snapshots.read().await;
        snapshots.get(agent_id).cloned()
    }

    /// Milliseconds since the agent's last scan.
    pub async fn snapshot_age_ms(&self, agent_id: &str) -> Option<u64> {
        let snapshot = self.latest_snapshot(agent_id).await?;
        let age = chrono::Utc::now() - snapshot.timestamp;
        age.num_milliseconds().try_into().ok()
    }

    // ---- snapshot-local queries (no rescan) ----

    /// Blocks with the given name in the last snapshot.
    pub async fn scan_for_blocks(&self, agent_id: &str, name: &str) -> Vec<Block> {
        match self.latest_snapshot(agent_id).await {
            Some(snapshot) => snapshot
                .blocks
                .iter()
                .filter(|b| b.name == name)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn find_entities(&self, agent_id: &str, filter: &EntityFilter) -> Vec<Entity> {
        match self.latest_snapshot(agent_id).await {
            Some(snapshot) => snapshot
                .entities
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn get_nearest_entity(
        &self,
        agent_id: &str,
        filter: &EntityFilter,
    ) -> Option<Entity> {
        let snapshot = self.latest_snapshot(agent_id).await?;
        snapshot.nearest_entity_where(|e| filter.matches(e)).cloned()
    }

    pub async fn get_nearest_block(&self, agent_id: &str, name: &str) -> Option<Block> {
        let snapshot = self.latest_snapshot(agent_id).await?;
        snapshot.nearest_block_named(name).cloned()
    }

    /// Hazard assessment for a position, from the last snapshot: lava at
    /// the position, hostiles within 10 blocks, or an air column of 5+
    /// below (fall risk).
    pub async fn is_safe_position(&self, agent_id: &str, position: Position) -> SafetyReport {
        let Some(snapshot) = self.latest_snapshot(agent_id).await else {
            return SafetyReport {
                safe: true,
                hazards: Vec::new(),
            };
        };

        let mut hazards = Vec::new();
        let block_pos = BlockPos::from(position);

        if let Some(block) = snapshot.block_at(block_pos) {
            if block.name.contains("lava") {
                hazards.push(format!("lava at {block_pos:?}"));
            }
        }

        let hostiles = snapshot
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Hostile && e.position.distance_to(&position) <= 10.0)
            .count();
        if hostiles > 0 {
            hazards.push(format!("{hostiles} hostile(s) within 10 blocks"));
        }

        let drop_is_air = (1..=5).all(|i| {
            snapshot
                .block_at(BlockPos::new(block_pos.x, block_pos.y - i, block_pos.z))
                .is_none()
        });
        if drop_is_air {
            hazards.push("fall risk: 5+ blocks of air below".to_string());
        }

        SafetyReport {
            safe: hazards.is_empty(),
            hazards,
        }
    }

    // ---- event history ----

    /// Append a driver event to the agent's bounded ring.
    pub async fn record_event(&self, event: DriverEvent) {
        let mut events = self.events.write().await;
        let ring = events.entry(event.agent_id().to_string()).or_default();
        if ring.len() == self.config.event_history {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Last `n` events for an agent, oldest first.
    pub async fn recent_events(&self, agent_id: &str, n: usize) -> Vec<DriverEvent> {
        let events = self.events.read().await;
        events
            .get(agent_id)
            .map(|ring| ring.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop every scanner and drop all snapshots and event history.
    pub async fn reset(&self) {
        let handles: Vec<ScannerHandle> = {
            let mut scanners = self.scanners.lock().await;
            scanners.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.shutdown.send(true);
            let _ = handle.task.await;
        }
        self.snapshots.write().await.clear();
        self.events.write().await.clear();
    }
}
