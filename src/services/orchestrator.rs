//! Orchestrator: composition root and lifecycle owner.
//!
//! Owns the driver, observer, planner, coordinator (with its registry),
//! policy engine, admission host and one autonomy loop per agent. Driver
//! events fan in here: positions and vitals flow to the registry, every
//! event lands in the observer's history.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::agent::{Agent, AgentRole, AgentStatus};
use crate::domain::models::claim::WorkClaim;
use crate::domain::models::config::SwarmConfig;
use crate::domain::models::goal::Goal;
use crate::domain::ports::client_driver::{ClientDriver, ConnectCredentials, DriverEvent};
use crate::infrastructure::credentials::CredentialVault;
use crate::services::action_router::{ActionRouter, RouterMetricsSnapshot};
use crate::services::admission::AdmissionHost;
use crate::services::agent_registry::{AgentRegistry, RegistryStats};
use crate::services::autonomy_loop::{AutonomyLoop, LoopDeps, LoopState};
use crate::services::coordinator::Coordinator;
use crate::services::experience_buffer::ExperienceBuffer;
use crate::services::goal_planner::GoalPlanner;
use crate::services::policy_engine::PolicyEngine;
use crate::services::world_observer::WorldObserver;

/// Aggregate swarm view for operators.
#[derive(Debug, Clone)]
pub struct SwarmStatus {
    pub registry: RegistryStats,
    pub router: RouterMetricsSnapshot,
    pub loops: HashMap<String, LoopState>,
    pub swarm_goals: Vec<String>,
    pub experiences: usize,
}

/// Result of a fan-out `coordinate_task` call.
#[derive(Debug, Clone, Default)]
pub struct CoordinationReport {
    /// True only when every agent was claimed and queued.
    pub success: bool,
    pub claims: Vec<WorkClaim>,
    pub failures: Vec<(String, String)>,
}

/// Binds every component and drives agent lifecycles.
pub struct Orchestrator {
    driver: Arc<dyn ClientDriver>,
    config: SwarmConfig,
    registry: Arc<AgentRegistry>,
    observer: Arc<WorldObserver>,
    planner: Arc<GoalPlanner>,
    policy: Arc<PolicyEngine>,
    admission: Arc<AdmissionHost>,
    experience: Arc<ExperienceBuffer>,
    coordinator: Coordinator,
    vault: CredentialVault,
    loops: RwLock<HashMap<String, Arc<AutonomyLoop>>>,
    swarm_goals: RwLock<Vec<Goal>>,
    event_pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build the control plane over a driver and start the event pump.
    pub fn new(driver: Arc<dyn ClientDriver>, config: SwarmConfig) -> Arc<Self> {
        let registry = Arc::new(AgentRegistry::new());
        let observer = Arc::new(WorldObserver::new(
            Arc::clone(&driver),
            config.observer.clone(),
        ));
        let planner = Arc::new(GoalPlanner::new(config.planner.clone()));
        let policy = Arc::new(PolicyEngine::new(config.policy.clone()));
        let router = Arc::new(ActionRouter::new(
            Arc::clone(&driver),
            config.router.clone(),
            config.world,
        ));
        let admission = Arc::new(AdmissionHost::new(Arc::clone(&policy), router));
        let experience = Arc::new(ExperienceBuffer::new(config.experience.capacity));
        let coordinator = Coordinator::new(Arc::clone(&registry));

        let orchestrator = Arc::new(Self {
            driver,
            config,
            registry,
            observer,
            planner,
            policy,
            admission,
            experience,
            coordinator,
            vault: CredentialVault::new(),
            loops: RwLock::new(HashMap::new()),
            swarm_goals: RwLock::new(Vec::new()),
            event_pump: std::sync::Mutex::new(None),
        });

        let pump = tokio::spawn(Self::pump_events(
            orchestrator.driver.subscribe(),
            Arc::clone(&orchestrator.observer),
            Arc::clone(&orchestrator.registry),
        ));
        if let Ok(mut slot) = orchestrator.event_pump.lock() {
            *slot = Some(pump);
        }
        orchestrator
    }

    /// Fan driver events into the observer history and the registry.
    async fn pump_events(
        mut events: tokio::sync::broadcast::Receiver<DriverEvent>,
        observer: Arc<WorldObserver>,
        registry: Arc<AgentRegistry>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    match &event {
                        DriverEvent::Move { agent_id, position } => {
                            let _ = registry.update_position(agent_id, *position).await;
                        }
                        DriverEvent::Health {
                            agent_id,
                            health,
                            food,
                        } => {
                            let _ = registry.update_vitals(agent_id, *health, *food).await;
                        }
                        DriverEvent::Error { agent_id, message } => {
                            warn!(agent_id = %agent_id, message = %message, "driver error event");
                        }
                        _ => {}
                    }
                    observer.record_event(event).await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump lagged, events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    // ---- component access ----

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn observer(&self) -> &Arc<WorldObserver> {
        &self.observer
    }

    pub fn planner(&self) -> &Arc<GoalPlanner> {
        &self.planner
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn admission(&self) -> &Arc<AdmissionHost> {
        &self.admission
    }

    pub fn experience(&self) -> &Arc<ExperienceBuffer> {
        &self.experience
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    // ---- agent lifecycle ----

    /// Connect an agent, register it, start observation and its loop, and
    /// queue its initial goals plus the standing swarm goals.
    pub async fn connect_agent_with_autonomy(
        self: &Arc<Self>,
        agent_id: &str,
        role: AgentRole,
        credentials: ConnectCredentials,
        goals: Vec<Goal>,
    ) -> SwarmResult<()> {
        {
            let loops = self.loops.read().await;
            if loops.len() >= self.config.max_agents.0 {
                return Err(SwarmError::Policy(format!(
                    "agent limit {} reached",
                    self.config.max_agents.0
                )));
            }
        }

        self.driver.connect(agent_id, &credentials).await?;
        self.vault.store(agent_id, &credentials).await?;

        // The agent owns itself: its loop submits actions as autopilot
        // under its own id.
        let agent = Agent::new(agent_id, role, agent_id);
        if let Err(err) = self.registry.register(agent).await {
            let _ = self.driver.disconnect(agent_id, "registration failed").await;
            self.vault.forget(agent_id).await;
            return Err(err);
        }
        let _ = self.registry.update_status(agent_id, AgentStatus::Idle).await;

        if let Err(err) = self.observer.start_observing(agent_id).await {
            let _ = self.registry.unregister(agent_id).await;
            let _ = self.driver.disconnect(agent_id, "observation failed").await;
            self.vault.forget(agent_id).await;
            return Err(err);
        }

        let loop_handle = Arc::new(AutonomyLoop::spawn(
            agent_id,
            self.config.autonomy.clone(),
            LoopDeps {
                observer: Arc::clone(&self.observer),
                planner: Arc::clone(&self.planner),
                admission: Arc::clone(&self.admission),
                registry: Arc::clone(&self.registry),
                experience: Arc::clone(&self.experience),
            },
        ));

        for goal in goals {
            loop_handle.queue_goal(goal).await?;
        }
        {
            let swarm_goals = self.swarm_goals.read().await;
            for goal in swarm_goals.iter() {
                loop_handle.queue_goal(goal.clone()).await?;
            }
        }

        let mut loops = self.loops.write().await;
        loops.insert(agent_id.to_string(), loop_handle);
        info!(agent_id, role = role.as_str(), "agent connected with autonomy");
        Ok(())
    }

    /// Tear an agent down in failure-safe order: loop, observer,
    /// registry, driver, vault. Later steps run even when earlier ones
    /// fail.
    pub async fn disconnect_agent(&self, agent_id: &str, reason: &str) -> SwarmResult<()> {
        let loop_handle = {
            let mut loops = self.loops.write().await;
            loops.remove(agent_id)
        };
        if let Some(loop_handle) = loop_handle {
            loop_handle.stop().await;
        }

        self.observer.stop_observing(agent_id).await;

        if let Err(err) = self.registry.unregister(agent_id).await {
            warn!(agent_id, error = %err, "unregister during disconnect failed");
        }
        if let Err(err) = self.driver.disconnect(agent_id, reason).await {
            warn!(agent_id, error = %err, "driver disconnect failed");
        }
        self.vault.forget(agent_id).await;
        self.planner.invalidate_agent(agent_id).await;
        info!(agent_id, reason, "agent disconnected");
        Ok(())
    }

    /// Reconnect an agent from vaulted credentials with exponential
    /// backoff, then resume observation.
    pub async fn reconnect_agent(self: &Arc<Self>, agent_id: &str) -> SwarmResult<()> {
        let credentials = self
            .vault
            .recall(agent_id)
            .await?
            .ok_or_else(|| SwarmError::Vault(format!("no retained credentials for '{agent_id}'")))?;

        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_millis(250))
            .with_max_elapsed_time(Some(std::time::Duration::from_secs(30)))
            .build();
        let driver = Arc::clone(&self.driver);
        let id = agent_id.to_string();
        backoff::future::retry(policy, || {
            let driver = Arc::clone(&driver);
            let id = id.clone();
            let credentials = credentials.clone();
            async move {
                driver
                    .connect(&id, &credentials)
                    .await
                    .map_err(backoff::Error::transient)
            }
        })
        .await?;

        self.observer.start_observing(agent_id).await?;
        let _ = self.registry.update_status(agent_id, AgentStatus::Idle).await;
        info!(agent_id, "agent reconnected");
        Ok(())
    }

    // ---- swarm-wide operations ----

    /// Queue a goal on every active loop and remember it for agents that
    /// join later.
    pub async fn queue_swarm_goal(
        &self,
        name: &str,
        context: HashMap<String, Value>,
    ) -> SwarmResult<()> {
        if !GoalPlanner::is_known_goal(name) {
            return Err(SwarmError::UnknownGoal(name.to_string()));
        }
        let goal = Goal {
            name: name.to_string(),
            context,
            priority: crate::domain::models::goal::GoalPriority::Normal,
        };
        {
            let mut swarm_goals = self.swarm_goals.write().await;
            swarm_goals.push(goal.clone());
        }
        let loops = self.loops.read().await;
        for loop_handle in loops.values() {
            loop_handle.queue_goal(goal.clone()).await?;
        }
        info!(goal = name, agents = loops.len(), "swarm goal queued");
        Ok(())
    }

    /// Queue a goal for one agent.
    pub async fn queue_goal(&self, agent_id: &str, goal: Goal) -> SwarmResult<()> {
        let loops = self.loops.read().await;
        let loop_handle = loops
            .get(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.to_string()))?;
        loop_handle.queue_goal(goal).await
    }

    /// Fan a task out to specific agents: claim work per agent, queue the
    /// goal, and report aggregate success.
    pub async fn coordinate_task(
        &self,
        agent_ids: &[String],
        task_type: &str,
        params: HashMap<String, Value>,
    ) -> SwarmResult<CoordinationReport> {
        if !GoalPlanner::is_known_goal(task_type) {
            return Err(SwarmError::UnknownGoal(task_type.to_string()));
        }

        let results = futures::future::join_all(agent_ids.iter().map(|agent_id| {
            let params = params.clone();
            async move {
                let work_id = format!("{task_type}:{agent_id}");
                let mut details = params.clone();
                details.insert("taskType".to_string(), Value::String(task_type.to_string()));

                let claim = self.registry.claim_work(&work_id, agent_id, details).await?;
                let goal = Goal {
                    name: task_type.to_string(),
                    context: params,
                    priority: crate::domain::models::goal::GoalPriority::High,
                };
                if let Err(err) = self.queue_goal(agent_id, goal).await {
                    self.registry.release_work(&work_id).await;
                    return Err(err);
                }
                Ok(claim)
            }
        }))
        .await;

        let mut report = CoordinationReport {
            success: true,
            ..CoordinationReport::default()
        };
        for (agent_id, result) in agent_ids.iter().zip(results) {
            match result {
                Ok(claim) => report.claims.push(claim),
                Err(err) => {
                    report.success = false;
                    report.failures.push((agent_id.clone(), err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Stop all loops, disconnect all agents, clear swarm goals and
    /// caches. Idempotent; safe to call twice.
    pub async fn emergency_reset(&self) {
        warn!("emergency reset requested");

        let loops: Vec<Arc<AutonomyLoop>> = {
            let mut map = self.loops.write().await;
            map.drain().map(|(_, handle)| handle).collect()
        };
        for loop_handle in &loops {
            loop_handle.stop().await;
        }

        self.observer.reset().await;
        self.planner.clear_cache().await;
        self.swarm_goals.write().await.clear();

        for agent in self.registry.list_agents().await {
            if let Err(err) = self.driver.disconnect(&agent.id, "emergency reset").await {
                warn!(agent_id = %agent.id, error = %err, "disconnect during reset failed");
            }
        }
        self.registry.clear().await;
        self.vault.clear().await;
        info!(stopped_loops = loops.len(), "emergency reset complete");
    }

    /// Aggregate operator view.
    pub async fn swarm_status(&self) -> SwarmStatus {
        let loops = self.loops.read().await;
        let mut loop_states = HashMap::new();
        for (agent_id, handle) in loops.iter() {
            loop_states.insert(agent_id.clone(), handle.state().await);
        }
        SwarmStatus {
            registry: self.registry.stats().await,
            router: self.admission.router().metrics(),
            loops: loop_states,
            swarm_goals: self
                .swarm_goals
                .read()
                .await
                .iter()
                .map(|g| g.name.clone())
                .collect(),
            experiences: self.experience.len().await,
        }
    }

    /// Loop state for one agent, if it has a loop.
    pub async fn loop_state(&self, agent_id: &str) -> Option<LoopState> {
        let loops = self.loops.read().await;
        match loops.get(agent_id) {
            Some(handle) => Some(handle.state().await),
            None => None,
        }
    }

    /// ODVA history for one agent.
    pub async fn agent_history(
        &self,
        agent_id: &str,
        n: usize,
    ) -> Vec<crate::services::autonomy_loop::HistoryEntry> {
        let loops = self.loops.read().await;
        match loops.get(agent_id) {
            Some(handle) => handle.history(n).await,
            None => Vec::new(),
        }
    }

    /// Full shutdown: reset the swarm and stop the event pump.
    pub async fn shutdown(&self) {
        self.emergency_reset().await;
        let pump = self
            .event_pump
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}
