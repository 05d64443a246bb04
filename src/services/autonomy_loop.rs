//! Autonomy loop: the per-agent Observe-Decide-Validate-Act ticker.
//!
//! Each agent gets one ticker task. Per tick: read the latest snapshot
//! (skip when stale), pop a goal and plan when no plan is in progress,
//! validate and dispatch the next action, and record the outcome. Goal
//! queue and history are owned by the ticker; `queue_goal` reaches it
//! through a command channel. Stopping cancels the in-flight action and
//! ends the ticker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::{Action, ActionType, Role};
use crate::domain::models::agent::AgentStatus;
use crate::domain::models::config::AutonomyConfig;
use crate::domain::models::experience::ExperienceDraft;
use crate::domain::models::goal::Goal;
use crate::domain::models::plan::Plan;
use crate::services::action_schema;
use crate::services::admission::{AdmissionHost, AdmissionOutcome};
use crate::services::agent_registry::AgentRegistry;
use crate::services::experience_buffer::ExperienceBuffer;
use crate::services::goal_planner::GoalPlanner;
use crate::services::policy_engine::PolicyContext;
use crate::services::world_observer::WorldObserver;

/// Loop state machine: Idle → Planning → Acting → Idle, with Paused and
/// Stopping branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Planning,
    Acting,
    Paused,
    Stopping,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Acting => "acting",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

/// One recorded ODVA outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub goal: Option<String>,
    pub action: Option<ActionType>,
    pub success: bool,
    pub detail: String,
}

enum LoopCommand {
    QueueGoal(Goal),
    Pause,
    Resume,
}

/// Services the ticker needs.
#[derive(Clone)]
pub struct LoopDeps {
    pub observer: Arc<WorldObserver>,
    pub planner: Arc<GoalPlanner>,
    pub admission: Arc<AdmissionHost>,
    pub registry: Arc<AgentRegistry>,
    pub experience: Arc<ExperienceBuffer>,
}

/// Handle to one agent's running loop.
pub struct AutonomyLoop {
    agent_id: String,
    commands: mpsc::Sender<LoopCommand>,
    shutdown: watch::Sender<bool>,
    state: Arc<RwLock<LoopState>>,
    history: Arc<RwLock<VecDeque<HistoryEntry>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutonomyLoop {
    /// Spawn a ticker for one agent.
    pub fn spawn(agent_id: impl Into<String>, config: AutonomyConfig, deps: LoopDeps) -> Self {
        let agent_id = agent_id.into();
        let (command_tx, command_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(LoopState::Idle));
        let history = Arc::new(RwLock::new(VecDeque::new()));

        let ticker = Ticker {
            agent_id: agent_id.clone(),
            config,
            deps,
            queue: Vec::new(),
            plan: None,
            paused: false,
            halted: false,
            state: Arc::clone(&state),
            history: Arc::clone(&history),
        };
        let task = tokio::spawn(ticker.run(command_rx, shutdown_rx));

        Self {
            agent_id,
            commands: command_tx,
            shutdown: shutdown_tx,
            state,
            history,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Append a goal to the agent's queue.
    pub async fn queue_goal(&self, goal: Goal) -> SwarmResult<()> {
        self.commands
            .send(LoopCommand::QueueGoal(goal))
            .await
            .map_err(|_| SwarmError::Fatal(format!("loop for '{}' is gone", self.agent_id)))
    }

    pub async fn pause(&self) -> SwarmResult<()> {
        self.commands
            .send(LoopCommand::Pause)
            .await
            .map_err(|_| SwarmError::Fatal(format!("loop for '{}' is gone", self.agent_id)))
    }

    pub async fn resume(&self) -> SwarmResult<()> {
        self.commands
            .send(LoopCommand::Resume)
            .await
            .map_err(|_| SwarmError::Fatal(format!("loop for '{}' is gone", self.agent_id)))
    }

    pub async fn state(&self) -> LoopState {
        *self.state.read().await
    }

    /// Last `n` ODVA outcomes, oldest first.
    pub async fn history(&self, n: usize) -> Vec<HistoryEntry> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }

    /// Cancel the in-flight action and terminate the ticker. Idempotent.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = {
            let mut slot = self.task.lock().await;
            slot.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct PlanProgress {
    plan: Plan,
    cursor: usize,
}

struct Ticker {
    agent_id: String,
    config: AutonomyConfig,
    deps: LoopDeps,
    queue: Vec<Goal>,
    plan: Option<PlanProgress>,
    paused: bool,
    halted: bool,
    state: Arc<RwLock<LoopState>>,
    history: Arc<RwLock<VecDeque<HistoryEntry>>>,
}

impl Ticker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<LoopCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(agent_id = %self.agent_id, "autonomy loop started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = interval.tick() => {
                    if self.paused || self.halted {
                        continue;
                    }
                    // Racing the tick against shutdown cancels the
                    // in-flight action when the loop is stopped.
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = self.tick() => {}
                    }
                }
            }
        }

        self.set_state(LoopState::Stopping).await;
        info!(agent_id = %self.agent_id, "autonomy loop stopped");
    }

    async fn handle_command(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::QueueGoal(goal) => {
                debug!(agent_id = %self.agent_id, goal = %goal.name, "goal queued");
                self.queue.push(goal);
            }
            LoopCommand::Pause => {
                self.paused = true;
                self.set_state(LoopState::Paused).await;
            }
            LoopCommand::Resume => {
                self.paused = false;
                self.set_state(LoopState::Idle).await;
            }
        }
    }

    /// Highest priority first; FIFO within a priority.
    fn pop_goal(&mut self) -> Option<Goal> {
        let best = self
            .queue
            .iter()
            .enumerate()
            .max_by_key(|(i, goal)| (goal.priority, std::cmp::Reverse(*i)))?
            .0;
        Some(self.queue.remove(best))
    }

    async fn tick(&mut self) {
        // Observe
        let Some(snapshot) = self.deps.observer.latest_snapshot(&self.agent_id).await else {
            return;
        };
        let age_ms = self
            .deps
            .observer
            .snapshot_age_ms(&self.agent_id)
            .await
            .unwrap_or(0);
        if age_ms > self.config.stale_after_ms {
            debug!(agent_id = %self.agent_id, age_ms, "snapshot stale, tick skipped");
            return;
        }

        // Decide
        if self.plan.is_none() {
            let Some(goal) = self.pop_goal() else {
                self.set_state(LoopState::Idle).await;
                return;
            };
            self.set_state(LoopState::Planning).await;
            match self
                .deps
                .planner
                .generate(&self.agent_id, &goal, snapshot.as_ref())
                .await
            {
                Ok(outcome) => {
                    let eval = self
                        .deps
                        .planner
                        .evaluate_plan(&outcome.plan, snapshot.as_ref());
                    for warning in eval.warnings.iter().chain(&outcome.warnings) {
                        warn!(agent_id = %self.agent_id, goal = %goal.name, warning = %warning, "plan advisory");
                    }
                    debug!(
                        agent_id = %self.agent_id,
                        goal = %goal.name,
                        actions = outcome.plan.len(),
                        "plan ready"
                    );
                    self.plan = Some(PlanProgress {
                        plan: outcome.plan,
                        cursor: 0,
                    });
                }
                Err(err) => {
                    self.record(Some(goal.name.clone()), None, false, err.to_string())
                        .await;
                    if err.is_fatal() {
                        self.halt().await;
                    }
                    return;
                }
            }
        }

        // Validate + Act: the first not-yet-executed action.
        let Some(progress) = self.plan.as_ref() else {
            return;
        };
        if progress.cursor >= progress.plan.len() {
            self.finish_plan().await;
            return;
        }
        let goal_name = progress.plan.goal_name.clone();
        let action = progress.plan.actions[progress.cursor].clone();

        let report = action_schema::validate_action(&action);
        if !report.valid {
            self.record(
                Some(goal_name),
                Some(action.action_type),
                false,
                format!("validation failed: {}", report.errors.join("; ")),
            )
            .await;
            self.abort_plan().await;
            return;
        }

        self.set_state(LoopState::Acting).await;
        self.apply_action_status(&action).await;

        let ctx = PolicyContext::new(self.agent_id.clone(), Role::Autopilot);
        match self.deps.admission.execute_task(&action, &ctx).await {
            Ok(AdmissionOutcome::Executed(outcome)) => {
                let reward = if outcome.success { 1.0 } else { -1.0 };
                let mut draft = ExperienceDraft::new(
                    &self.agent_id,
                    action.action_type.as_str(),
                    outcome.success,
                    reward,
                )
                .with_metric("duration_ms", outcome.duration_ms as f64);
                if let Some(ref err) = outcome.error {
                    draft = draft.with_note(err.clone());
                }
                self.deps.experience.log(draft).await;
                self.deps
                    .registry
                    .record_action_outcome(&self.agent_id, outcome.success)
                    .await;

                if outcome.success {
                    self.record(Some(goal_name), Some(action.action_type), true, "ok".to_string())
                        .await;
                    let done = match self.plan.as_mut() {
                        Some(progress) => {
                            progress.cursor += 1;
                            progress.cursor >= progress.plan.len()
                        }
                        None => false,
                    };
                    if done {
                        self.finish_plan().await;
                    }
                } else {
                    // Driver failure aborts the plan, not the loop.
                    let detail = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "driver failure".to_string());
                    self.record(Some(goal_name), Some(action.action_type), false, detail)
                        .await;
                    self.abort_plan().await;
                }
            }
            Ok(AdmissionOutcome::PendingApproval(ticket)) => {
                self.record(
                    Some(goal_name),
                    Some(action.action_type),
                    false,
                    format!("held for approval (token {})", ticket.token),
                )
                .await;
                self.abort_plan().await;
            }
            Err(err) => {
                self.deps
                    .experience
                    .log(ExperienceDraft::new(
                        &self.agent_id,
                        action.action_type.as_str(),
                        false,
                        -1.0,
                    ))
                    .await;
                self.record(
                    Some(goal_name),
                    Some(action.action_type),
                    false,
                    err.to_string(),
                )
                .await;
                self.abort_plan().await;
                if err.is_fatal() {
                    self.halt().await;
                }
            }
        }
    }

    /// Reflect the action about to run in the agent's status.
    async fn apply_action_status(&self, action: &Action) {
        let status = match action.action_type {
            ActionType::MoveTo | ActionType::Navigate | ActionType::Follow => AgentStatus::Moving,
            ActionType::MineBlock => AgentStatus::Mining,
            ActionType::PlaceBlock => AgentStatus::Building,
            _ => AgentStatus::Busy,
        };
        let _ = self.deps.registry.update_status(&self.agent_id, status).await;
    }

    async fn finish_plan(&mut self) {
        if let Some(progress) = self.plan.take() {
            debug!(
                agent_id = %self.agent_id,
                goal = %progress.plan.goal_name,
                "goal complete"
            );
            self.deps.registry.record_goal_completed(&self.agent_id).await;
        }
        let _ = self
            .deps
            .registry
            .update_status(&self.agent_id, AgentStatus::Idle)
            .await;
        self.set_state(LoopState::Idle).await;
    }

    async fn abort_plan(&mut self) {
        self.plan = None;
        let _ = self
            .deps
            .registry
            .update_status(&self.agent_id, AgentStatus::Idle)
            .await;
        self.set_state(LoopState::Idle).await;
    }

    /// Fatal error: halt this agent, not the swarm.
    async fn halt(&mut self) {
        error!(agent_id = %self.agent_id, "fatal error, halting agent loop");
        self.halted = true;
        let _ = self
            .deps
            .registry
            .update_status(&self.agent_id, AgentStatus::Error)
            .await;
        self.set_state(LoopState::Stopping).await;
    }

    async fn set_state(&self, state: LoopState) {
        let mut current = self.state.write().await;
        *current = state;
    }

    async fn record(
        &self,
        goal: Option<String>,
        action: Option<ActionType>,
        success: bool,
        detail: String,
    ) {
        let mut history = self.history.write().await;
        if history.len() == self.config.history_limit {
            history.pop_front();
        }
        history.push_back(HistoryEntry {
            timestamp: Utc::now(),
            goal,
            action,
            success,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_names() {
        assert_eq!(LoopState::Idle.as_str(), "idle");
        assert_eq!(LoopState::Stopping.as_str(), "stopping");
    }
}
