//! End-to-end swarm scenarios over the simulated driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hivemind::domain::models::action::ActionType;
use hivemind::domain::models::agent::{AgentRole, AgentStatus, BlockPos, Position};
use hivemind::domain::models::config::SwarmConfig;
use hivemind::domain::models::goal::Goal;
use hivemind::domain::ports::client_driver::{ClientDriver, ConnectCredentials};
use hivemind::infrastructure::drivers::SimDriver;
use hivemind::services::orchestrator::Orchestrator;

fn fast_config() -> SwarmConfig {
    let mut config = SwarmConfig::default();
    config.observer.update_interval_ms = 100;
    config.observer.block_scan_radius = 12;
    config.autonomy.interval_ms = 50;
    config.autonomy.stale_after_ms = 60_000;
    config
}

fn creds(agent_id: &str) -> ConnectCredentials {
    ConnectCredentials::new(agent_id, "sim", 0)
}

/// Poll until `check` passes or the deadline expires.
async fn wait_for<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    loop {
        if check().await {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn safe_mine_runs_odva_to_completion() {
    let driver = Arc::new(SimDriver::new());
    let coal = BlockPos::new(10, 64, 0);
    driver.set_block("miner-1", coal, "coal_ore").await;
    driver.set_position("miner-1", Position::new(0.0, 64.0, 0.0)).await;

    let orchestrator = Orchestrator::new(driver.clone(), fast_config());
    orchestrator
        .connect_agent_with_autonomy("miner-1", AgentRole::Miner, creds("miner-1"), vec![])
        .await
        .unwrap();

    orchestrator
        .queue_goal("miner-1", Goal::new("mine_coal"))
        .await
        .unwrap();

    let completed = wait_for(Duration::from_secs(5), || async {
        orchestrator.agent_history("miner-1", 10).await.len() >= 2
    })
    .await;
    assert!(completed, "mine_coal plan did not finish in time");

    let history = orchestrator.agent_history("miner-1", 10).await;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.success));
    assert_eq!(history[0].action, Some(ActionType::MoveTo));
    assert_eq!(history[1].action, Some(ActionType::MineBlock));
    assert_eq!(history[0].goal.as_deref(), Some("mine_coal"));

    // The block is gone and the outcome is remembered.
    assert!(driver.block_at("miner-1", coal).await.unwrap().is_none());
    let experiences = orchestrator.experience().recent("miner-1", 10).await;
    assert_eq!(experiences.len(), 2);
    assert!(experiences.iter().all(|e| e.success));

    // The agent settles back to idle.
    let idle = wait_for(Duration::from_secs(2), || async {
        orchestrator
            .registry()
            .agent("miner-1")
            .await
            .is_some_and(|agent| agent.status == AgentStatus::Idle)
    })
    .await;
    assert!(idle, "agent did not return to idle");

    let agent = orchestrator.registry().agent("miner-1").await.unwrap();
    assert_eq!(agent.metrics.goals_completed, 1);
    assert_eq!(agent.metrics.actions_executed, 2);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn driver_failure_aborts_plan_but_not_loop() {
    let driver = Arc::new(SimDriver::new());
    driver.set_block("miner-1", BlockPos::new(5, 64, 0), "coal_ore").await;

    let orchestrator = Orchestrator::new(driver.clone(), fast_config());
    orchestrator
        .connect_agent_with_autonomy("miner-1", AgentRole::Miner, creds("miner-1"), vec![])
        .await
        .unwrap();

    driver.fail_next("move_to", "pathfinding blocked").await;
    orchestrator
        .queue_goal("miner-1", Goal::new("mine_coal"))
        .await
        .unwrap();

    let failed = wait_for(Duration::from_secs(5), || async {
        orchestrator
            .agent_history("miner-1", 10)
            .await
            .iter()
            .any(|entry| !entry.success)
    })
    .await;
    assert!(failed, "driver failure was not recorded");

    // The loop keeps running and completes the next goal.
    orchestrator
        .queue_goal("miner-1", Goal::new("idle"))
        .await
        .unwrap();
    let recovered = wait_for(Duration::from_secs(5), || async {
        orchestrator
            .agent_history("miner-1", 10)
            .await
            .iter()
            .any(|entry| entry.goal.as_deref() == Some("idle") && entry.success)
    })
    .await;
    assert!(recovered, "loop did not recover after plan abort");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn swarm_goal_reaches_current_and_future_agents() {
    let driver = Arc::new(SimDriver::new());
    let orchestrator = Orchestrator::new(driver.clone(), fast_config());

    orchestrator
        .connect_agent_with_autonomy("swarm-1", AgentRole::Explorer, creds("swarm-1"), vec![])
        .await
        .unwrap();

    orchestrator
        .queue_swarm_goal("idle", HashMap::new())
        .await
        .unwrap();

    // A later agent inherits the standing swarm goal.
    orchestrator
        .connect_agent_with_autonomy("swarm-2", AgentRole::Guard, creds("swarm-2"), vec![])
        .await
        .unwrap();

    for agent_id in ["swarm-1", "swarm-2"] {
        let done = wait_for(Duration::from_secs(5), || async {
            orchestrator
                .agent_history(agent_id, 10)
                .await
                .iter()
                .any(|entry| entry.goal.as_deref() == Some("idle") && entry.success)
        })
        .await;
        assert!(done, "{agent_id} never executed the swarm goal");
    }

    let status = orchestrator.swarm_status().await;
    assert_eq!(status.swarm_goals, vec!["idle".to_string()]);
    assert_eq!(status.registry.total_agents, 2);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn coordinate_task_fans_out_claims() {
    let driver = Arc::new(SimDriver::new());
    let orchestrator = Orchestrator::new(driver.clone(), fast_config());

    for agent_id in ["c-1", "c-2"] {
        orchestrator
            .connect_agent_with_autonomy(agent_id, AgentRole::Courier, creds(agent_id), vec![])
            .await
            .unwrap();
    }

    let report = orchestrator
        .coordinate_task(
            &["c-1".to_string(), "c-2".to_string()],
            "idle",
            HashMap::new(),
        )
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.claims.len(), 2);

    let claim = orchestrator.registry().claim("idle:c-1").await.unwrap();
    assert_eq!(claim.agent_id, "c-1");

    // Unknown goals are rejected before any claims happen.
    let err = orchestrator
        .coordinate_task(&["c-1".to_string()], "conquer_world", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, hivemind::SwarmError::UnknownGoal(_)));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn emergency_reset_is_idempotent() {
    let driver = Arc::new(SimDriver::new());
    let orchestrator = Orchestrator::new(driver.clone(), fast_config());

    orchestrator
        .connect_agent_with_autonomy("r-1", AgentRole::Miner, creds("r-1"), vec![Goal::new("idle")])
        .await
        .unwrap();
    orchestrator
        .queue_swarm_goal("idle", HashMap::new())
        .await
        .unwrap();

    orchestrator.emergency_reset().await;

    let status = orchestrator.swarm_status().await;
    assert_eq!(status.registry.total_agents, 0);
    assert!(status.loops.is_empty());
    assert!(status.swarm_goals.is_empty());
    assert!(!driver.is_connected("r-1").await);

    // Second reset is a no-op.
    orchestrator.emergency_reset().await;

    // The orchestrator still accepts new agents afterwards.
    orchestrator
        .connect_agent_with_autonomy("r-2", AgentRole::Miner, creds("r-2"), vec![])
        .await
        .unwrap();
    assert_eq!(orchestrator.swarm_status().await.registry.total_agents, 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn reconnect_uses_vaulted_credentials() {
    let driver = Arc::new(SimDriver::new());
    let orchestrator = Orchestrator::new(driver.clone(), fast_config());

    orchestrator
        .connect_agent_with_autonomy("re-1", AgentRole::Explorer, creds("re-1"), vec![])
        .await
        .unwrap();

    // Simulate a transport drop.
    driver.disconnect("re-1", "connection reset").await.unwrap();
    assert!(!driver.is_connected("re-1").await);

    orchestrator.reconnect_agent("re-1").await.unwrap();
    assert!(driver.is_connected("re-1").await);

    // After a full disconnect the vault entry is gone.
    orchestrator.disconnect_agent("re-1", "done").await.unwrap();
    let err = orchestrator.reconnect_agent("re-1").await.unwrap_err();
    assert!(matches!(err, hivemind::SwarmError::Vault(_)));

    orchestrator.shutdown().await;
}
