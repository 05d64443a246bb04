//! Command-line surface for the hivemind binary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use crate::domain::models::action::Action;
use crate::domain::models::agent::{AgentRole, BlockPos, Position};
use crate::domain::models::config::SwarmConfig;
use crate::domain::models::goal::Goal;
use crate::domain::ports::client_driver::ConnectCredentials;
use crate::infrastructure::drivers::SimDriver;
use crate::services::action_schema;
use crate::services::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "hivemind", version, about = "Swarm controller for autonomous game-client agents")]
pub struct Cli {
    /// Config file path (defaults to the .hivemind/ hierarchy)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default .hivemind/config.yaml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run a simulated swarm until interrupted
    Run {
        /// Number of agents to connect
        #[arg(long, default_value_t = 3)]
        agents: usize,
        /// Swarm goal queued to every agent
        #[arg(long, default_value = "mine_coal")]
        goal: String,
    },
    /// Validate an action JSON document against the schema
    Validate {
        /// Path to the action document
        file: PathBuf,
    },
}

/// Write the default config, refusing to clobber without `--force`.
pub fn handle_init(force: bool) -> Result<()> {
    let dir = std::path::Path::new(".hivemind");
    let path = dir.join("config.yaml");
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::create_dir_all(dir).context("Failed to create .hivemind directory")?;
    let yaml = serde_yaml::to_string(&SwarmConfig::default())
        .context("Failed to serialize default config")?;
    let contents = format!(
        "# hivemind configuration\n# Values here override built-in defaults; \
         .hivemind/local.yaml and HIVEMIND_* env vars override this file.\n{yaml}"
    );
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Validate one action document and print a report.
pub fn handle_validate(file: &PathBuf, config: &SwarmConfig) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let action: Action =
        serde_json::from_str(&raw).context("Document is not a valid action")?;

    let mut report = action_schema::validate_action(&action);
    report.merge(action_schema::validate_action_coordinates(
        &config.world,
        &action,
    ));

    let output = json!({
        "type": action.action_type.as_str(),
        "agent_id": action.agent_id,
        "valid": report.valid,
        "errors": report.errors,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

/// Connect a simulated swarm, queue a goal everywhere, and run until
/// ctrl-c.
pub async fn handle_run(agents: usize, goal_name: &str, config: SwarmConfig) -> Result<()> {
    let driver = Arc::new(SimDriver::new());
    let orchestrator = Orchestrator::new(driver.clone(), config);

    let roles = [
        AgentRole::Miner,
        AgentRole::Explorer,
        AgentRole::Builder,
        AgentRole::Guard,
        AgentRole::Courier,
    ];
    for i in 0..agents {
        let agent_id = format!("swarm-{}", i + 1);
        seed_world(&driver, &agent_id, i).await;
        let credentials = ConnectCredentials::new(&agent_id, "sim", 0);
        orchestrator
            .connect_agent_with_autonomy(
                &agent_id,
                roles[i % roles.len()],
                credentials,
                vec![Goal::new("idle")],
            )
            .await
            .with_context(|| format!("Failed to connect {agent_id}"))?;
    }

    orchestrator
        .queue_swarm_goal(goal_name, HashMap::new())
        .await
        .context("Failed to queue swarm goal")?;
    info!(agents, goal = goal_name, "swarm running; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    let status = orchestrator.swarm_status().await;
    info!(
        agents = status.registry.total_agents,
        actions_total = status.router.total,
        actions_ok = status.router.succeeded,
        experiences = status.experiences,
        "shutting down"
    );
    orchestrator.shutdown().await;
    Ok(())
}

/// Scatter some scannable content around each agent's spawn.
async fn seed_world(driver: &SimDriver, agent_id: &str, index: usize) {
    let offset = i32::try_from(index).unwrap_or(0) * 64;
    driver
        .set_position(agent_id, Position::new(f64::from(offset), 64.0, 0.0))
        .await;
    driver
        .set_block(agent_id, BlockPos::new(offset + 10, 64, 0), "coal_ore")
        .await;
    driver
        .set_block(agent_id, BlockPos::new(offset + 6, 64, 4), "oak_log")
        .await;
    driver
        .set_block(agent_id, BlockPos::new(offset, 63, 0), "stone")
        .await;
}
