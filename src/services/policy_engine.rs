//! Policy engine: the safety gates every action passes before dispatch.
//!
//! Five gates run in order: role capability, task-type allow-list, bot
//! access, fixed-window rate limit, per-agent concurrency. A separate
//! danger check covers blacklisted block types and feeds the approval
//! workflow. Gate failures are reported as data; this engine never
//! returns an error for a policy decision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::{Action, Role};
use crate::domain::models::approval::{ApprovalStatus, ApprovalTicket};
use crate::domain::models::config::PolicyConfig;

/// Caller identity attached to every policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyContext {
    pub user_id: String,
    pub role: Role,
}

impl PolicyContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Rate gate outcome for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Concurrency gate outcome for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyStatus {
    pub active: u32,
    pub limit: u32,
    pub allowed: bool,
}

/// Structured report from `validate_task_policy`.
#[derive(Debug, Clone, Default)]
pub struct PolicyReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub rate_limit: Option<RateLimitStatus>,
    pub concurrency: Option<ConcurrencyStatus>,
    /// Set when the only path forward is the approval workflow.
    pub requires_approval: bool,
}

/// One fixed rate window for a (user, role) pair.
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Action types a viewer may submit.
const READ_ONLY_ACTIONS: &[&str] = &["get_inventory"];

/// RAII slot on an agent's concurrency counter.
pub struct ActiveSlot {
    counter: Arc<AtomicU32>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let _ = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
    }
}

/// Role/rate/concurrency/danger enforcement with an in-memory approval
/// queue.
pub struct PolicyEngine {
    config: PolicyConfig,
    rate_window: Duration,
    buckets: RwLock<HashMap<(String, Role), RateBucket>>,
    active: RwLock<HashMap<String, Arc<AtomicU32>>>,
    tickets: RwLock<HashMap<String, ApprovalTicket>>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            rate_window: Duration::seconds(60),
            buckets: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// Override the fixed rate window. Test hook; production keeps 60 s.
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Run all gates for one action. Never fails for policy reasons; the
    /// decision is the report.
    pub async fn validate_task_policy(&self, action: &Action, ctx: &PolicyContext) -> PolicyReport {
        let mut report = PolicyReport {
            valid: true,
            ..PolicyReport::default()
        };
        let action_name = action.action_type.as_str();

        // Gate 1: role capability. Viewers read, nothing else.
        if ctx.role == Role::Viewer && !READ_ONLY_ACTIONS.contains(&action_name) {
            report
                .errors
                .push(format!("role 'viewer' is read-only; '{action_name}' denied"));
        }

        // Gate 2: per-role task-type allow-list.
        match self.config.allowed_actions.get(ctx.role.as_str()) {
            Some(allowed)
                if allowed.iter().any(|a| a == "*" || a == action_name) => {}
            Some(_) => report
                .errors
                .push(format!("'{action_name}' not in allow-list for role '{}'", ctx.role.as_str())),
            None => report
                .errors
                .push(format!("no allow-list configured for role '{}'", ctx.role.as_str())),
        }

        // Gate 3: bot access. Admin sees all; autopilot only its own
        // prefix; viewer reads are unrestricted.
        if ctx.role == Role::Autopilot && !action.agent_id.starts_with(ctx.user_id.as_str()) {
            report.errors.push(format!(
                "user '{}' may not control agent '{}'",
                ctx.user_id, action.agent_id
            ));
        }

        // Gate 4: rate limit. Only counts requests that passed the
        // identity gates.
        if report.errors.is_empty() {
            let rate = self.check_rate_limit(&ctx.user_id, ctx.role).await;
            if !rate.allowed {
                report.errors.push(format!(
                    "rate limit exceeded for '{}'; window resets at {}",
                    ctx.user_id, rate.reset_at
                ));
            }
            report.rate_limit = Some(rate);
        }

        // Gate 5: per-agent concurrency.
        let concurrency = self.concurrency_status(&action.agent_id).await;
        if !concurrency.allowed {
            report.errors.push(format!(
                "agent '{}' already has {} active tasks (limit {})",
                action.agent_id, concurrency.active, concurrency.limit
            ));
        }
        report.concurrency = Some(concurrency);

        // Danger check: blacklisted block types.
        if action.action_type.handles_blocks() {
            if let Some(block_type) = action.block_type() {
                if self.config.is_dangerous_block(block_type) {
                    if ctx.role == Role::Admin || action.approved {
                        report.warnings.push(format!("Dangerous action: {block_type}"));
                    } else {
                        report
                            .errors
                            .push(format!("dangerous block '{block_type}' requires approval"));
                        report.requires_approval = true;
                    }
                }
            }
        }

        report.valid = report.errors.is_empty();
        if report.valid {
            debug!(
                action = action_name,
                agent_id = %action.agent_id,
                user = %ctx.user_id,
                role = ctx.role.as_str(),
                warnings = report.warnings.len(),
                "policy check passed"
            );
        } else {
            warn!(
                action = action_name,
                agent_id = %action.agent_id,
                user = %ctx.user_id,
                role = ctx.role.as_str(),
                errors = ?report.errors,
                "policy check failed"
            );
        }
        report
    }

    /// Consume one slot in the caller's fixed rate window.
    pub async fn check_rate_limit(&self, user_id: &str, role: Role) -> RateLimitStatus {
        let limit = self.config.requests_per_minute;
        let now = Utc::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry((user_id.to_string(), role))
            .or_insert(RateBucket {
                count: 0,
                reset_at: now + self.rate_window,
            });

        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.rate_window;
        }

        if bucket.count >= limit {
            return RateLimitStatus {
                allowed: false,
                remaining: 0,
                reset_at: bucket.reset_at,
            };
        }

        bucket.count += 1;
        RateLimitStatus {
            allowed: true,
            remaining: limit - bucket.count,
            reset_at: bucket.reset_at,
        }
    }

    async fn concurrency_status(&self, agent_id: &str) -> ConcurrencyStatus {
        let limit = self.config.max_tasks_per_agent;
        let active = self.active_count(agent_id).await;
        ConcurrencyStatus {
            active,
            limit,
            allowed: active < limit,
        }
    }

    /// Current in-flight task count for an agent.
    pub async fn active_count(&self, agent_id: &str) -> u32 {
        let active = self.active.read().await;
        active
            .get(agent_id)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }

    /// Increment the per-agent concurrency counter. Returns the new count.
    pub async fn increment_active(&self, agent_id: &str) -> u32 {
        let counter = {
            let mut active = self.active.write().await;
            Arc::clone(
                active
                    .entry(agent_id.to_string())
                    .or_insert_with(|| Arc::new(AtomicU32::new(0))),
            )
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Increment the per-agent counter and return a guard that
    /// decrements on drop. Balances even when the holder's future is
    /// cancelled mid-dispatch.
    pub async fn acquire_active(&self, agent_id: &str) -> ActiveSlot {
        let counter = {
            let mut active = self.active.write().await;
            Arc::clone(
                active
                    .entry(agent_id.to_string())
                    .or_insert_with(|| Arc::new(AtomicU32::new(0))),
            )
        };
        counter.fetch_add(1, Ordering::SeqCst);
        ActiveSlot { counter }
    }

    /// Decrement the per-agent concurrency counter (saturating).
    pub async fn decrement_active(&self, agent_id: &str) {
        let active = self.active.read().await;
        if let Some(counter) = active.get(agent_id) {
            let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
        }
    }

    // ---- approval workflow ----

    /// Hold a dangerous action behind a ticket. The ticket stays in
    /// memory until approved or rejected.
    pub async fn request_approval(&self, task: Action, requester: &str) -> ApprovalTicket {
        let ticket = ApprovalTicket::new(task, requester);
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.token.clone(), ticket.clone());
        debug!(token = %ticket.token, requester, "approval requested");
        ticket
    }

    /// Approve a held task. Admin only; idempotence violations surface as
    /// `TicketAlreadyResolved`. Returns the task stamped `approved`.
    pub async fn approve_task(
        &self,
        token: &str,
        approver_id: &str,
        approver_role: Role,
    ) -> SwarmResult<Action> {
        if approver_role != Role::Admin {
            return Err(SwarmError::Policy(format!(
                "role '{}' may not approve tasks",
                approver_role.as_str()
            )));
        }
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(token)
            .ok_or_else(|| SwarmError::TicketNotFound(token.to_string()))?;
        ticket.approve(approver_id)?;
        let mut task = ticket.task.clone();
        task.approved = true;
        debug!(token, approver = approver_id, "task approved");
        Ok(task)
    }

    /// Reject a held task. Admin only.
    pub async fn reject_task(
        &self,
        token: &str,
        approver_id: &str,
        approver_role: Role,
        reason: &str,
    ) -> SwarmResult<()> {
        if approver_role != Role::Admin {
            return Err(SwarmError::Policy(format!(
                "role '{}' may not reject tasks",
                approver_role.as_str()
            )));
        }
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(token)
            .ok_or_else(|| SwarmError::TicketNotFound(token.to_string()))?;
        ticket.reject(approver_id, reason)?;
        debug!(token, approver = approver_id, reason, "task rejected");
        Ok(())
    }

    /// Look up a ticket by token.
    pub async fn ticket(&self, token: &str) -> Option<ApprovalTicket> {
        let tickets = self.tickets.read().await;
        tickets.get(token).cloned()
    }

    /// All tickets still pending.
    pub async fn pending_tickets(&self) -> Vec<ApprovalTicket> {
        let tickets = self.tickets.read().await;
        tickets
            .values()
            .filter(|t| t.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    /// Drop all rate buckets, counters and tickets.
    pub async fn reset(&self) {
        self.buckets.write().await.clear();
        self.active.write().await.clear();
        self.tickets.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::ActionType;
    use serde_json::json;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicyConfig::default())
    }

    fn chat(agent_id: &str) -> Action {
        Action::new(ActionType::Chat, agent_id, json!({"message": "hi"}))
    }

    fn tnt(agent_id: &str) -> Action {
        Action::new(
            ActionType::PlaceBlock,
            agent_id,
            json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "tnt"}),
        )
    }

    #[tokio::test]
    async fn test_viewer_is_read_only() {
        let engine = engine();
        let ctx = PolicyContext::new("v", Role::Viewer);

        let report = engine.validate_task_policy(&chat("any"), &ctx).await;
        assert!(!report.valid);

        let read = Action::new(ActionType::GetInventory, "any", json!({}));
        let report = engine.validate_task_policy(&read, &ctx).await;
        assert!(report.valid, "{:?}", report.errors);
    }

    #[tokio::test]
    async fn test_autopilot_prefix_access() {
        let engine = engine();
        let ctx = PolicyContext::new("alice", Role::Autopilot);

        assert!(engine.validate_task_policy(&chat("alice-1"), &ctx).await.valid);
        assert!(!engine.validate_task_policy(&chat("bob-1"), &ctx).await.valid);

        // admin controls everything
        let admin = PolicyContext::new("root", Role::Admin);
        assert!(engine.validate_task_policy(&chat("bob-1"), &admin).await.valid);
    }

    #[tokio::test]
    async fn test_rate_limit_fixed_window() {
        let config = PolicyConfig {
            requests_per_minute: 3,
            ..PolicyConfig::default()
        };
        let engine = PolicyEngine::new(config).with_rate_window(Duration::milliseconds(200));

        for expected_remaining in [2, 1, 0] {
            let status = engine.check_rate_limit("u", Role::Autopilot).await;
            assert!(status.allowed);
            assert_eq!(status.remaining, expected_remaining);
        }
        let denied = engine.check_rate_limit("u", Role::Autopilot).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        // First request of the next window is always allowed.
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        let status = engine.check_rate_limit("u", Role::Autopilot).await;
        assert!(status.allowed);
        assert_eq!(status.remaining, 2);
    }

    #[tokio::test]
    async fn test_concurrency_gate() {
        let config = PolicyConfig {
            max_tasks_per_agent: 2,
            ..PolicyConfig::default()
        };
        let engine = PolicyEngine::new(config);
        let ctx = PolicyContext::new("root", Role::Admin);

        engine.increment_active("a1").await;
        engine.increment_active("a1").await;
        let report = engine.validate_task_policy(&chat("a1"), &ctx).await;
        assert!(!report.valid);
        assert!(!report.concurrency.unwrap().allowed);

        engine.decrement_active("a1").await;
        let report = engine.validate_task_policy(&chat("a1"), &ctx).await;
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_decrement_saturates_at_zero() {
        let engine = engine();
        engine.decrement_active("ghost").await;
        assert_eq!(engine.active_count("ghost").await, 0);
    }

    #[tokio::test]
    async fn test_danger_check_admin_warns() {
        let engine = engine();
        let ctx = PolicyContext::new("root", Role::Admin);
        let report = engine.validate_task_policy(&tnt("a1"), &ctx).await;
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Dangerous action: tnt"]);
    }

    #[tokio::test]
    async fn test_danger_check_autopilot_needs_approval() {
        let engine = engine();
        let ctx = PolicyContext::new("a1", Role::Autopilot);
        let report = engine.validate_task_policy(&tnt("a1-bot"), &ctx).await;
        assert!(!report.valid);
        assert!(report.requires_approval);

        // Pre-approved action passes with a warning.
        let report = engine
            .validate_task_policy(&tnt("a1-bot").approved(), &ctx)
            .await;
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_approval_lifecycle() {
        let engine = engine();
        let ticket = engine.request_approval(tnt("a1"), "a1").await;
        assert_eq!(ticket.status, ApprovalStatus::Pending);

        // Non-admin cannot approve.
        let err = engine
            .approve_task(&ticket.token, "a1", Role::Autopilot)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Policy(_)));

        let task = engine
            .approve_task(&ticket.token, "root", Role::Admin)
            .await
            .unwrap();
        assert!(task.approved);

        // Second approval fails: terminal tickets are immutable.
        let err = engine
            .approve_task(&ticket.token, "root", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::TicketAlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn test_unknown_ticket() {
        let engine = engine();
        let err = engine
            .approve_task("nope", "root", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::TicketNotFound(_)));
    }
}
