//! Admission host: policy-gated execution.
//!
//! Composes the policy engine and the action router. The per-agent
//! concurrency counter is incremented before dispatch and decremented on
//! every exit path, so increments and decrements always balance.
//! Dangerous tasks from non-admin callers become approval tickets instead
//! of dispatching; an admin approval executes the held task as autopilot.

use std::sync::Arc;

use tracing::info;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::{Action, Role};
use crate::domain::models::approval::ApprovalTicket;
use crate::services::action_router::{ActionOutcome, ActionRouter};
use crate::services::policy_engine::{PolicyContext, PolicyEngine, PolicyReport};

/// What happened to an admitted task.
#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// The task ran; here is its result.
    Executed(Box<ActionOutcome>),
    /// The task is held pending approval.
    PendingApproval(ApprovalTicket),
}

impl AdmissionOutcome {
    pub fn outcome(&self) -> Option<&ActionOutcome> {
        match self {
            Self::Executed(outcome) => Some(outcome),
            Self::PendingApproval(_) => None,
        }
    }

    pub fn ticket(&self) -> Option<&ApprovalTicket> {
        match self {
            Self::Executed(_) => None,
            Self::PendingApproval(ticket) => Some(ticket),
        }
    }
}

/// Wraps the router with policy enforcement and the approval workflow.
pub struct AdmissionHost {
    policy: Arc<PolicyEngine>,
    router: Arc<ActionRouter>,
}

impl AdmissionHost {
    pub fn new(policy: Arc<PolicyEngine>, router: Arc<ActionRouter>) -> Self {
        Self { policy, router }
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn router(&self) -> &Arc<ActionRouter> {
        &self.router
    }

    /// Validate policy, then dispatch. An invalid report means the router
    /// is never called. Dangerous tasks needing approval return a ticket.
    pub async fn execute_task(
        &self,
        action: &Action,
        ctx: &PolicyContext,
    ) -> SwarmResult<AdmissionOutcome> {
        let report = self.policy.validate_task_policy(action, ctx).await;

        // Hold for approval only when the danger gate is the sole
        // blocker; other gate failures stay plain rejections.
        if report.requires_approval && report.errors.len() == 1 {
            let ticket = self
                .policy
                .request_approval(action.clone(), &ctx.user_id)
                .await;
            info!(
                token = %ticket.token,
                agent_id = %action.agent_id,
                action = action.action_type.as_str(),
                "dangerous task held for approval"
            );
            return Ok(AdmissionOutcome::PendingApproval(ticket));
        }

        if !report.valid {
            return Err(policy_rejection(&report));
        }

        // Policy cleared a dangerous action (admin, or previously
        // approved); stamp the clearance so the router's gate agrees.
        let mut task = action.clone();
        if task.action_type.handles_blocks() && !report.warnings.is_empty() {
            task.approved = true;
        }

        // The slot's drop balances the counter on every path: success,
        // router rejection, and cancellation mid-dispatch.
        let slot = self.policy.acquire_active(&task.agent_id).await;
        let result = self.router.route_task(&task).await;
        drop(slot);

        result.map(|outcome| AdmissionOutcome::Executed(Box::new(outcome)))
    }

    /// Approve a held dangerous task and execute it as autopilot.
    pub async fn approve_dangerous_task(
        &self,
        token: &str,
        approver_id: &str,
        approver_role: Role,
    ) -> SwarmResult<AdmissionOutcome> {
        let task = self
            .policy
            .approve_task(token, approver_id, approver_role)
            .await?;
        let ctx = PolicyContext::new(task.agent_id.clone(), Role::Autopilot);
        info!(token, approver = approver_id, "approved task executing");
        self.execute_task(&task, &ctx).await
    }

    /// Reject a held dangerous task.
    pub async fn reject_dangerous_task(
        &self,
        token: &str,
        approver_id: &str,
        approver_role: Role,
        reason: &str,
    ) -> SwarmResult<()> {
        self.policy
            .reject_task(token, approver_id, approver_role, reason)
            .await
    }
}

fn policy_rejection(report: &PolicyReport) -> SwarmError {
    SwarmError::Policy(report.errors.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::ActionType;
    use crate::domain::models::config::{PolicyConfig, RouterConfig, WorldBounds};
    use crate::infrastructure::drivers::SimDriver;
    use serde_json::json;

    fn host(driver: Arc<SimDriver>) -> AdmissionHost {
        let policy = Arc::new(PolicyEngine::new(PolicyConfig::default()));
        let router = Arc::new(ActionRouter::new(
            driver,
            RouterConfig::default(),
            WorldBounds::default(),
        ));
        AdmissionHost::new(policy, router)
    }

    #[tokio::test]
    async fn test_policy_rejection_never_reaches_router() {
        let driver = Arc::new(SimDriver::new());
        let host = host(driver);
        let action = Action::new(ActionType::Chat, "bot-1", json!({"message": "hi"}));
        let ctx = PolicyContext::new("v", Role::Viewer);

        let err = host.execute_task(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, SwarmError::Policy(_)));
        assert_eq!(host.router().metrics().total, 0);
    }

    #[tokio::test]
    async fn test_counter_balances_after_execution() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("root-bot").await;
        let host = host(driver);
        let ctx = PolicyContext::new("root", Role::Admin);

        let ok = Action::new(ActionType::Chat, "root-bot", json!({"message": "hi"}));
        host.execute_task(&ok, &ctx).await.unwrap();
        assert_eq!(host.policy().active_count("root-bot").await, 0);

        // Router-level rejection also balances.
        let invalid = Action::new(ActionType::MoveTo, "root-bot", json!({}));
        let _ = host.execute_task(&invalid, &ctx).await;
        assert_eq!(host.policy().active_count("root-bot").await, 0);
    }

    #[tokio::test]
    async fn test_dangerous_autopilot_gets_ticket_then_approval_executes() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("a1-bot").await;
        let host = host(driver);
        let action = Action::new(
            ActionType::PlaceBlock,
            "a1-bot",
            json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "tnt"}),
        );
        let ctx = PolicyContext::new("a1", Role::Autopilot);

        let held = host.execute_task(&action, &ctx).await.unwrap();
        let ticket = held.ticket().expect("expected a ticket").clone();
        assert_eq!(host.router().metrics().total, 0);

        let outcome = host
            .approve_dangerous_task(&ticket.token, "root", Role::Admin)
            .await
            .unwrap();
        assert!(outcome.outcome().unwrap().success);

        // Approval is idempotent-once-terminal.
        let err = host
            .approve_dangerous_task(&ticket.token, "root", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::TicketAlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn test_dangerous_admin_executes_with_warning() {
        let driver = Arc::new(SimDriver::new());
        driver.connect_for_test("bot").await;
        let host = host(driver);
        let action = Action::new(
            ActionType::PlaceBlock,
            "bot",
            json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "tnt"}),
        );
        let ctx = PolicyContext::new("root", Role::Admin);

        let report = host.policy().validate_task_policy(&action, &ctx).await;
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Dangerous action: tnt"]);

        let outcome = host.execute_task(&action, &ctx).await.unwrap();
        assert!(outcome.outcome().unwrap().success);
    }
}
