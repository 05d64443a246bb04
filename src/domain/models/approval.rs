//! Approval tickets for dangerous tasks.
//!
//! Ticket states form a DAG: pending → {approved, rejected}. Terminal
//! tickets are immutable; repeat transitions fail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::action::Action;

/// Lifecycle state of an approval ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A first-class record tracking one held dangerous task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    /// Opaque token handed to the requester.
    pub token: String,
    /// The held action, dispatched on approval.
    pub task: Action,
    pub requester: String,
    pub requested_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    pub approver: Option<String>,
    pub reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalTicket {
    pub fn new(task: Action, requester: impl Into<String>) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            task,
            requester: requester.into(),
            requested_at: Utc::now(),
            status: ApprovalStatus::Pending,
            approver: None,
            reason: None,
            resolved_at: None,
        }
    }

    /// Transition pending → approved. Fails once terminal.
    pub fn approve(&mut self, approver: impl Into<String>) -> SwarmResult<()> {
        self.transition(ApprovalStatus::Approved, approver.into(), None)
    }

    /// Transition pending → rejected. Fails once terminal.
    pub fn reject(&mut self, approver: impl Into<String>, reason: impl Into<String>) -> SwarmResult<()> {
        self.transition(ApprovalStatus::Rejected, approver.into(), Some(reason.into()))
    }

    fn transition(&mut self, to: ApprovalStatus, approver: String, reason: Option<String>) -> SwarmResult<()> {
        if self.status.is_terminal() {
            return Err(SwarmError::TicketAlreadyResolved {
                token: self.token.clone(),
                status: self.status.as_str().to_string(),
            });
        }
        self.status = to;
        self.approver = Some(approver);
        self.reason = reason;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::ActionType;
    use serde_json::json;

    fn ticket() -> ApprovalTicket {
        let action = Action::new(
            ActionType::PlaceBlock,
            "a",
            json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "tnt"}),
        );
        ApprovalTicket::new(action, "user-1")
    }

    #[test]
    fn test_approve_then_approve_fails() {
        let mut t = ticket();
        t.approve("admin").unwrap();
        assert_eq!(t.status, ApprovalStatus::Approved);
        let err = t.approve("admin").unwrap_err();
        assert!(matches!(err, SwarmError::TicketAlreadyResolved { .. }));
    }

    #[test]
    fn test_reject_records_reason() {
        let mut t = ticket();
        t.reject("admin", "not near base").unwrap();
        assert_eq!(t.status, ApprovalStatus::Rejected);
        assert_eq!(t.reason.as_deref(), Some("not near base"));
        assert!(t.resolved_at.is_some());
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(ticket().token, ticket().token);
    }
}
