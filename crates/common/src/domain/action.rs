use crate::domain::action_kind::ActionKind;
use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a dispatched command: `Requested` until a correlated
/// response arrives, then `Complete` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Requested,
    Complete,
    Error,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Requested => "requested",
            ActionStatus::Complete => "complete",
            ActionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(ActionStatus::Requested),
            "complete" => Ok(ActionStatus::Complete),
            "error" => Ok(ActionStatus::Error),
            other => Err(DomainError::ValidationError(format!(
                "unknown action status: {}",
                other
            ))),
        }
    }
}

/// Audit record of one dispatched command
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: i64,
    pub organization_id: String,
    pub device_id: String,
    pub action_id: String,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateActionRepoInput {
    pub organization_id: String,
    pub device_id: String,
    pub action_id: String,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub message: String,
}

/// Terminal update keyed by correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateActionRepoInput {
    pub action_id: String,
    pub status: ActionStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListActionsRepoInput {
    pub organization_id: String,
    pub device_id: String,
}

/// Repository trait for the action log
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActionRepository: Send + Sync {
    async fn create_action(&self, input: CreateActionRepoInput) -> DomainResult<Action>;

    /// Overwrite status and message; returns false when no action has the id
    async fn update_action(&self, input: UpdateActionRepoInput) -> DomainResult<bool>;

    /// Actions of a device ordered by creation time
    async fn list_actions(&self, input: ListActionsRepoInput) -> DomainResult<Vec<Action>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ActionStatus::Requested,
            ActionStatus::Complete,
            ActionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ActionStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ActionStatus>().is_err());
    }
}
