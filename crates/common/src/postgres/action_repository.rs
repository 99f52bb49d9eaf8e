use crate::domain::{
    Action, ActionRepository, CreateActionRepoInput, DomainError, DomainResult,
    ListActionsRepoInput, UpdateActionRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info};

const ACTION_COLUMNS: &str =
    "id, organization_id, device_id, action_id, action, status, message, created_at, modified_at";

/// Action row as stored; kind and status are kept as text
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub id: i64,
    pub organization_id: String,
    pub device_id: String,
    pub action_id: String,
    pub action: String,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<&Row> for ActionRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get(0),
            organization_id: row.get(1),
            device_id: row.get(2),
            action_id: row.get(3),
            action: row.get(4),
            status: row.get(5),
            message: row.get(6),
            created_at: row.get(7),
            modified_at: row.get(8),
        }
    }
}

impl TryFrom<ActionRow> for Action {
    type Error = DomainError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let action = row.action.parse().map_err(|_| {
            DomainError::RepositoryError(anyhow::anyhow!(
                "stored action {} has unknown kind {}",
                row.action_id,
                row.action
            ))
        })?;
        let status = row.status.parse().map_err(|_| {
            DomainError::RepositoryError(anyhow::anyhow!(
                "stored action {} has unknown status {}",
                row.action_id,
                row.status
            ))
        })?;

        Ok(Action {
            id: row.id,
            organization_id: row.organization_id,
            device_id: row.device_id,
            action_id: row.action_id,
            action,
            status,
            message: row.message,
            created_at: row.created_at,
            modified_at: row.modified_at,
        })
    }
}

#[derive(Clone)]
pub struct PostgresActionRepository {
    client: PostgresClient,
}

impl PostgresActionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionRepository for PostgresActionRepository {
    async fn create_action(&self, input: CreateActionRepoInput) -> DomainResult<Action> {
        debug!(action_id = %input.action_id, action = %input.action, "Logging action");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO device_action (organization_id, device_id, action_id, action, status, message)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            ACTION_COLUMNS
        );

        let row = conn
            .query_one(
                &query,
                &[
                    &input.organization_id,
                    &input.device_id,
                    &input.action_id,
                    &input.action.as_str(),
                    &input.status.as_str(),
                    &input.message,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        ActionRow::from(&row).try_into()
    }

    async fn update_action(&self, input: UpdateActionRepoInput) -> DomainResult<bool> {
        debug!(action_id = %input.action_id, status = %input.status, "Updating action");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "UPDATE device_action SET status = $1, message = $2, modified_at = now()
                 WHERE action_id = $3",
                &[&input.status.as_str(), &input.message, &input.action_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected > 0 {
            info!(action_id = %input.action_id, status = %input.status, "Action updated");
        }
        Ok(rows_affected > 0)
    }

    async fn list_actions(&self, input: ListActionsRepoInput) -> DomainResult<Vec<Action>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device_action
             WHERE organization_id = $1 AND device_id = $2
             ORDER BY created_at, id",
            ACTION_COLUMNS
        );

        let rows = conn
            .query(&query, &[&input.organization_id, &input.device_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter()
            .map(|row| ActionRow::from(row).try_into())
            .collect()
    }
}
