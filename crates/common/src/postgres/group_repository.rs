use crate::domain::{
    CreateGroupRepoInput, Device, DomainError, DomainResult, GetGroupRepoInput, Group,
    GroupDeviceRepoInput, GroupRepository,
};
use crate::postgres::{DeviceRow, PostgresClient, DEVICE_COLUMNS};
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, info};

const GROUP_COLUMNS: &str = "id, organization_id, name, created_at, modified_at";

fn group_from_row(row: &Row) -> Group {
    Group {
        id: row.get(0),
        organization_id: row.get(1),
        name: row.get(2),
        created_at: row.get(3),
        modified_at: row.get(4),
    }
}

#[derive(Clone)]
pub struct PostgresGroupRepository {
    client: PostgresClient,
}

impl PostgresGroupRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GroupRepository for PostgresGroupRepository {
    async fn create_group(&self, input: CreateGroupRepoInput) -> DomainResult<Group> {
        debug!(organization_id = %input.organization_id, name = %input.name, "Creating group");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO device_group (organization_id, name) VALUES ($1, $2) RETURNING {}",
            GROUP_COLUMNS
        );

        let row = match conn
            .query_one(&query, &[&input.organization_id, &input.name])
            .await
        {
            Ok(row) => row,
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::GroupAlreadyExists(input.name));
                    }
                }
                return Err(DomainError::RepositoryError(e.into()));
            }
        };

        info!(name = %input.name, "Group created");
        Ok(group_from_row(&row))
    }

    async fn list_groups(&self, organization_id: &str) -> DomainResult<Vec<Group>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device_group WHERE organization_id = $1 ORDER BY name",
            GROUP_COLUMNS
        );

        let rows = conn
            .query(&query, &[&organization_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    async fn get_group(&self, input: GetGroupRepoInput) -> DomainResult<Option<Group>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device_group WHERE organization_id = $1 AND name = $2",
            GROUP_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&input.organization_id, &input.name])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(group_from_row))
    }

    async fn link_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()> {
        debug!(group_id = input.group_id, device_ref = input.device_ref, "Linking device to group");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO group_device_link (organization_id, group_id, device_ref)
             VALUES ($1, $2, $3)
             ON CONFLICT (group_id, device_ref) DO NOTHING",
            &[&input.organization_id, &input.group_id, &input.device_ref],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(())
    }

    async fn unlink_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()> {
        debug!(group_id = input.group_id, device_ref = input.device_ref, "Unlinking device from group");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "DELETE FROM group_device_link
             WHERE organization_id = $1 AND group_id = $2 AND device_ref = $3",
            &[&input.organization_id, &input.group_id, &input.device_ref],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(())
    }

    async fn list_group_devices(&self, group_id: i64) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device d
             INNER JOIN group_device_link l ON l.device_ref = d.id
             WHERE l.group_id = $1
             ORDER BY d.device_id",
            DEVICE_COLUMNS
        );

        let rows = conn
            .query(&query, &[&group_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| DeviceRow::from_row(row).into())
            .collect())
    }

    async fn list_excluded_devices(
        &self,
        organization_id: &str,
        group_id: i64,
    ) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device d
             WHERE d.organization_id = $1
               AND NOT EXISTS (
                   SELECT 1 FROM group_device_link l
                   WHERE l.device_ref = d.id AND l.group_id = $2
               )
             ORDER BY d.device_id",
            DEVICE_COLUMNS
        );

        let rows = conn
            .query(&query, &[&organization_id, &group_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| DeviceRow::from_row(row).into())
            .collect())
    }
}
