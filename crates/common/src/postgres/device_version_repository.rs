use crate::domain::{
    DeviceVersion, DeviceVersionRepository, DomainError, DomainResult,
    UpsertDeviceVersionRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::debug;

const VERSION_COLUMNS: &str =
    "device_ref, version, series, os_id, os_version_id, on_classic, kernel_version, created_at, modified_at";

fn version_from_row(row: &Row) -> DeviceVersion {
    DeviceVersion {
        device_ref: row.get(0),
        version: row.get(1),
        series: row.get(2),
        os_id: row.get(3),
        os_version_id: row.get(4),
        on_classic: row.get(5),
        kernel_version: row.get(6),
        created_at: row.get(7),
        modified_at: row.get(8),
    }
}

#[derive(Clone)]
pub struct PostgresDeviceVersionRepository {
    client: PostgresClient,
}

impl PostgresDeviceVersionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceVersionRepository for PostgresDeviceVersionRepository {
    async fn get_device_version(&self, device_ref: i64) -> DomainResult<Option<DeviceVersion>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device_version WHERE device_ref = $1",
            VERSION_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&device_ref])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(version_from_row))
    }

    async fn upsert_device_version(
        &self,
        input: UpsertDeviceVersionRepoInput,
    ) -> DomainResult<DeviceVersion> {
        debug!(device_ref = input.device_ref, version = %input.version, "Upserting device version");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO device_version (device_ref, version, series, os_id, os_version_id,
                 on_classic, kernel_version)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (device_ref) DO UPDATE SET
                 version = EXCLUDED.version,
                 series = EXCLUDED.series,
                 os_id = EXCLUDED.os_id,
                 os_version_id = EXCLUDED.os_version_id,
                 on_classic = EXCLUDED.on_classic,
                 kernel_version = EXCLUDED.kernel_version,
                 modified_at = now()
             RETURNING {}",
            VERSION_COLUMNS
        );

        let row = conn
            .query_one(
                &query,
                &[
                    &input.device_ref,
                    &input.version,
                    &input.series,
                    &input.os_id,
                    &input.os_version_id,
                    &input.on_classic,
                    &input.kernel_version,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(version_from_row(&row))
    }

    async fn delete_device_version(&self, device_ref: i64) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "DELETE FROM device_version WHERE device_ref = $1",
            &[&device_ref],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(())
    }
}
