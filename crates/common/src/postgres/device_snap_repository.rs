use crate::domain::{
    DeviceSnap, DeviceSnapRepository, DomainError, DomainResult, UpsertDeviceSnapRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::debug;

const SNAP_COLUMNS: &str = "device_ref, name, installed_size, installed_date, status, channel, \
     confinement, version, revision, devmode, config, created_at, modified_at";

/// Snap row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct DeviceSnapRow {
    pub device_ref: i64,
    pub name: String,
    pub installed_size: i64,
    pub installed_date: Option<DateTime<Utc>>,
    pub status: String,
    pub channel: String,
    pub confinement: String,
    pub version: String,
    pub revision: i32,
    pub devmode: bool,
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<&Row> for DeviceSnapRow {
    fn from(row: &Row) -> Self {
        Self {
            device_ref: row.get(0),
            name: row.get(1),
            installed_size: row.get(2),
            installed_date: row.get(3),
            status: row.get(4),
            channel: row.get(5),
            confinement: row.get(6),
            version: row.get(7),
            revision: row.get(8),
            devmode: row.get(9),
            config: row.get(10),
            created_at: row.get(11),
            modified_at: row.get(12),
        }
    }
}

impl From<DeviceSnapRow> for DeviceSnap {
    fn from(row: DeviceSnapRow) -> Self {
        DeviceSnap {
            device_ref: row.device_ref,
            name: row.name,
            installed_size: row.installed_size,
            installed_date: row.installed_date,
            status: row.status,
            channel: row.channel,
            confinement: row.confinement,
            version: row.version,
            revision: row.revision,
            devmode: row.devmode,
            config: row.config,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

#[derive(Clone)]
pub struct PostgresDeviceSnapRepository {
    client: PostgresClient,
}

impl PostgresDeviceSnapRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceSnapRepository for PostgresDeviceSnapRepository {
    async fn list_device_snaps(&self, device_ref: i64) -> DomainResult<Vec<DeviceSnap>> {
        debug!(device_ref, "Listing device snaps");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM device_snap WHERE device_ref = $1 ORDER BY name",
            SNAP_COLUMNS
        );

        let rows = conn
            .query(&query, &[&device_ref])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| DeviceSnapRow::from(row).into())
            .collect())
    }

    async fn upsert_device_snap(
        &self,
        input: UpsertDeviceSnapRepoInput,
    ) -> DomainResult<DeviceSnap> {
        debug!(device_ref = input.device_ref, name = %input.name, "Upserting device snap");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO device_snap (device_ref, name, installed_size, installed_date, status,
                 channel, confinement, version, revision, devmode, config)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (device_ref, name) DO UPDATE SET
                 installed_size = EXCLUDED.installed_size,
                 installed_date = EXCLUDED.installed_date,
                 status = EXCLUDED.status,
                 channel = EXCLUDED.channel,
                 confinement = EXCLUDED.confinement,
                 version = EXCLUDED.version,
                 revision = EXCLUDED.revision,
                 devmode = EXCLUDED.devmode,
                 config = EXCLUDED.config,
                 modified_at = now()
             RETURNING {}",
            SNAP_COLUMNS
        );

        let row = conn
            .query_one(
                &query,
                &[
                    &input.device_ref,
                    &input.name,
                    &input.installed_size,
                    &input.installed_date,
                    &input.status,
                    &input.channel,
                    &input.confinement,
                    &input.version,
                    &input.revision,
                    &input.devmode,
                    &input.config,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(DeviceSnapRow::from(&row).into())
    }

    async fn delete_device_snaps(&self, device_ref: i64) -> DomainResult<()> {
        debug!(device_ref, "Deleting device snaps");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute("DELETE FROM device_snap WHERE device_ref = $1", &[&device_ref])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(())
    }
}
