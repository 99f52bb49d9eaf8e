use crate::domain::{
    CreateDeviceRepoInput, Device, DeviceRepository, DeviceVersion, DomainError, DomainResult,
    GetDeviceRepoInput, PingDeviceRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, instrument};

/// Device columns in the order [`DeviceRow::from_row`] reads them
pub(crate) const DEVICE_COLUMNS: &str = "d.id, d.organization_id, d.device_id, d.brand, d.model, \
     d.serial_number, d.store_id, d.device_key, d.active, d.created_at, d.last_refresh";

const DEVICE_WITH_VERSION_SELECT: &str = "SELECT d.id, d.organization_id, d.device_id, d.brand, \
     d.model, d.serial_number, d.store_id, d.device_key, d.active, d.created_at, d.last_refresh, \
     v.version, v.series, v.os_id, v.os_version_id, v.on_classic, v.kernel_version, \
     v.created_at, v.modified_at
     FROM device d
     LEFT JOIN device_version v ON v.device_ref = d.id";

/// Device row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub id: i64,
    pub organization_id: String,
    pub device_id: String,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub store_id: String,
    pub device_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_refresh: DateTime<Utc>,
}

impl DeviceRow {
    pub(crate) fn from_row(row: &Row) -> Self {
        Self {
            id: row.get(0),
            organization_id: row.get(1),
            device_id: row.get(2),
            brand: row.get(3),
            model: row.get(4),
            serial_number: row.get(5),
            store_id: row.get(6),
            device_key: row.get(7),
            active: row.get(8),
            created_at: row.get(9),
            last_refresh: row.get(10),
        }
    }
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            organization_id: row.organization_id,
            device_id: row.device_id,
            brand: row.brand,
            model: row.model,
            serial_number: row.serial_number,
            store_id: row.store_id,
            device_key: row.device_key,
            active: row.active,
            version: None,
            created_at: row.created_at,
            last_refresh: row.last_refresh,
        }
    }
}

/// Reads a row of [`DEVICE_WITH_VERSION_SELECT`]; version columns are null
/// when the device never reported one
fn device_with_version(row: &Row) -> Device {
    let mut device: Device = DeviceRow::from_row(row).into();
    let version: Option<String> = row.get(11);
    device.version = version.map(|version| DeviceVersion {
        device_ref: device.id,
        version,
        series: row.get(12),
        os_id: row.get(13),
        os_version_id: row.get(14),
        on_classic: row.get(15),
        kernel_version: row.get(16),
        created_at: row.get(17),
        modified_at: row.get(18),
    });
    device
}

#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id, organization_id = %input.organization_id))]
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        debug!("Creating device in database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO device AS d (organization_id, device_id, brand, model, serial_number, store_id, device_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            DEVICE_COLUMNS
        );

        let result = conn
            .query_one(
                &query,
                &[
                    &input.organization_id,
                    &input.device_id,
                    &input.brand,
                    &input.model,
                    &input.serial_number,
                    &input.store_id,
                    &input.device_key,
                ],
            )
            .await;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::DeviceAlreadyExists(input.device_id));
                    }
                }
                return Err(DomainError::RepositoryError(e.into()));
            }
        };

        info!("Device created in database");
        Ok(DeviceRow::from_row(&row).into())
    }

    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>> {
        debug!(device_id = %input.device_id, organization_id = %input.organization_id, "Getting device from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "{} WHERE d.device_id = $1 AND d.organization_id = $2",
            DEVICE_WITH_VERSION_SELECT
        );

        let row = conn
            .query_opt(&query, &[&input.device_id, &input.organization_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(device_with_version))
    }

    async fn get_device_by_device_id(&self, device_id: &str) -> DomainResult<Option<Device>> {
        debug!(device_id = %device_id, "Getting device by device id");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!("{} WHERE d.device_id = $1", DEVICE_WITH_VERSION_SELECT);

        let row = conn
            .query_opt(&query, &[&device_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(device_with_version))
    }

    async fn list_devices(&self, organization_id: &str) -> DomainResult<Vec<Device>> {
        debug!(organization_id = %organization_id, "Listing devices from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "{} WHERE d.organization_id = $1 ORDER BY d.device_id",
            DEVICE_WITH_VERSION_SELECT
        );

        let rows = conn
            .query(&query, &[&organization_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let devices: Vec<Device> = rows.iter().map(device_with_version).collect();

        debug!(count = devices.len(), "Listed devices from database");
        Ok(devices)
    }

    async fn ping_device(&self, input: PingDeviceRepoInput) -> DomainResult<bool> {
        debug!(device_id = %input.device_id, refresh = %input.refresh, "Updating device last refresh");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "UPDATE device SET last_refresh = $1
                 WHERE device_id = $2 AND organization_id = $3",
                &[&input.refresh, &input.device_id, &input.organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected > 0)
    }

    #[instrument(skip(self), fields(device_id = %device_id))]
    async fn delete_device(&self, device_id: &str) -> DomainResult<()> {
        debug!("Deleting device and dependent rows");

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let row = tx
            .query_opt("SELECT id FROM device WHERE device_id = $1", &[&device_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let device_ref: i64 = match row {
            Some(row) => row.get(0),
            None => return Err(DomainError::DeviceNotFound(device_id.to_string())),
        };

        for statement in [
            "DELETE FROM group_device_link WHERE device_ref = $1",
            "DELETE FROM device_snap WHERE device_ref = $1",
            "DELETE FROM device_version WHERE device_ref = $1",
            "DELETE FROM device WHERE id = $1",
        ] {
            tx.execute(statement, &[&device_ref])
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        info!("Device deleted");
        Ok(())
    }
}
