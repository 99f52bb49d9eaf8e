use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snap installed on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnap {
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertDeviceSnapRepoInput {
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
}

/// Repository trait for the snap inventory of devices
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceSnapRepository: Send + Sync {
    /// Snaps of a device ordered by name
    async fn list_device_snaps(&self, device_ref: i64) -> DomainResult<Vec<DeviceSnap>>;

    /// Create the (device, name) row or update it in place
    async fn upsert_device_snap(&self, input: UpsertDeviceSnapRepoInput)
        -> DomainResult<DeviceSnap>;

    async fn delete_device_snaps(&self, device_ref: i64) -> DomainResult<()>;
}
