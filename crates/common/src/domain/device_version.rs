use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OS and kernel identity reported by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceVersion {
    pub device_ref: i64,
    pub version: String,
    pub series: String,
    pub os_id: String,
    pub os_version_id: String,
    pub on_classic: bool,
    pub kernel_version: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertDeviceVersionRepoInput {
    pub device_ref: i64,
    pub version: String,
    pub series: String,
    pub os_id: String,
    pub os_version_id: String,
    pub on_classic: bool,
    pub kernel_version: String,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceVersionRepository: Send + Sync {
    async fn get_device_version(&self, device_ref: i64) -> DomainResult<Option<DeviceVersion>>;

    /// Insert or replace the single version row of a device
    async fn upsert_device_version(
        &self,
        input: UpsertDeviceVersionRepoInput,
    ) -> DomainResult<DeviceVersion>;

    async fn delete_device_version(&self, device_ref: i64) -> DomainResult<()>;
}
