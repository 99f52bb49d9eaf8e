use crate::domain::device_version::DeviceVersion;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Cloud-side twin of a fleet device
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: i64,
    pub organization_id: String,
    pub device_id: String,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub store_id: String,
    pub device_key: String,
    pub active: bool,
    /// Filled by lookups that join the current OS version
    pub version: Option<DeviceVersion>,
    pub created_at: DateTime<Utc>,
    pub last_refresh: DateTime<Utc>,
}

/// Input for creating a device from its self-description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeviceRepoInput {
    pub organization_id: String,
    pub device_id: String,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub store_id: String,
    pub device_key: String,
}

/// Organization-scoped lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceRepoInput {
    pub organization_id: String,
    pub device_id: String,
}

/// Liveness update from a health message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingDeviceRepoInput {
    pub organization_id: String,
    pub device_id: String,
    pub refresh: DateTime<Utc>,
}

/// Repository trait for device persistence operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Create a device, fails with DeviceAlreadyExists when the device id is taken
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device>;

    /// Get a device within an organization, with its OS version when known
    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>>;

    /// Get a device by its globally unique device id, regardless of organization
    async fn get_device_by_device_id(&self, device_id: &str) -> DomainResult<Option<Device>>;

    /// List devices of an organization
    async fn list_devices(&self, organization_id: &str) -> DomainResult<Vec<Device>>;

    /// Set last refresh; returns false when no device matched
    async fn ping_device(&self, input: PingDeviceRepoInput) -> DomainResult<bool>;

    /// Delete a device with its snaps, version and group links
    async fn delete_device(&self, device_id: &str) -> DomainResult<()>;
}
