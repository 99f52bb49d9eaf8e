use crate::domain::device::Device;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Named subset of an organization's devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub organization_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGroupRepoInput {
    pub organization_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetGroupRepoInput {
    pub organization_id: String,
    pub name: String,
}

/// Membership of a device in a group, both already resolved in the organization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDeviceRepoInput {
    pub organization_id: String,
    pub group_id: i64,
    pub device_ref: i64,
}

/// Repository trait for groups and their device links
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Create a group, fails with GroupAlreadyExists for a duplicate (org, name)
    async fn create_group(&self, input: CreateGroupRepoInput) -> DomainResult<Group>;

    /// Groups of an organization ordered by name
    async fn list_groups(&self, organization_id: &str) -> DomainResult<Vec<Group>>;

    async fn get_group(&self, input: GetGroupRepoInput) -> DomainResult<Option<Group>>;

    /// Link a device; linking twice is a no-op
    async fn link_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()>;

    async fn unlink_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()>;

    /// Devices linked to the group
    async fn list_group_devices(&self, group_id: i64) -> DomainResult<Vec<Device>>;

    /// Devices of the organization not linked to the group
    async fn list_excluded_devices(
        &self,
        organization_id: &str,
        group_id: i64,
    ) -> DomainResult<Vec<Device>>;
}
