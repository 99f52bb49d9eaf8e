use common::domain::{
    CreateGroupRepoInput, Device, DeviceRepository, DomainError, DomainResult, GetDeviceRepoInput,
    GetGroupRepoInput, Group, GroupDeviceRepoInput, GroupRepository,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Validate)]
pub struct GroupRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub name: String,
}

impl GroupRequest {
    pub fn new(organization_id: &str, name: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            name: name.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct GroupDeviceRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(length(min = 1))]
    pub device_id: String,
}

impl GroupDeviceRequest {
    pub fn new(organization_id: &str, name: &str, device_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            name: name.trim().to_string(),
            device_id: device_id.to_string(),
        }
    }
}

/// Groups and their device membership. Both the group and the device are
/// looked up within the caller's organization.
pub struct GroupService {
    group_repository: Arc<dyn GroupRepository>,
    device_repository: Arc<dyn DeviceRepository>,
}

impl GroupService {
    pub fn new(
        group_repository: Arc<dyn GroupRepository>,
        device_repository: Arc<dyn DeviceRepository>,
    ) -> Self {
        Self {
            group_repository,
            device_repository,
        }
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name))]
    pub async fn create_group(&self, request: GroupRequest) -> DomainResult<Group> {
        common::garde::validate_struct(&request)?;

        let group = self
            .group_repository
            .create_group(CreateGroupRepoInput {
                organization_id: request.organization_id,
                name: request.name,
            })
            .await?;

        info!(group_id = group.id, "group created");
        Ok(group)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_groups(&self, organization_id: &str) -> DomainResult<Vec<Group>> {
        let groups = self.group_repository.list_groups(organization_id).await?;
        debug!(count = groups.len(), "listed groups");
        Ok(groups)
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name))]
    pub async fn get_group(&self, request: GroupRequest) -> DomainResult<Group> {
        common::garde::validate_struct(&request)?;
        self.resolve_group(&request.organization_id, &request.name)
            .await
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name, device_id = %request.device_id))]
    pub async fn link_device(&self, request: GroupDeviceRequest) -> DomainResult<()> {
        let input = self.resolve_link(&request).await?;
        self.group_repository.link_device(input).await?;
        info!("device linked to group");
        Ok(())
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name, device_id = %request.device_id))]
    pub async fn unlink_device(&self, request: GroupDeviceRequest) -> DomainResult<()> {
        let input = self.resolve_link(&request).await?;
        self.group_repository.unlink_device(input).await?;
        info!("device unlinked from group");
        Ok(())
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name))]
    pub async fn list_devices(&self, request: GroupRequest) -> DomainResult<Vec<Device>> {
        common::garde::validate_struct(&request)?;
        let group = self
            .resolve_group(&request.organization_id, &request.name)
            .await?;
        self.group_repository.list_group_devices(group.id).await
    }

    /// Devices of the organization that are not in the group
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, name = %request.name))]
    pub async fn list_excluded_devices(&self, request: GroupRequest) -> DomainResult<Vec<Device>> {
        common::garde::validate_struct(&request)?;
        let group = self
            .resolve_group(&request.organization_id, &request.name)
            .await?;
        self.group_repository
            .list_excluded_devices(&request.organization_id, group.id)
            .await
    }

    async fn resolve_group(&self, organization_id: &str, name: &str) -> DomainResult<Group> {
        self.group_repository
            .get_group(GetGroupRepoInput {
                organization_id: organization_id.to_string(),
                name: name.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::GroupNotFound(name.to_string()))
    }

    async fn resolve_link(&self, request: &GroupDeviceRequest) -> DomainResult<GroupDeviceRepoInput> {
        common::garde::validate_struct(request)?;

        let group = self
            .resolve_group(&request.organization_id, &request.name)
            .await?;

        let device = self
            .device_repository
            .get_device(GetDeviceRepoInput {
                organization_id: request.organization_id.clone(),
                device_id: request.device_id.clone(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(request.device_id.clone()))?;

        Ok(GroupDeviceRepoInput {
            organization_id: request.organization_id.clone(),
            group_id: group.id,
            device_ref: device.id,
        })
    }
}
