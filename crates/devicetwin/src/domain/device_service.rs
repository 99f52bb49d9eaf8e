use crate::domain::{ActionDispatcher, DeviceTwinService, DispatchRequest};
use common::domain::{Action, ActionKind, Device, DomainResult};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Identifies one device of an organization
#[derive(Debug, Clone, Validate)]
pub struct DeviceRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub device_id: String,
}

impl DeviceRequest {
    pub fn new(organization_id: &str, device_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            device_id: device_id.to_string(),
        }
    }
}

/// Operator-facing device operations
pub struct DeviceService {
    twin: Arc<DeviceTwinService>,
    dispatcher: ActionDispatcher,
}

impl DeviceService {
    pub fn new(twin: Arc<DeviceTwinService>, dispatcher: ActionDispatcher) -> Self {
        Self { twin, dispatcher }
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, device_id = %request.device_id))]
    pub async fn get_device(&self, request: DeviceRequest) -> DomainResult<Device> {
        common::garde::validate_struct(&request)?;
        self.twin
            .device_get(&request.organization_id, &request.device_id)
            .await
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_devices(&self, organization_id: &str) -> DomainResult<Vec<Device>> {
        let devices = self.twin.device_list(organization_id).await?;
        debug!(count = devices.len(), "listed devices");
        Ok(devices)
    }

    /// Drop the twin without contacting the device
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, device_id = %request.device_id))]
    pub async fn delete_device(&self, request: DeviceRequest) -> DomainResult<()> {
        common::garde::validate_struct(&request)?;
        self.twin
            .device_delete(&request.organization_id, &request.device_id)
            .await
    }

    /// Ask the device to unregister; the twin is removed when it confirms
    pub async fn unregister_device(&self, request: DeviceRequest) -> DomainResult<String> {
        self.dispatch(request, ActionKind::Unregister).await
    }

    /// Ask the device for its OS and kernel version
    pub async fn request_os_details(&self, request: DeviceRequest) -> DomainResult<String> {
        self.dispatch(request, ActionKind::Server).await
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, device_id = %request.device_id))]
    pub async fn list_actions(&self, request: DeviceRequest) -> DomainResult<Vec<Action>> {
        common::garde::validate_struct(&request)?;
        self.twin
            .action_list(&request.organization_id, &request.device_id)
            .await
    }

    async fn dispatch(&self, request: DeviceRequest, action: ActionKind) -> DomainResult<String> {
        self.dispatcher
            .dispatch(DispatchRequest::new(
                &request.organization_id,
                &request.device_id,
                action,
            ))
            .await
    }
}
