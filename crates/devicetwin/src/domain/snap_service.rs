use crate::domain::{ActionDispatcher, DeviceRequest, DeviceTwinService, DispatchRequest, SnapServices};
use common::domain::{ActionKind, DeviceSnap, DomainError, DomainResult};
use garde::Validate;
use std::sync::Arc;
use tracing::instrument;

/// Identifies one snap on a device
#[derive(Debug, Clone, Validate)]
pub struct SnapRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(length(min = 1))]
    pub snap: String,
}

impl SnapRequest {
    pub fn new(organization_id: &str, device_id: &str, snap: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            device_id: device_id.to_string(),
            snap: snap.to_string(),
        }
    }

    fn into_dispatch(self, action: ActionKind) -> DispatchRequest {
        DispatchRequest::new(&self.organization_id, &self.device_id, action).with_snap(&self.snap)
    }
}

/// Operator-facing snap operations; everything except `list_snaps` is a
/// command sent to the device
pub struct SnapService {
    twin: Arc<DeviceTwinService>,
    dispatcher: ActionDispatcher,
}

impl SnapService {
    pub fn new(twin: Arc<DeviceTwinService>, dispatcher: ActionDispatcher) -> Self {
        Self { twin, dispatcher }
    }

    /// Cached inventory, ordered by snap name
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, device_id = %request.device_id))]
    pub async fn list_snaps(&self, request: DeviceRequest) -> DomainResult<Vec<DeviceSnap>> {
        common::garde::validate_struct(&request)?;
        self.twin
            .device_snaps(&request.organization_id, &request.device_id)
            .await
    }

    /// Ask the device to publish its full inventory
    pub async fn request_list(&self, request: DeviceRequest) -> DomainResult<String> {
        self.dispatcher
            .dispatch(DispatchRequest::new(
                &request.organization_id,
                &request.device_id,
                ActionKind::List,
            ))
            .await
    }

    pub async fn install(&self, request: SnapRequest) -> DomainResult<String> {
        self.snap_action(request, ActionKind::Install).await
    }

    pub async fn remove(&self, request: SnapRequest) -> DomainResult<String> {
        self.snap_action(request, ActionKind::Remove).await
    }

    pub async fn revert(&self, request: SnapRequest) -> DomainResult<String> {
        self.snap_action(request, ActionKind::Revert).await
    }

    /// `action` is one of enable, disable or refresh
    pub async fn update(&self, request: SnapRequest, action: &str) -> DomainResult<String> {
        let kind: ActionKind = action.parse().map_err(|_| invalid_action("update", action))?;
        if !kind.is_update_kind() {
            return Err(invalid_action("update", action));
        }
        self.snap_action(request, kind).await
    }

    /// Push new settings; `settings` is passed through to the device as is
    pub async fn configure(&self, request: SnapRequest, settings: String) -> DomainResult<String> {
        common::garde::validate_struct(&request)?;
        self.dispatcher
            .dispatch(request.into_dispatch(ActionKind::SetConf).with_data(settings))
            .await
    }

    /// `action` is one of start, stop or restart
    pub async fn service_control(
        &self,
        request: SnapRequest,
        action: &str,
        services: Vec<String>,
    ) -> DomainResult<String> {
        let kind: ActionKind = action
            .parse()
            .map_err(|_| invalid_action("service", action))?;
        if !kind.is_service_control() {
            return Err(invalid_action("service", action));
        }

        let data = serde_json::to_string(&SnapServices { services })
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;

        common::garde::validate_struct(&request)?;
        self.dispatcher
            .dispatch(request.into_dispatch(kind).with_data(data))
            .await
    }

    /// Ask the device to report one snap's details
    pub async fn request_info(&self, request: SnapRequest) -> DomainResult<String> {
        self.snap_action(request, ActionKind::Info).await
    }

    /// Ask the device to report one snap's current configuration
    pub async fn request_conf(&self, request: SnapRequest) -> DomainResult<String> {
        self.snap_action(request, ActionKind::Conf).await
    }

    async fn snap_action(&self, request: SnapRequest, action: ActionKind) -> DomainResult<String> {
        common::garde::validate_struct(&request)?;
        self.dispatcher.dispatch(request.into_dispatch(action)).await
    }
}

fn invalid_action(operation: &str, action: &str) -> DomainError {
    DomainError::ValidationError(format!("invalid {} action `{}`", operation, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{
        MockActionRepository, MockDeviceRepository, MockDeviceSnapRepository,
        MockDeviceVersionRepository, MockMessagePublisher,
    };
    use std::time::Duration;

    /// Service whose collaborators all reject being called
    fn untouched_service() -> SnapService {
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();
        let mut devices = MockDeviceRepository::new();
        devices.expect_get_device().never();

        let devices: Arc<MockDeviceRepository> = Arc::new(devices);
        let actions = Arc::new(MockActionRepository::new());
        let twin = Arc::new(DeviceTwinService::new(
            devices.clone(),
            Arc::new(MockDeviceSnapRepository::new()),
            Arc::new(MockDeviceVersionRepository::new()),
            actions.clone(),
        ));
        let dispatcher = ActionDispatcher::new(
            Arc::new(publisher),
            devices,
            actions,
            Duration::from_secs(10),
        );
        SnapService::new(twin, dispatcher)
    }

    #[tokio::test]
    async fn test_update_rejects_non_update_kind() {
        let service = untouched_service();
        for action in ["install", "remove", "bogus"] {
            let result = service
                .update(SnapRequest::new("abc", "a111", "helloworld"), action)
                .await;
            assert!(matches!(result, Err(DomainError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_service_control_rejects_other_kinds() {
        let service = untouched_service();
        let result = service
            .service_control(
                SnapRequest::new("abc", "a111", "helloworld"),
                "refresh",
                vec!["helloworld.daemon".to_string()],
            )
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_service_control_rejects_empty_services() {
        let service = untouched_service();
        let result = service
            .service_control(SnapRequest::new("abc", "a111", "helloworld"), "stop", vec![])
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_install_requires_snap_name() {
        let service = untouched_service();
        let result = service.install(SnapRequest::new("abc", "a111", "")).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }
}
