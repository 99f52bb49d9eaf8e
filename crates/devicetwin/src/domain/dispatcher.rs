use crate::domain::{SnapServices, SubscribeAction};
use bytes::Bytes;
use common::domain::{
    ActionKind, ActionRepository, ActionStatus, CreateActionRepoInput, Device, DeviceRepository,
    DomainError, DomainResult, GetDeviceRepoInput, MessagePublisher,
};
use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, instrument, warn, Instrument, Span};

/// Topic a device listens on for commands
pub fn action_topic(device_id: &str) -> String {
    format!("devices/sub/{}", device_id)
}

/// Operator request to run an action on a device
#[derive(Debug, Clone, Validate)]
pub struct DispatchRequest {
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub action: ActionKind,
    #[garde(skip)]
    pub snap: String,
    #[garde(skip)]
    pub data: String,
}

impl DispatchRequest {
    pub fn new(organization_id: &str, device_id: &str, action: ActionKind) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            device_id: device_id.to_string(),
            action,
            snap: String::new(),
            data: String::new(),
        }
    }

    pub fn with_snap(mut self, snap: &str) -> Self {
        self.snap = snap.to_string();
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }
}

/// Publishes correlated commands to devices and logs them as actions
#[derive(Clone)]
pub struct ActionDispatcher {
    publisher: Arc<dyn MessagePublisher>,
    device_repository: Arc<dyn DeviceRepository>,
    action_repository: Arc<dyn ActionRepository>,
    resync_delay: Duration,
}

impl ActionDispatcher {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        device_repository: Arc<dyn DeviceRepository>,
        action_repository: Arc<dyn ActionRepository>,
        resync_delay: Duration,
    ) -> Self {
        Self {
            publisher,
            device_repository,
            action_repository,
            resync_delay,
        }
    }

    /// Validate, resolve the device within the organization, then publish.
    /// Snap mutations schedule a `list` after the resync delay so the cached
    /// inventory converges. Returns the correlation id.
    #[instrument(
        skip(self, request),
        fields(
            organization_id = %request.organization_id,
            device_id = %request.device_id,
            action = %request.action,
        )
    )]
    pub async fn dispatch(&self, request: DispatchRequest) -> DomainResult<String> {
        common::garde::validate_struct(&request)?;
        validate_action_arguments(&request)?;

        let device = self
            .resolve_device(&request.organization_id, &request.device_id)
            .await?;

        let action_id = self
            .publish_action(
                &device.organization_id,
                &device.device_id,
                request.action,
                &request.snap,
                &request.data,
            )
            .await?;

        if request.action.is_snap_mutation() {
            self.schedule_resync(device.organization_id, device.device_id);
        }

        Ok(action_id)
    }

    /// Publish without resolving the device; used when the device is not
    /// known yet. A publish failure leaves no action behind.
    #[instrument(skip(self, snap, data), fields(action_id = tracing::field::Empty))]
    pub async fn publish_action(
        &self,
        organization_id: &str,
        device_id: &str,
        action: ActionKind,
        snap: &str,
        data: &str,
    ) -> DomainResult<String> {
        let action_id = xid::new().to_string();
        Span::current().record("action_id", action_id.as_str());

        let envelope = SubscribeAction {
            id: action_id.clone(),
            action,
            snap: snap.to_string(),
            data: data.to_string(),
        };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| DomainError::TransportError(e.into()))?;

        self.publisher
            .publish(action_topic(device_id), Bytes::from(payload))
            .await
            .map_err(DomainError::TransportError)?;

        debug!("action published");

        self.action_repository
            .create_action(CreateActionRepoInput {
                organization_id: organization_id.to_string(),
                device_id: device_id.to_string(),
                action_id: action_id.clone(),
                action,
                status: ActionStatus::Requested,
                message: String::new(),
            })
            .await?;

        info!(action_id = %action_id, "action requested");
        Ok(action_id)
    }

    async fn resolve_device(&self, organization_id: &str, device_id: &str) -> DomainResult<Device> {
        self.device_repository
            .get_device(GetDeviceRepoInput {
                organization_id: organization_id.to_string(),
                device_id: device_id.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))
    }

    fn schedule_resync(&self, organization_id: String, device_id: String) {
        let dispatcher = self.clone();
        let span = info_span!(
            parent: Span::none(),
            "snap_list_resync",
            organization_id = %organization_id,
            device_id = %device_id,
        );

        tokio::spawn(
            async move {
                tokio::time::sleep(dispatcher.resync_delay).await;
                if let Err(e) = dispatcher.resync(&organization_id, &device_id).await {
                    warn!(error = %e, "deferred snap list failed");
                }
            }
            .instrument(span),
        );
    }

    async fn resync(&self, organization_id: &str, device_id: &str) -> DomainResult<String> {
        let device = self.resolve_device(organization_id, device_id).await?;
        self.publish_action(
            &device.organization_id,
            &device.device_id,
            ActionKind::List,
            "",
            "",
        )
        .await
    }
}

fn validate_action_arguments(request: &DispatchRequest) -> DomainResult<()> {
    if request.action.requires_snap() && request.snap.trim().is_empty() {
        return Err(DomainError::ValidationError(format!(
            "action {} requires a snap name",
            request.action
        )));
    }

    if request.action.is_service_control() {
        let services: SnapServices = serde_json::from_str(&request.data).map_err(|e| {
            DomainError::ValidationError(format!("invalid services list: {}", e))
        })?;
        if services.services.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "action {} requires at least one service",
                request.action
            )));
        }
    }

    Ok(())
}
