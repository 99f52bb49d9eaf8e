use crate::domain::{
    ActionResult, DeviceDescription, HealthMessage, OsVersionDescriptor, SnapDescriptor,
};
use common::domain::{
    Action, ActionKind, ActionRepository, ActionStatus, CreateDeviceRepoInput, Device,
    DeviceRepository, DeviceSnap, DeviceSnapRepository, DeviceVersionRepository, DomainError,
    DomainResult, GetDeviceRepoInput, ListActionsRepoInput, PingDeviceRepoInput, ResponseClass,
    UpdateActionRepoInput, UpsertDeviceSnapRepoInput, UpsertDeviceVersionRepoInput,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Merges device-reported state into the twin and closes out actions
pub struct DeviceTwinService {
    device_repository: Arc<dyn DeviceRepository>,
    snap_repository: Arc<dyn DeviceSnapRepository>,
    version_repository: Arc<dyn DeviceVersionRepository>,
    action_repository: Arc<dyn ActionRepository>,
}

impl DeviceTwinService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        snap_repository: Arc<dyn DeviceSnapRepository>,
        version_repository: Arc<dyn DeviceVersionRepository>,
        action_repository: Arc<dyn ActionRepository>,
    ) -> Self {
        Self {
            device_repository,
            snap_repository,
            version_repository,
            action_repository,
        }
    }

    /// Record a liveness ping. Unknown devices are not created here; the
    /// caller decides whether to bootstrap them.
    #[instrument(skip(self, health), fields(organization_id = %health.organization_id, device_id = %health.device_id))]
    pub async fn health_handler(&self, health: &HealthMessage) -> DomainResult<()> {
        let matched = self
            .device_repository
            .ping_device(PingDeviceRepoInput {
                organization_id: health.organization_id.clone(),
                device_id: health.device_id.clone(),
                refresh: health.refresh,
            })
            .await?;

        if !matched {
            return Err(DomainError::DeviceNotFound(health.device_id.clone()));
        }

        debug!(refresh = %health.refresh, "device refreshed");
        Ok(())
    }

    /// Apply a successful response, then mark its action complete or error.
    /// The action update is attempted even when the merge failed.
    #[instrument(skip(self, payload), fields(device_id = %device_id, action_id = %action_id, action = %action))]
    pub async fn action_response(
        &self,
        device_id: &str,
        action_id: &str,
        action: &str,
        payload: &[u8],
    ) -> DomainResult<()> {
        let outcome = self.apply_response(device_id, action, payload).await;

        let (status, message) = match &outcome {
            Ok(()) => (ActionStatus::Complete, String::new()),
            Err(e) => {
                warn!(error = %e, "action response not applied");
                (ActionStatus::Error, e.to_string())
            }
        };

        match self
            .action_repository
            .update_action(UpdateActionRepoInput {
                action_id: action_id.to_string(),
                status,
                message,
            })
            .await
        {
            Ok(true) => info!(status = %status, "action closed"),
            Ok(false) => warn!("no action logged for correlation id"),
            Err(e) => {
                error!(error = %e, "failed to update action");
                return Err(e);
            }
        }

        outcome
    }

    async fn apply_response(&self, device_id: &str, action: &str, payload: &[u8]) -> DomainResult<()> {
        let kind: ActionKind = action.parse()?;

        match kind.response_class() {
            ResponseClass::SelfDescription => self.apply_device(payload).await,
            ResponseClass::Inventory => self.apply_inventory(device_id, payload).await,
            ResponseClass::Task => {
                let task: ActionResult<String> = parse_result(kind, payload)?;
                debug!(task_id = %task.result, "device accepted snap task");
                Ok(())
            }
            ResponseClass::SnapDescriptor => self.apply_snap(device_id, kind, payload).await,
            ResponseClass::OsVersion => self.apply_os_version(device_id, payload).await,
            ResponseClass::Unregister => self.device_repository.delete_device(device_id).await,
            ResponseClass::Unhandled => Err(DomainError::UnhandledAction(action.to_string())),
        }
    }

    async fn apply_device(&self, payload: &[u8]) -> DomainResult<()> {
        let description: ActionResult<DeviceDescription> =
            parse_result(ActionKind::Device, payload)?;
        let description = description.result;

        if self
            .device_repository
            .get_device_by_device_id(&description.device_id)
            .await?
            .is_some()
        {
            return Err(DomainError::DeviceAlreadyExists(description.device_id));
        }

        let device = self
            .device_repository
            .create_device(CreateDeviceRepoInput {
                organization_id: description.organization_id,
                device_id: description.device_id,
                brand: description.brand,
                model: description.model,
                serial_number: description.serial_number,
                store_id: description.store_id,
                device_key: description.device_key,
            })
            .await?;

        info!(device_id = %device.device_id, organization_id = %device.organization_id, "device registered");
        Ok(())
    }

    async fn apply_inventory(&self, device_id: &str, payload: &[u8]) -> DomainResult<()> {
        let inventory: ActionResult<Vec<SnapDescriptor>> = parse_result(ActionKind::List, payload)?;
        let device = self.device_by_id(device_id).await?;

        self.snap_repository.delete_device_snaps(device.id).await?;
        for snap in inventory.result {
            self.snap_repository
                .upsert_device_snap(snap_input(device.id, snap))
                .await?;
        }

        debug!(device_id = %device_id, "snap inventory replaced");
        Ok(())
    }

    async fn apply_snap(&self, device_id: &str, kind: ActionKind, payload: &[u8]) -> DomainResult<()> {
        let snap: ActionResult<SnapDescriptor> = parse_result(kind, payload)?;
        let device = self.device_by_id(device_id).await?;

        self.snap_repository
            .upsert_device_snap(snap_input(device.id, snap.result))
            .await?;
        Ok(())
    }

    async fn apply_os_version(&self, device_id: &str, payload: &[u8]) -> DomainResult<()> {
        let version: ActionResult<OsVersionDescriptor> =
            parse_result(ActionKind::Server, payload)?;
        let version = version.result;
        let device = self.device_by_id(device_id).await?;

        self.version_repository
            .upsert_device_version(UpsertDeviceVersionRepoInput {
                device_ref: device.id,
                version: version.version,
                series: version.series,
                os_id: version.os_id,
                os_version_id: version.os_version_id,
                on_classic: version.on_classic,
                kernel_version: version.kernel_version,
            })
            .await?;
        Ok(())
    }

    /// Device-originated messages are keyed by the globally unique device id
    async fn device_by_id(&self, device_id: &str) -> DomainResult<Device> {
        self.device_repository
            .get_device_by_device_id(device_id)
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))
    }

    /// Operator lookup, scoped to the organization
    pub async fn device_get(&self, organization_id: &str, device_id: &str) -> DomainResult<Device> {
        self.device_repository
            .get_device(GetDeviceRepoInput {
                organization_id: organization_id.to_string(),
                device_id: device_id.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))
    }

    pub async fn device_list(&self, organization_id: &str) -> DomainResult<Vec<Device>> {
        self.device_repository.list_devices(organization_id).await
    }

    pub async fn device_snaps(
        &self,
        organization_id: &str,
        device_id: &str,
    ) -> DomainResult<Vec<DeviceSnap>> {
        let device = self.device_get(organization_id, device_id).await?;
        self.snap_repository.list_device_snaps(device.id).await
    }

    pub async fn device_delete(&self, organization_id: &str, device_id: &str) -> DomainResult<()> {
        let device = self.device_get(organization_id, device_id).await?;
        self.device_repository.delete_device(&device.device_id).await
    }

    pub async fn action_list(
        &self,
        organization_id: &str,
        device_id: &str,
    ) -> DomainResult<Vec<Action>> {
        let device = self.device_get(organization_id, device_id).await?;
        self.action_repository
            .list_actions(ListActionsRepoInput {
                organization_id: device.organization_id,
                device_id: device.device_id,
            })
            .await
    }
}

fn parse_result<T: DeserializeOwned + Default>(kind: ActionKind, payload: &[u8]) -> DomainResult<ActionResult<T>> {
    serde_json::from_slice(payload)
        .map_err(|e| DomainError::InvalidActionPayload(kind.to_string(), e.to_string()))
}

fn snap_input(device_ref: i64, snap: SnapDescriptor) -> UpsertDeviceSnapRepoInput {
    UpsertDeviceSnapRepoInput {
        device_ref,
        name: snap.name,
        installed_size: snap.installed_size,
        installed_date: snap.installed_date,
        status: snap.status,
        channel: snap.channel,
        confinement: snap.confinement,
        version: snap.version,
        revision: snap.revision,
        devmode: snap.devmode,
        config: snap.config,
    }
}
