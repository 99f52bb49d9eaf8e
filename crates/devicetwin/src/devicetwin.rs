use crate::domain::{
    ActionDispatcher, DeviceService, DeviceTwinService, GroupService, MessageRouter, SnapService,
};
use crate::mqtt::run_mqtt_subscriber;
use common::domain::{
    ActionRepository, DeviceRepository, DeviceSnapRepository, DeviceVersionRepository,
    GroupRepository, MessagePublisher,
};
use common::memory::InMemoryStore;
use common::mqtt::MqttClient;
use rumqttc::EventLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DeviceTwinConfig {
    /// Delay before the follow-up `list` after a snap mutation
    pub resync_delay: Duration,
    pub reconnect_delay: Duration,
}

/// Storage handles shared by every component
#[derive(Clone)]
pub struct DeviceTwinRepositories {
    pub device: Arc<dyn DeviceRepository>,
    pub snap: Arc<dyn DeviceSnapRepository>,
    pub version: Arc<dyn DeviceVersionRepository>,
    pub action: Arc<dyn ActionRepository>,
    pub group: Arc<dyn GroupRepository>,
}

impl From<InMemoryStore> for DeviceTwinRepositories {
    fn from(store: InMemoryStore) -> Self {
        Self {
            device: Arc::new(store.clone()),
            snap: Arc::new(store.clone()),
            version: Arc::new(store.clone()),
            action: Arc::new(store.clone()),
            group: Arc::new(store),
        }
    }
}

/// Operator services built on top of the twin
#[derive(Clone)]
pub struct DeviceTwinServices {
    pub devices: Arc<DeviceService>,
    pub snaps: Arc<SnapService>,
    pub groups: Arc<GroupService>,
}

impl DeviceTwinServices {
    pub fn new(
        repositories: &DeviceTwinRepositories,
        publisher: Arc<dyn MessagePublisher>,
        resync_delay: Duration,
    ) -> (Self, MessageRouter) {
        let dispatcher = ActionDispatcher::new(
            publisher,
            repositories.device.clone(),
            repositories.action.clone(),
            resync_delay,
        );
        let twin = Arc::new(DeviceTwinService::new(
            repositories.device.clone(),
            repositories.snap.clone(),
            repositories.version.clone(),
            repositories.action.clone(),
        ));

        let services = Self {
            devices: Arc::new(DeviceService::new(twin.clone(), dispatcher.clone())),
            snaps: Arc::new(SnapService::new(twin.clone(), dispatcher.clone())),
            groups: Arc::new(GroupService::new(
                repositories.group.clone(),
                repositories.device.clone(),
            )),
        };

        (services, MessageRouter::new(twin, dispatcher))
    }
}

/// The device twin module: the MQTT subscriber plus the operator services
pub struct DeviceTwin {
    services: DeviceTwinServices,
    router: MessageRouter,
    mqtt_client: MqttClient,
    eventloop: EventLoop,
    reconnect_delay: Duration,
}

impl DeviceTwin {
    pub fn new(
        repositories: DeviceTwinRepositories,
        mqtt_client: MqttClient,
        eventloop: EventLoop,
        config: DeviceTwinConfig,
    ) -> Self {
        debug!("initializing device twin module");

        let publisher: Arc<dyn MessagePublisher> = Arc::new(mqtt_client.clone());
        let (services, router) =
            DeviceTwinServices::new(&repositories, publisher, config.resync_delay);

        Self {
            services,
            router,
            mqtt_client,
            eventloop,
            reconnect_delay: config.reconnect_delay,
        }
    }

    pub fn services(&self) -> DeviceTwinServices {
        self.services.clone()
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new(move |ctx| {
            Box::pin(async move {
                run_mqtt_subscriber(
                    self.mqtt_client,
                    self.eventloop,
                    self.router,
                    self.reconnect_delay,
                    ctx,
                )
                .await
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SnapRequest;
    use common::domain::DomainError;
    use common::mqtt::MqttConfig;

    fn device_twin() -> DeviceTwin {
        let (mqtt_client, eventloop) = MqttClient::new(&MqttConfig::default());
        DeviceTwin::new(
            InMemoryStore::new().into(),
            mqtt_client,
            eventloop,
            DeviceTwinConfig {
                resync_delay: Duration::from_secs(10),
                reconnect_delay: Duration::from_millis(100),
            },
        )
    }

    #[tokio::test]
    async fn test_services_share_the_module_store() {
        let twin = device_twin();
        let services = twin.services();

        assert!(services.devices.list_devices("abc").await.unwrap().is_empty());
        let err = services
            .snaps
            .install(SnapRequest::new("abc", "a111", "helloworld"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_runner_process_stops_on_cancel() {
        let ctx = CancellationToken::new();
        ctx.cancel();

        let process = device_twin().into_runner_process();
        process(ctx).await.unwrap();
    }
}
