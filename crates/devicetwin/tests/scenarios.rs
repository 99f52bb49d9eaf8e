//! End-to-end flows through the router and operator services against the
//! in-memory store, with a publisher that records instead of sending.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use common::domain::{
    ActionKind, ActionRepository, ActionStatus, DeviceRepository, DomainError,
    ListActionsRepoInput, MessagePublisher,
};
use common::memory::InMemoryStore;
use common::mqtt::{MqttClient, MqttConfig};
use devicetwin::{
    DeviceRequest, DeviceTwinRepositories, DeviceTwinServices, GroupDeviceRequest, GroupRequest,
    MessageRouter, SnapRequest, SubscribeAction,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, SubscribeAction)>>,
    fail: bool,
}

impl RecordingPublisher {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn sent(&self) -> Vec<(String, SubscribeAction)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, topic: String, payload: Bytes) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("broker unavailable");
        }
        let envelope: SubscribeAction = serde_json::from_slice(&payload)?;
        self.sent.lock().unwrap().push((topic, envelope));
        Ok(())
    }
}

struct Harness {
    store: InMemoryStore,
    publisher: Arc<RecordingPublisher>,
    services: DeviceTwinServices,
    router: MessageRouter,
}

fn harness_with(publisher: RecordingPublisher) -> Harness {
    let store = InMemoryStore::new();
    let publisher = Arc::new(publisher);
    let repositories = DeviceTwinRepositories::from(store.clone());
    // Long enough that no resync fires during a test
    let (services, router) =
        DeviceTwinServices::new(&repositories, publisher.clone(), Duration::from_secs(3600));
    Harness {
        store,
        publisher,
        services,
        router,
    }
}

fn harness() -> Harness {
    harness_with(RecordingPublisher::default())
}

fn health_payload(org: &str, device_id: &str, refresh: chrono::DateTime<Utc>) -> Vec<u8> {
    json!({ "orgId": org, "deviceId": device_id, "refresh": refresh.to_rfc3339() })
        .to_string()
        .into_bytes()
}

fn response_payload(id: &str, action: &str, result: serde_json::Value) -> Vec<u8> {
    json!({ "id": id, "action": action, "success": true, "message": "", "result": result })
        .to_string()
        .into_bytes()
}

fn description(org: &str, device_id: &str, model: &str) -> serde_json::Value {
    json!({
        "orgId": org,
        "deviceId": device_id,
        "brand": "example",
        "model": model,
        "serial": "DR1000A111",
        "store": "example-store",
        "deviceKey": "AAAAAAAAA",
    })
}

fn snap(name: &str, revision: i32) -> serde_json::Value {
    json!({
        "name": name,
        "installedSize": 2048,
        "status": "active",
        "channel": "stable",
        "confinement": "strict",
        "version": "1.0",
        "revision": revision,
    })
}

impl Harness {
    /// Register a device the way a real one would be: unknown health ping,
    /// then the `device` and `list` responses
    async fn register(&self, org: &str, device_id: &str, snaps: Vec<serde_json::Value>) {
        let before = self.publisher.sent().len();
        self.router
            .route(
                &format!("devices/health/{}", device_id),
                &health_payload(org, device_id, Utc::now()),
            )
            .await;

        let sent = self.publisher.sent();
        let requests = &sent[before..];
        assert_eq!(requests.len(), 2);

        self.respond(
            device_id,
            &response_payload(&requests[0].1.id, "device", description(org, device_id, "drone-1000")),
        )
        .await;
        self.respond(
            device_id,
            &response_payload(&requests[1].1.id, "list", json!(snaps)),
        )
        .await;
    }

    async fn respond(&self, device_id: &str, payload: &[u8]) {
        self.router
            .route(&format!("devices/pub/{}", device_id), payload)
            .await;
    }

    async fn actions(&self, org: &str, device_id: &str) -> Vec<common::domain::Action> {
        self.store
            .list_actions(ListActionsRepoInput {
                organization_id: org.to_string(),
                device_id: device_id.to_string(),
            })
            .await
            .unwrap()
    }

    async fn snap_names(&self, org: &str, device_id: &str) -> Vec<String> {
        self.services
            .snaps
            .list_snaps(DeviceRequest::new(org, device_id))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }
}

#[tokio::test]
async fn test_unknown_device_bootstrap() {
    let h = harness();

    h.router
        .route("devices/health/a111", &health_payload("abc", "a111", Utc::now()))
        .await;

    let sent = h.publisher.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "devices/sub/a111");
    assert_eq!(sent[0].1.action, ActionKind::Device);
    assert_eq!(sent[1].1.action, ActionKind::List);

    let actions = h.actions("abc", "a111").await;
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|a| a.status == ActionStatus::Requested));
}

#[tokio::test]
async fn test_registration_completes_bootstrap_actions() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1), snap("helloworld", 29)])
        .await;

    let device = h
        .services
        .devices
        .get_device(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    assert_eq!(device.model, "drone-1000");
    assert_eq!(h.snap_names("abc", "a111").await, vec!["core", "helloworld"]);

    let actions = h.actions("abc", "a111").await;
    assert!(actions.iter().all(|a| a.status == ActionStatus::Complete));
}

#[tokio::test]
async fn test_known_device_health_publishes_nothing() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;
    let before = h.publisher.sent().len();

    h.router
        .route("devices/health/a111", &health_payload("abc", "a111", Utc::now()))
        .await;

    assert_eq!(h.publisher.sent().len(), before);
}

#[tokio::test]
async fn test_last_refresh_takes_latest_ping_not_newest_time() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;

    let t1 = Utc::now();
    let t2 = t1 - ChronoDuration::hours(1);
    h.router
        .route("devices/health/a111", &health_payload("abc", "a111", t1))
        .await;
    h.router
        .route("devices/health/a111", &health_payload("abc", "a111", t2))
        .await;

    let device = h.store.get_device_by_device_id("a111").await.unwrap().unwrap();
    assert_eq!(device.last_refresh.timestamp(), t2.timestamp());
}

#[tokio::test]
async fn test_install_lifecycle() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1)]).await;
    let baseline = h.actions("abc", "a111").await.len();

    let action_id = h
        .services
        .snaps
        .install(SnapRequest::new("abc", "a111", "helloworld"))
        .await
        .unwrap();

    let sent = h.publisher.sent();
    let (topic, envelope) = sent.last().unwrap();
    assert_eq!(topic, "devices/sub/a111");
    assert_eq!(envelope.id, action_id);
    assert_eq!(envelope.snap, "helloworld");

    h.respond("a111", &response_payload(&action_id, "install", json!("12")))
        .await;

    let actions = h.actions("abc", "a111").await;
    assert_eq!(actions.len(), baseline + 1);
    let install: Vec<_> = actions.iter().filter(|a| a.action_id == action_id).collect();
    assert_eq!(install.len(), 1);
    assert_eq!(install[0].status, ActionStatus::Complete);
    assert_eq!(install[0].action, ActionKind::Install);
}

#[tokio::test]
async fn test_list_replaces_inventory() {
    let h = harness();
    h.register(
        "abc",
        "a111",
        vec![snap("core", 1), snap("helloworld", 29), snap("lxd", 3)],
    )
    .await;

    let action_id = h
        .services
        .snaps
        .request_list(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    h.respond(
        "a111",
        &response_payload(&action_id, "list", json!([snap("core", 2), snap("nextcloud", 5)])),
    )
    .await;

    assert_eq!(h.snap_names("abc", "a111").await, vec!["core", "nextcloud"]);
}

#[tokio::test]
async fn test_empty_inventory_clears_snaps() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1), snap("helloworld", 29)])
        .await;

    let action_id = h
        .services
        .snaps
        .request_list(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    h.respond("a111", &response_payload(&action_id, "list", json!([])))
        .await;

    assert!(h.snap_names("abc", "a111").await.is_empty());
}

#[tokio::test]
async fn test_snap_info_upserts_single_snap() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1), snap("helloworld", 29)])
        .await;

    let action_id = h
        .services
        .snaps
        .request_info(SnapRequest::new("abc", "a111", "helloworld"))
        .await
        .unwrap();
    h.respond("a111", &response_payload(&action_id, "info", snap("helloworld", 30)))
        .await;

    let snaps = h
        .services
        .snaps
        .list_snaps(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    assert_eq!(snaps.len(), 2);
    let helloworld = snaps.iter().find(|s| s.name == "helloworld").unwrap();
    assert_eq!(helloworld.revision, 30);
}

#[tokio::test]
async fn test_duplicate_self_description_does_not_overwrite() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;

    let action_id = h
        .services
        .devices
        .request_os_details(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    // Device answers with a self-description under a server correlation id
    h.respond(
        "a111",
        &response_payload(&action_id, "device", description("abc", "a111", "other-model")),
    )
    .await;

    let device = h.store.get_device_by_device_id("a111").await.unwrap().unwrap();
    assert_eq!(device.model, "drone-1000");

    let actions = h.actions("abc", "a111").await;
    let action = actions.iter().find(|a| a.action_id == action_id).unwrap();
    assert_eq!(action.status, ActionStatus::Error);
    assert!(!action.message.is_empty());
}

#[tokio::test]
async fn test_os_details_embedded_in_device() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;

    let action_id = h
        .services
        .devices
        .request_os_details(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    h.respond(
        "a111",
        &response_payload(
            &action_id,
            "server",
            json!({
                "version": "2.45",
                "series": "16",
                "osId": "ubuntu-core",
                "osVersionId": "22",
                "onClassic": false,
                "kernelVersion": "5.15.0",
            }),
        ),
    )
    .await;

    let device = h
        .services
        .devices
        .get_device(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    let version = device.version.unwrap();
    assert_eq!(version.os_id, "ubuntu-core");
    assert_eq!(version.kernel_version, "5.15.0");
}

#[tokio::test]
async fn test_failed_response_leaves_action_requested() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;

    let action_id = h
        .services
        .snaps
        .remove(SnapRequest::new("abc", "a111", "helloworld"))
        .await
        .unwrap();
    let payload = json!({
        "id": action_id,
        "action": "remove",
        "success": false,
        "message": "snap not installed",
    })
    .to_string();
    h.respond("a111", payload.as_bytes()).await;

    let actions = h.actions("abc", "a111").await;
    let action = actions.iter().find(|a| a.action_id == action_id).unwrap();
    assert_eq!(action.status, ActionStatus::Requested);
    assert!(action.message.is_empty());
}

#[tokio::test]
async fn test_unhandled_response_marks_action_error() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;

    let action_id = h
        .services
        .snaps
        .request_list(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    h.respond("a111", &response_payload(&action_id, "reboot", json!(null)))
        .await;

    let actions = h.actions("abc", "a111").await;
    let action = actions.iter().find(|a| a.action_id == action_id).unwrap();
    assert_eq!(action.status, ActionStatus::Error);
}

#[tokio::test]
async fn test_publish_failure_leaves_no_action() {
    let h = harness_with(RecordingPublisher::failing());

    h.router
        .route("devices/health/a111", &health_payload("abc", "a111", Utc::now()))
        .await;

    assert!(h.actions("abc", "a111").await.is_empty());
}

#[tokio::test]
async fn test_install_without_broker_returns_transport_error() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;
    let registered = h.actions("abc", "a111").await.len();

    // Broker unreachable and never polled
    let (client, _eventloop) = MqttClient::new(&MqttConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..MqttConfig::default()
    });
    let repositories = DeviceTwinRepositories::from(h.store.clone());
    let (services, _router) =
        DeviceTwinServices::new(&repositories, Arc::new(client), Duration::from_secs(3600));

    let err = services
        .snaps
        .install(SnapRequest::new("abc", "a111", "helloworld"))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::TransportError(_)));
    let actions = h.actions("abc", "a111").await;
    assert_eq!(actions.len(), registered);
    assert!(actions.iter().all(|a| a.action != ActionKind::Install));
}

#[tokio::test]
async fn test_org_isolation() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1)]).await;

    let result = h
        .services
        .devices
        .get_device(DeviceRequest::new("xyz", "a111"))
        .await;
    assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));

    let result = h
        .services
        .snaps
        .install(SnapRequest::new("xyz", "a111", "helloworld"))
        .await;
    assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));

    assert!(h.services.devices.list_devices("xyz").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_from_wrong_org_does_not_refresh() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;
    let before = h.store.get_device_by_device_id("a111").await.unwrap().unwrap();

    h.router
        .route(
            "devices/health/a111",
            &health_payload("xyz", "a111", Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

    let after = h.store.get_device_by_device_id("a111").await.unwrap().unwrap();
    assert_eq!(before.last_refresh, after.last_refresh);
}

#[tokio::test]
async fn test_unregister_removes_twin() {
    let h = harness();
    h.register("abc", "a111", vec![snap("core", 1)]).await;
    h.services
        .groups
        .create_group(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap();
    h.services
        .groups
        .link_device(GroupDeviceRequest::new("abc", "workshop", "a111"))
        .await
        .unwrap();

    let action_id = h
        .services
        .devices
        .unregister_device(DeviceRequest::new("abc", "a111"))
        .await
        .unwrap();
    h.respond("a111", &response_payload(&action_id, "unregister", json!("")))
        .await;

    let result = h
        .services
        .devices
        .get_device(DeviceRequest::new("abc", "a111"))
        .await;
    assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    assert!(h
        .services
        .groups
        .list_devices(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap()
        .is_empty());

    let actions = h.actions("abc", "a111").await;
    let action = actions.iter().find(|a| a.action_id == action_id).unwrap();
    assert_eq!(action.status, ActionStatus::Complete);
}

#[tokio::test]
async fn test_group_membership() {
    let h = harness();
    h.register("abc", "a111", vec![]).await;
    h.register("abc", "b222", vec![]).await;
    h.register("xyz", "c333", vec![]).await;

    let groups = &h.services.groups;
    groups
        .create_group(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap();
    let duplicate = groups
        .create_group(GroupRequest::new("abc", "workshop"))
        .await;
    assert!(matches!(duplicate, Err(DomainError::GroupAlreadyExists(_))));

    groups
        .link_device(GroupDeviceRequest::new("abc", "workshop", "a111"))
        .await
        .unwrap();
    // Linking twice is a no-op
    groups
        .link_device(GroupDeviceRequest::new("abc", "workshop", "a111"))
        .await
        .unwrap();

    let cross_org = groups
        .link_device(GroupDeviceRequest::new("abc", "workshop", "c333"))
        .await;
    assert!(matches!(cross_org, Err(DomainError::DeviceNotFound(_))));

    let members = groups
        .list_devices(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].device_id, "a111");

    let excluded = groups
        .list_excluded_devices(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].device_id, "b222");

    groups
        .unlink_device(GroupDeviceRequest::new("abc", "workshop", "a111"))
        .await
        .unwrap();
    let excluded = groups
        .list_excluded_devices(GroupRequest::new("abc", "workshop"))
        .await
        .unwrap();
    assert_eq!(excluded.len(), 2);
}

#[tokio::test]
async fn test_service_control_sends_services_list() {
    let h = harness();
    h.register("abc", "a111", vec![snap("nextcloud", 5)]).await;

    h.services
        .snaps
        .service_control(
            SnapRequest::new("abc", "a111", "nextcloud"),
            "restart",
            vec!["nextcloud.apache".to_string()],
        )
        .await
        .unwrap();

    let sent = h.publisher.sent();
    let (_, envelope) = sent.last().unwrap();
    assert_eq!(envelope.action, ActionKind::Restart);
    let data: serde_json::Value = serde_json::from_str(&envelope.data).unwrap();
    assert_eq!(data, json!({ "services": ["nextcloud.apache"] }));
}
