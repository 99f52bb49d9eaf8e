use crate::domain::{
    Action, ActionRepository, CreateActionRepoInput, CreateDeviceRepoInput, CreateGroupRepoInput,
    Device, DeviceRepository, DeviceSnap, DeviceSnapRepository, DeviceVersion,
    DeviceVersionRepository, DomainError, DomainResult, GetDeviceRepoInput, GetGroupRepoInput,
    Group, GroupDeviceRepoInput, GroupRepository, ListActionsRepoInput, PingDeviceRepoInput,
    UpdateActionRepoInput, UpsertDeviceSnapRepoInput, UpsertDeviceVersionRepoInput,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    last_id: i64,
    devices: BTreeMap<i64, Device>,
    snaps: BTreeMap<(i64, String), DeviceSnap>,
    versions: HashMap<i64, DeviceVersion>,
    actions: Vec<Action>,
    groups: BTreeMap<i64, Group>,
    /// (group id, device ref) -> organization id
    links: BTreeMap<(i64, i64), String>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn find_device(&self, device_id: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.device_id == device_id)
    }

    fn with_version(&self, device: &Device) -> Device {
        let mut device = device.clone();
        device.version = self.versions.get(&device.id).cloned();
        device
    }
}

/// Process-local store implementing every repository trait
///
/// All state sits behind one lock so upserts are atomic with respect to
/// each other, as the single-statement upserts are in PostgreSQL.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryStore {
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let mut state = self.state.write().await;
        if state.find_device(&input.device_id).is_some() {
            return Err(DomainError::DeviceAlreadyExists(input.device_id));
        }

        let now = Utc::now();
        let device = Device {
            id: state.next_id(),
            organization_id: input.organization_id,
            device_id: input.device_id,
            brand: input.brand,
            model: input.model,
            serial_number: input.serial_number,
            store_id: input.store_id,
            device_key: input.device_key,
            active: true,
            version: None,
            created_at: now,
            last_refresh: now,
        };
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>> {
        let state = self.state.read().await;
        Ok(state
            .find_device(&input.device_id)
            .filter(|d| d.organization_id == input.organization_id)
            .map(|d| state.with_version(d)))
    }

    async fn get_device_by_device_id(&self, device_id: &str) -> DomainResult<Option<Device>> {
        let state = self.state.read().await;
        Ok(state.find_device(device_id).map(|d| state.with_version(d)))
    }

    async fn list_devices(&self, organization_id: &str) -> DomainResult<Vec<Device>> {
        let state = self.state.read().await;
        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.organization_id == organization_id)
            .map(|d| state.with_version(d))
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn ping_device(&self, input: PingDeviceRepoInput) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        let device = state.devices.values_mut().find(|d| {
            d.device_id == input.device_id && d.organization_id == input.organization_id
        });
        match device {
            Some(device) => {
                device.last_refresh = input.refresh;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_device(&self, device_id: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let device_ref = state
            .find_device(device_id)
            .map(|d| d.id)
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))?;

        state.devices.remove(&device_ref);
        state.versions.remove(&device_ref);
        state.snaps.retain(|(owner, _), _| *owner != device_ref);
        state.links.retain(|(_, linked), _| *linked != device_ref);
        Ok(())
    }
}

#[async_trait]
impl DeviceSnapRepository for InMemoryStore {
    async fn list_device_snaps(&self, device_ref: i64) -> DomainResult<Vec<DeviceSnap>> {
        let state = self.state.read().await;
        // BTreeMap keys order by (device_ref, name)
        Ok(state
            .snaps
            .iter()
            .filter(|((owner, _), _)| *owner == device_ref)
            .map(|(_, snap)| snap.clone())
            .collect())
    }

    async fn upsert_device_snap(
        &self,
        input: UpsertDeviceSnapRepoInput,
    ) -> DomainResult<DeviceSnap> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = (input.device_ref, input.name.clone());
        let created_at = state
            .snaps
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let snap = DeviceSnap {
            device_ref: input.device_ref,
            name: input.name,
            installed_size: input.installed_size,
            installed_date: input.installed_date,
            status: input.status,
            channel: input.channel,
            confinement: input.confinement,
            version: input.version,
            revision: input.revision,
            devmode: input.devmode,
            config: input.config,
            created_at,
            modified_at: now,
        };
        state.snaps.insert(key, snap.clone());
        Ok(snap)
    }

    async fn delete_device_snaps(&self, device_ref: i64) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.snaps.retain(|(owner, _), _| *owner != device_ref);
        Ok(())
    }
}

#[async_trait]
impl DeviceVersionRepository for InMemoryStore {
    async fn get_device_version(&self, device_ref: i64) -> DomainResult<Option<DeviceVersion>> {
        let state = self.state.read().await;
        Ok(state.versions.get(&device_ref).cloned())
    }

    async fn upsert_device_version(
        &self,
        input: UpsertDeviceVersionRepoInput,
    ) -> DomainResult<DeviceVersion> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let created_at = state
            .versions
            .get(&input.device_ref)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let version = DeviceVersion {
            device_ref: input.device_ref,
            version: input.version,
            series: input.series,
            os_id: input.os_id,
            os_version_id: input.os_version_id,
            on_classic: input.on_classic,
            kernel_version: input.kernel_version,
            created_at,
            modified_at: now,
        };
        state.versions.insert(input.device_ref, version.clone());
        Ok(version)
    }

    async fn delete_device_version(&self, device_ref: i64) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.versions.remove(&device_ref);
        Ok(())
    }
}

#[async_trait]
impl ActionRepository for InMemoryStore {
    async fn create_action(&self, input: CreateActionRepoInput) -> DomainResult<Action> {
        let mut state = self.state.write().await;
        if state.actions.iter().any(|a| a.action_id == input.action_id) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "duplicate action id {}",
                input.action_id
            )));
        }

        let now = Utc::now();
        let action = Action {
            id: state.next_id(),
            organization_id: input.organization_id,
            device_id: input.device_id,
            action_id: input.action_id,
            action: input.action,
            status: input.status,
            message: input.message,
            created_at: now,
            modified_at: now,
        };
        state.actions.push(action.clone());
        Ok(action)
    }

    async fn update_action(&self, input: UpdateActionRepoInput) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        match state
            .actions
            .iter_mut()
            .find(|a| a.action_id == input.action_id)
        {
            Some(action) => {
                action.status = input.status;
                action.message = input.message;
                action.modified_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_actions(&self, input: ListActionsRepoInput) -> DomainResult<Vec<Action>> {
        let state = self.state.read().await;
        // Insertion order is creation order
        Ok(state
            .actions
            .iter()
            .filter(|a| {
                a.organization_id == input.organization_id && a.device_id == input.device_id
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GroupRepository for InMemoryStore {
    async fn create_group(&self, input: CreateGroupRepoInput) -> DomainResult<Group> {
        let mut state = self.state.write().await;
        if state
            .groups
            .values()
            .any(|g| g.organization_id == input.organization_id && g.name == input.name)
        {
            return Err(DomainError::GroupAlreadyExists(input.name));
        }

        let now = Utc::now();
        let group = Group {
            id: state.next_id(),
            organization_id: input.organization_id,
            name: input.name,
            created_at: now,
            modified_at: now,
        };
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn list_groups(&self, organization_id: &str) -> DomainResult<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| g.organization_id == organization_id)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get_group(&self, input: GetGroupRepoInput) -> DomainResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .find(|g| g.organization_id == input.organization_id && g.name == input.name)
            .cloned())
    }

    async fn link_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state
            .links
            .entry((input.group_id, input.device_ref))
            .or_insert(input.organization_id);
        Ok(())
    }

    async fn unlink_device(&self, input: GroupDeviceRepoInput) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let key = (input.group_id, input.device_ref);
        if state.links.get(&key) == Some(&input.organization_id) {
            state.links.remove(&key);
        }
        Ok(())
    }

    async fn list_group_devices(&self, group_id: i64) -> DomainResult<Vec<Device>> {
        let state = self.state.read().await;
        let mut devices: Vec<Device> = state
            .links
            .keys()
            .filter(|(group, _)| *group == group_id)
            .filter_map(|(_, device_ref)| state.devices.get(device_ref).cloned())
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn list_excluded_devices(
        &self,
        organization_id: &str,
        group_id: i64,
    ) -> DomainResult<Vec<Device>> {
        let state = self.state.read().await;
        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.organization_id == organization_id)
            .filter(|d| !state.links.contains_key(&(group_id, d.id)))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn device_input(org: &str, device_id: &str) -> CreateDeviceRepoInput {
        CreateDeviceRepoInput {
            organization_id: org.to_string(),
            device_id: device_id.to_string(),
            brand: "example".to_string(),
            model: "drone-1000".to_string(),
            serial_number: format!("DR{}", device_id),
            store_id: "example-store".to_string(),
            device_key: "CCCCCCCCC".to_string(),
        }
    }

    fn snap_input(device_ref: i64, name: &str) -> UpsertDeviceSnapRepoInput {
        UpsertDeviceSnapRepoInput {
            device_ref,
            name: name.to_string(),
            installed_size: 2000,
            installed_date: None,
            status: "active".to_string(),
            channel: "stable".to_string(),
            confinement: "strict".to_string(),
            version: "1.0".to_string(),
            revision: 10,
            devmode: false,
            config: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_device_rejects_duplicate_device_id() {
        let store = InMemoryStore::new();
        store.create_device(device_input("abc", "a111")).await.unwrap();

        let result = store.create_device(device_input("other", "a111")).await;
        assert!(matches!(result, Err(DomainError::DeviceAlreadyExists(_))));
        assert_eq!(store.list_devices("other").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_device_is_org_scoped() {
        let store = InMemoryStore::new();
        store.create_device(device_input("abc", "a111")).await.unwrap();

        let found = store
            .get_device(GetDeviceRepoInput {
                organization_id: "abc".to_string(),
                device_id: "a111".to_string(),
            })
            .await
            .unwrap();
        assert!(found.is_some());

        let cross_org = store
            .get_device(GetDeviceRepoInput {
                organization_id: "xyz".to_string(),
                device_id: "a111".to_string(),
            })
            .await
            .unwrap();
        assert!(cross_org.is_none());

        assert!(store.get_device_by_device_id("a111").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ping_assigns_last_refresh() {
        let store = InMemoryStore::new();
        store.create_device(device_input("abc", "a111")).await.unwrap();

        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t2 = t1 - Duration::hours(1);
        for refresh in [t1, t2] {
            let matched = store
                .ping_device(PingDeviceRepoInput {
                    organization_id: "abc".to_string(),
                    device_id: "a111".to_string(),
                    refresh,
                })
                .await
                .unwrap();
            assert!(matched);
        }

        let device = store.get_device_by_device_id("a111").await.unwrap().unwrap();
        assert_eq!(device.last_refresh, t2);

        let unknown = store
            .ping_device(PingDeviceRepoInput {
                organization_id: "abc".to_string(),
                device_id: "z999".to_string(),
                refresh: t1,
            })
            .await
            .unwrap();
        assert!(!unknown);
    }

    #[tokio::test]
    async fn test_snap_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let device = store.create_device(device_input("abc", "a111")).await.unwrap();

        let first = store
            .upsert_device_snap(snap_input(device.id, "helloworld"))
            .await
            .unwrap();
        let second = store
            .upsert_device_snap(snap_input(device.id, "helloworld"))
            .await
            .unwrap();

        let snaps = store.list_device_snaps(device.id).await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(snaps[0].modified_at >= first.modified_at);
    }

    #[tokio::test]
    async fn test_snaps_listed_by_name() {
        let store = InMemoryStore::new();
        let device = store.create_device(device_input("abc", "a111")).await.unwrap();
        for name in ["zeta", "alpha", "mid"] {
            store
                .upsert_device_snap(snap_input(device.id, name))
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .list_device_snaps(device.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_get_device_embeds_version() {
        let store = InMemoryStore::new();
        let device = store.create_device(device_input("abc", "a111")).await.unwrap();
        store
            .upsert_device_version(UpsertDeviceVersionRepoInput {
                device_ref: device.id,
                version: "2.30".to_string(),
                series: "16".to_string(),
                os_id: "ubuntu-core".to_string(),
                os_version_id: "16".to_string(),
                on_classic: false,
                kernel_version: "4.4.0-104-generic".to_string(),
            })
            .await
            .unwrap();

        let found = store.get_device_by_device_id("a111").await.unwrap().unwrap();
        assert_eq!(found.version.unwrap().os_id, "ubuntu-core");
    }

    #[tokio::test]
    async fn test_delete_device_cascades() {
        let store = InMemoryStore::new();
        let device = store.create_device(device_input("abc", "a111")).await.unwrap();
        store
            .upsert_device_snap(snap_input(device.id, "helloworld"))
            .await
            .unwrap();
        let group = store
            .create_group(CreateGroupRepoInput {
                organization_id: "abc".to_string(),
                name: "workshop".to_string(),
            })
            .await
            .unwrap();
        store
            .link_device(GroupDeviceRepoInput {
                organization_id: "abc".to_string(),
                group_id: group.id,
                device_ref: device.id,
            })
            .await
            .unwrap();

        store.delete_device("a111").await.unwrap();

        assert!(store.get_device_by_device_id("a111").await.unwrap().is_none());
        assert!(store.list_device_snaps(device.id).await.unwrap().is_empty());
        assert!(store.list_group_devices(group.id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_device("a111").await,
            Err(DomainError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_link_twice_and_excluded_devices() {
        let store = InMemoryStore::new();
        let a = store.create_device(device_input("abc", "a111")).await.unwrap();
        store.create_device(device_input("abc", "b222")).await.unwrap();
        store.create_device(device_input("xyz", "c333")).await.unwrap();
        let group = store
            .create_group(CreateGroupRepoInput {
                organization_id: "abc".to_string(),
                name: "workshop".to_string(),
            })
            .await
            .unwrap();

        let link = GroupDeviceRepoInput {
            organization_id: "abc".to_string(),
            group_id: group.id,
            device_ref: a.id,
        };
        store.link_device(link.clone()).await.unwrap();
        store.link_device(link).await.unwrap();

        let linked = store.list_group_devices(group.id).await.unwrap();
        assert_eq!(linked.len(), 1);

        let excluded: Vec<String> = store
            .list_excluded_devices("abc", group.id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(excluded, vec!["b222"]);
    }

    #[tokio::test]
    async fn test_update_action_reports_match() {
        let store = InMemoryStore::new();
        store
            .create_action(CreateActionRepoInput {
                organization_id: "abc".to_string(),
                device_id: "a111".to_string(),
                action_id: "act-1".to_string(),
                action: crate::domain::ActionKind::Install,
                status: crate::domain::ActionStatus::Requested,
                message: String::new(),
            })
            .await
            .unwrap();

        let matched = store
            .update_action(UpdateActionRepoInput {
                action_id: "act-1".to_string(),
                status: crate::domain::ActionStatus::Complete,
                message: String::new(),
            })
            .await
            .unwrap();
        assert!(matched);

        let missing = store
            .update_action(UpdateActionRepoInput {
                action_id: "act-2".to_string(),
                status: crate::domain::ActionStatus::Error,
                message: "boom".to_string(),
            })
            .await
            .unwrap();
        assert!(!missing);
    }
}
