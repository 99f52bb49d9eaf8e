#![cfg(feature = "integration-tests")]

use common::domain::{
    CreateDeviceRepoInput, CreateGroupRepoInput, DeviceRepository, DomainError, GetGroupRepoInput,
    GroupDeviceRepoInput, GroupRepository,
};
use common::postgres::{PostgresClient, PostgresDeviceRepository, PostgresGroupRepository};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn setup_test_db() -> (
    ContainerAsync<Postgres>,
    PostgresDeviceRepository,
    PostgresGroupRepository,
) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(
        &host.to_string(),
        port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .expect("Failed to create client");
    client.run_migrations().await.expect("Migrations failed");

    (
        postgres,
        PostgresDeviceRepository::new(client.clone()),
        PostgresGroupRepository::new(client),
    )
}

async fn create_device(repo: &PostgresDeviceRepository, org: &str, device_id: &str) -> i64 {
    repo.create_device(CreateDeviceRepoInput {
        organization_id: org.to_string(),
        device_id: device_id.to_string(),
        brand: "example".to_string(),
        model: "drone-1000".to_string(),
        serial_number: format!("DR{}", device_id),
        store_id: "example-store".to_string(),
        device_key: "BBBBBBBBB".to_string(),
    })
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn test_create_get_and_list_groups() {
    let (_container, _devices, groups) = setup_test_db().await;

    for name in ["workshop", "field"] {
        groups
            .create_group(CreateGroupRepoInput {
                organization_id: "abc".to_string(),
                name: name.to_string(),
            })
            .await
            .unwrap();
    }

    let duplicate = groups
        .create_group(CreateGroupRepoInput {
            organization_id: "abc".to_string(),
            name: "workshop".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(DomainError::GroupAlreadyExists(_))));

    // Same name in another organization is allowed
    groups
        .create_group(CreateGroupRepoInput {
            organization_id: "xyz".to_string(),
            name: "workshop".to_string(),
        })
        .await
        .unwrap();

    let names: Vec<String> = groups
        .list_groups("abc")
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["field", "workshop"]);

    let missing = groups
        .get_group(GetGroupRepoInput {
            organization_id: "abc".to_string(),
            name: "lab".to_string(),
        })
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_link_and_excluded_devices() {
    let (_container, devices, groups) = setup_test_db().await;
    let a111 = create_device(&devices, "abc", "a111").await;
    create_device(&devices, "abc", "b222").await;
    create_device(&devices, "xyz", "c333").await;

    let group = groups
        .create_group(CreateGroupRepoInput {
            organization_id: "abc".to_string(),
            name: "workshop".to_string(),
        })
        .await
        .unwrap();

    let link = GroupDeviceRepoInput {
        organization_id: "abc".to_string(),
        group_id: group.id,
        device_ref: a111,
    };
    groups.link_device(link.clone()).await.unwrap();
    groups.link_device(link.clone()).await.unwrap();

    let linked = groups.list_group_devices(group.id).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].device_id, "a111");

    let excluded: Vec<String> = groups
        .list_excluded_devices("abc", group.id)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.device_id)
        .collect();
    assert_eq!(excluded, vec!["b222"]);

    groups.unlink_device(link).await.unwrap();
    assert!(groups.list_group_devices(group.id).await.unwrap().is_empty());
}
